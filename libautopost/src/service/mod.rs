//! Service layer for Autopost
//!
//! `AutopostService` is the single entry point shared by the HTTP control
//! surface, the import CLI and the scheduled cycle, so an interactive post
//! and a scheduled post run through the same code.
//!
//! It owns the data directory layout, one shared HTTP client and the trend
//! cache. Platform clients and the text model are built per call from the
//! current configuration through [`PlatformFactory`] and [`ModelFactory`],
//! which tests replace with mocks.
//!
//! # Example
//!
//! ```no_run
//! use libautopost::service::{AutopostService, PublishOptions};
//!
//! # async fn example() -> libautopost::Result<()> {
//! let service = AutopostService::from_env()?;
//! let report = service
//!     .publish(PublishOptions::text("Hello", vec!["x".to_string()]))
//!     .await?;
//! println!("{:?}", report.status_map());
//! # Ok(())
//! # }
//! ```

pub mod cycle;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, ConfigStore, DataPaths};
use crate::credentials::Redactor;
use crate::engagement::{AnalysisCache, CachedAnalysis, EngagementImporter, OverviewStore};
use crate::error::{AutopostError, Result};
use crate::generator::prompt::truncate_chars;
use crate::generator::{selection, ContentGenerator, GeneratedPost, PostRequest};
use crate::history::{HistoryStore, HistorySummary, PostRecord};
use crate::llm::gemini::GeminiClient;
use crate::llm::{GenerationRequest, TextModel};
use crate::platforms::threads::{ThreadsClient, THREADS_API_BASE};
use crate::promotion::{NoteCache, NoteCacheDoc, NoteClient};
use crate::publisher::{HttpPlatformFactory, PlatformFactory, PublishReport, Publisher, KNOWN_PLATFORMS};
use crate::retry::RetryPolicy;
use crate::scheduler::ActivityLog;
use crate::trends::TrendSource;
use crate::types::{ConnectionCheck, MediaAttachment, PostKind, PublishRequest, TrendAngle, TrendItem};

/// Most posts one generate call may request
pub const MAX_GENERATE_COUNT: usize = 10;

/// Builds the text model for the current configuration
#[async_trait]
pub trait ModelFactory: Send + Sync {
    fn create(&self, config: &Config) -> Result<Arc<dyn TextModel>>;

    /// Confirm the model answers a trivial prompt
    async fn check(&self, config: &Config) -> ConnectionCheck {
        let model = match self.create(config) {
            Ok(model) => model,
            Err(e) => return ConnectionCheck::failed("gemini", e.to_string()),
        };
        let name = model.default_model().to_string();
        match model.generate(&name, &GenerationRequest::new("OK", 0.0)).await {
            Ok(_) => ConnectionCheck::ok("gemini", format!("Connected ({})", name)),
            Err(e) => ConnectionCheck::failed("gemini", e.to_string()),
        }
    }
}

/// Gemini-backed models
pub struct GeminiModelFactory {
    client: reqwest::Client,
}

impl GeminiModelFactory {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn client_for(&self, config: &Config) -> Result<GeminiClient> {
        let key = config.api_keys.require_gemini()?;
        Ok(GeminiClient::new(
            self.client.clone(),
            key,
            config.api_keys.model(),
        ))
    }
}

#[async_trait]
impl ModelFactory for GeminiModelFactory {
    fn create(&self, config: &Config) -> Result<Arc<dyn TextModel>> {
        Ok(Arc::new(self.client_for(config)?))
    }

    async fn check(&self, config: &Config) -> ConnectionCheck {
        match self.client_for(config) {
            Ok(client) => client.check_connection().await,
            Err(e) => ConnectionCheck::failed("gemini", e.to_string()),
        }
    }
}

/// Hands out one fixed model regardless of configuration
pub struct FixedModelFactory(pub Arc<dyn TextModel>);

impl ModelFactory for FixedModelFactory {
    fn create(&self, _config: &Config) -> Result<Arc<dyn TextModel>> {
        Ok(self.0.clone())
    }
}

/// Parameters of an on-demand generation
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub kind: PostKind,
    pub count: usize,
    /// Use this trend instead of fetching the feeds
    pub trend: Option<String>,
    /// Writing style name; unknown names fall back to a weighted choice
    pub style: Option<String>,
    pub smart_analysis: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            kind: PostKind::TrendLinked,
            count: 1,
            trend: None,
            style: None,
            smart_analysis: false,
        }
    }
}

/// One generated post, or why it could not be generated
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GenerationOutcome {
    Post {
        text: String,
        char_count: usize,
        style: String,
        trend: String,
    },
    Failed {
        error: String,
    },
}

/// A post to publish now
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub text: String,
    pub platforms: Vec<String>,
    pub image: Option<MediaAttachment>,
    /// Recorded in history alongside the post
    pub style: String,
    pub trend: String,
    pub smart_analysis: bool,
}

impl PublishOptions {
    pub fn text(text: impl Into<String>, platforms: Vec<String>) -> Self {
        Self {
            text: text.into(),
            platforms,
            ..Default::default()
        }
    }

    pub fn from_generated(post: &GeneratedPost, platforms: Vec<String>) -> Self {
        Self {
            text: post.text.clone(),
            platforms,
            image: None,
            style: post.style.clone(),
            trend: post.trend.clone(),
            smart_analysis: post.smart_analysis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenRefresh {
    pub message: String,
    pub expires_days: u64,
}

/// Which credentials are present, plus the scheduler flag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub gemini: bool,
    pub x: bool,
    pub threads: bool,
    pub scheduler: bool,
}

pub struct AutopostService {
    paths: DataPaths,
    config_store: ConfigStore,
    client: reqwest::Client,
    trends: TrendSource,
    notes: NoteClient,
    history: HistoryStore,
    overview: OverviewStore,
    analysis_cache: AnalysisCache,
    note_cache: NoteCache,
    platforms: Arc<dyn PlatformFactory>,
    models: Arc<dyn ModelFactory>,
    activity: ActivityLog,
    retry: RetryPolicy,
    threads_api_base: String,
}

impl AutopostService {
    /// Service over the data directory resolved from the environment
    pub fn from_env() -> Result<Self> {
        Self::new(DataPaths::resolve()?)
    }

    /// Service over `paths` with the real platform and model clients
    pub fn new(paths: DataPaths) -> Result<Self> {
        paths.ensure()?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AutopostError::InvalidInput(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config_store: ConfigStore::new(paths.config_file()),
            history: HistoryStore::new(paths.history_file()),
            overview: OverviewStore::new(paths.overview_file()),
            analysis_cache: AnalysisCache::new(paths.analysis_cache_file()),
            note_cache: NoteCache::new(paths.note_cache_file()),
            trends: TrendSource::new()?,
            notes: NoteClient::new(client.clone()),
            platforms: Arc::new(HttpPlatformFactory::new(client.clone())),
            models: Arc::new(GeminiModelFactory::new(client.clone())),
            activity: ActivityLog::default(),
            retry: RetryPolicy::default(),
            threads_api_base: THREADS_API_BASE.to_string(),
            client,
            paths,
        })
    }

    pub fn with_platform_factory(mut self, factory: Arc<dyn PlatformFactory>) -> Self {
        self.platforms = factory;
        self
    }

    pub fn with_model_factory(mut self, factory: Arc<dyn ModelFactory>) -> Self {
        self.models = factory;
        self
    }

    pub fn with_trend_source(mut self, trends: TrendSource) -> Self {
        self.trends = trends;
        self
    }

    pub fn with_note_client(mut self, notes: NoteClient) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share an activity log with a scheduler
    pub fn with_activity_log(mut self, activity: ActivityLog) -> Self {
        self.activity = activity;
        self
    }

    pub fn with_threads_api_base(mut self, base: impl Into<String>) -> Self {
        self.threads_api_base = base.into();
        self
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn overview(&self) -> &OverviewStore {
        &self.overview
    }

    pub fn analysis_cache(&self) -> &AnalysisCache {
        &self.analysis_cache
    }

    pub fn note_cache(&self) -> &NoteCache {
        &self.note_cache
    }

    pub fn importer(&self) -> EngagementImporter {
        EngagementImporter::new(self.history.clone(), self.overview.clone())
    }

    // ----- configuration -----

    pub fn config(&self) -> Result<Config> {
        self.config_store.load()
    }

    /// Configuration with credentials masked
    pub fn masked_config(&self) -> Result<Value> {
        self.config()?.to_masked_json()
    }

    /// Configuration with plaintext credentials
    pub fn raw_config(&self) -> Result<Value> {
        self.config_store.load_value()
    }

    /// Replace the top-level sections present in `patch`
    pub fn save_config(&self, patch: Value) -> Result<Config> {
        self.config_store.update(patch)
    }

    pub fn update_section(&self, section: &str, patch: Value) -> Result<Config> {
        self.config_store.update_section(section, patch)
    }

    pub fn reset_config(&self) -> Result<Config> {
        self.config_store.reset()
    }

    /// Redactor for every credential currently configured
    pub fn redactor(&self) -> Redactor {
        match self.config() {
            Ok(config) => config.api_keys.redactor(),
            Err(e) => {
                warn!("Could not load config for redaction: {}", e);
                Redactor::default()
            }
        }
    }

    // ----- trends and generation -----

    pub async fn trends(&self) -> Result<Vec<TrendItem>> {
        let config = self.config()?;
        Ok(self
            .trends
            .fetch(&config.sources.rss_urls, &config.sources.blacklist)
            .await)
    }

    pub async fn analyze_trends(&self, trends: &[String]) -> Result<Vec<TrendAngle>> {
        let config = self.config()?;
        self.generator(&config)?
            .analyze_trends(trends, &config.persona.summary())
            .await
    }

    fn generator(&self, config: &Config) -> Result<ContentGenerator> {
        Ok(ContentGenerator::new(self.models.create(config)?).with_retry_policy(self.retry))
    }

    /// Generate one post for an already-built request
    pub async fn generate_post(&self, config: &Config, request: PostRequest) -> Result<GeneratedPost> {
        self.generator(config)?.generate(config, request).await
    }

    /// Generate `count` posts; each failure is reported in place
    pub async fn generate(&self, options: GenerateOptions) -> Result<Vec<GenerationOutcome>> {
        let config = self.config()?;
        let generator = self.generator(&config)?;
        let redactor = config.api_keys.redactor();
        let count = options.count.clamp(1, MAX_GENERATE_COUNT);

        let trends = match (&options.trend, options.kind) {
            (Some(trend), _) if !trend.trim().is_empty() => vec![TrendItem {
                title: trend.trim().to_string(),
                source_url: String::new(),
                source_name: String::new(),
            }],
            (_, PostKind::TrendLinked) => {
                self.trends
                    .fetch(&config.sources.rss_urls, &config.sources.blacklist)
                    .await
            }
            _ => Vec::new(),
        };
        let feedback = if options.smart_analysis {
            self.history.feedback_digest()
        } else {
            String::new()
        };

        let mut outcomes = Vec::with_capacity(count);
        for _ in 0..count {
            let request = match self.build_request(&config, &options, &trends, &feedback) {
                Some(request) => request,
                None => {
                    outcomes.push(GenerationOutcome::Failed {
                        error: "No note articles registered".to_string(),
                    });
                    continue;
                }
            };
            let outcome = match generator.generate(&config, request).await {
                Ok(post) => GenerationOutcome::Post {
                    char_count: post.char_count(),
                    text: post.text,
                    style: post.style,
                    trend: post.trend,
                },
                Err(e) => GenerationOutcome::Failed {
                    error: redactor.redact(&e.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn build_request(
        &self,
        config: &Config,
        options: &GenerateOptions,
        trends: &[TrendItem],
        feedback: &str,
    ) -> Option<PostRequest> {
        let mut rng = rand::thread_rng();
        let styles = &config.prompt_settings.writing_styles;
        match options.kind {
            PostKind::Promotional => {
                let article = config.note_promotion.articles.choose(&mut rng)?.clone();
                let style = selection::select_promotion_style(
                    &config.note_promotion.promotion_styles,
                    &mut rng,
                );
                Some(PostRequest::Promotional { article, style })
            }
            PostKind::TrendLinked => Some(PostRequest::TrendLinked {
                trends: trends.to_vec(),
                style: selection::style_by_name_or_weighted(styles, options.style.as_deref(), &mut rng),
                smart_analysis: options.smart_analysis,
                feedback: feedback.to_string(),
            }),
            PostKind::Independent => Some(PostRequest::Independent {
                style: selection::style_by_name_or_weighted(styles, options.style.as_deref(), &mut rng),
                smart_analysis: options.smart_analysis,
                feedback: feedback.to_string(),
            }),
        }
    }

    // ----- publishing -----

    /// Publish to each named platform and record the post if any accepted it
    pub async fn publish(&self, options: PublishOptions) -> Result<PublishReport> {
        if options.text.trim().is_empty() {
            return Err(AutopostError::InvalidInput("Text is empty".to_string()));
        }
        if options.platforms.is_empty() {
            return Err(AutopostError::InvalidInput(format!(
                "No platform selected. Choose one of: {}",
                KNOWN_PLATFORMS.join(", ")
            )));
        }

        let config = self.config()?;
        let platforms = options
            .platforms
            .iter()
            .map(|name| self.platforms.create(name, &config))
            .collect::<Result<Vec<_>>>()?;

        let mut request = PublishRequest::text(options.text.clone());
        request.image = options.image.clone();

        let publisher = Publisher::new(config.api_keys.redactor()).with_retry_policy(self.retry);
        let report = publisher.publish(&platforms, &request).await;

        let preview = truncate_chars(&options.text, 30);
        for result in &report.results {
            match &result.error {
                None => self
                    .activity
                    .success(format!("Posted to {}: {}...", result.platform, preview)),
                Some(error) => self
                    .activity
                    .error(format!("Failed to post to {}: {}", result.platform, error)),
            }
        }

        if report.any_success() {
            self.history.record_post(PostRecord {
                platform: report.succeeded().join(","),
                post_id: report.first_post_id().map(str::to_string),
                text: options.text,
                style: options.style,
                trend: options.trend,
                smart_analysis: options.smart_analysis,
            })?;
        }
        Ok(report)
    }

    /// Swap the Threads token for a long-lived one and store it
    pub async fn refresh_threads_token(&self) -> Result<TokenRefresh> {
        let mut config = self.config()?;
        let token = config.api_keys.threads_api_key.expose().to_string();
        if token.trim().is_empty() {
            return Err(AutopostError::InvalidInput(
                "Threads token is not set".to_string(),
            ));
        }

        let refreshed = ThreadsClient::new(self.client.clone(), token)
            .with_base_url(self.threads_api_base.clone())
            .refresh_token()
            .await?;

        config.api_keys.threads_api_key = refreshed.access_token.as_str().into();
        config.schedule.threads_token_issued = Utc::now().timestamp();
        self.config_store.save(&config)?;

        let expires_days = refreshed.expires_in_days();
        info!("Stored refreshed Threads token");
        Ok(TokenRefresh {
            message: format!("Token refreshed (valid for {} days)", expires_days),
            expires_days,
        })
    }

    /// One connection check per service: Gemini, X, Threads
    pub async fn check_connections(&self) -> Result<Vec<ConnectionCheck>> {
        let config = self.config()?;
        let redactor = config.api_keys.redactor();
        let platform_checks = KNOWN_PLATFORMS.iter().map(|name| {
            let config = &config;
            async move {
                match self.platforms.create(name, config) {
                    Ok(platform) => platform.check_connection().await,
                    Err(e) => ConnectionCheck::failed(name, e.to_string()),
                }
            }
        });
        let (model_check, platform_checks) =
            futures::join!(self.models.check(&config), join_all(platform_checks));

        let mut checks = vec![model_check];
        checks.extend(platform_checks);
        for check in &mut checks {
            check.message = redactor.redact(&check.message);
        }
        Ok(checks)
    }

    pub fn status(&self, scheduler_running: bool) -> Result<ServiceStatus> {
        let keys = self.config()?.api_keys;
        Ok(ServiceStatus {
            gemini: keys.has_gemini(),
            x: keys.has_x(),
            threads: keys.has_threads(),
            scheduler: scheduler_running,
        })
    }

    // ----- engagement -----

    pub fn summary(&self) -> HistorySummary {
        HistorySummary::build(&self.history.load(), &self.overview.load())
    }

    /// Ask the model for advice from past engagement and cache the answer
    pub async fn analyze_engagement(&self) -> Result<CachedAnalysis> {
        let config = self.config()?;
        let analysis = self
            .generator(&config)?
            .analyze_engagement(&self.history.load(), &self.overview.load())
            .await?;
        self.analysis_cache.save(&analysis)
    }

    // ----- promotion and persona -----

    /// Fetch the creator's articles and cache them
    pub async fn fetch_note_articles(&self, note_url: &str) -> Result<NoteCacheDoc> {
        if note_url.trim().is_empty() {
            return Err(AutopostError::InvalidInput(
                "No note URL given".to_string(),
            ));
        }
        let articles = self.notes.fetch_articles(note_url).await;
        self.note_cache.save(note_url.trim(), articles)
    }

    pub async fn generate_persona(&self) -> Result<String> {
        let config = self.config()?;
        self.generator(&config)?
            .generate_persona(&config.persona)
            .await
    }

    pub async fn suggest_keywords(&self) -> Result<Vec<String>> {
        let config = self.config()?;
        self.generator(&config)?
            .suggest_keywords(&config.persona.summary())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockTextModel;
    use crate::platforms::mock::MockPlatform;
    use crate::platforms::Platform;
    use crate::types::EntrySource;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Hands out clones of pre-built mock platforms by name
    struct MockFactory {
        platforms: Mutex<HashMap<String, MockPlatform>>,
    }

    impl MockFactory {
        fn new(platforms: Vec<MockPlatform>) -> Self {
            Self {
                platforms: Mutex::new(
                    platforms
                        .into_iter()
                        .map(|p| (p.name().to_string(), p))
                        .collect(),
                ),
            }
        }
    }

    impl PlatformFactory for MockFactory {
        fn create(&self, name: &str, _config: &Config) -> Result<Box<dyn Platform>> {
            self.platforms
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .map(|p| Box::new(p) as Box<dyn Platform>)
                .ok_or_else(|| AutopostError::InvalidInput(format!("Unknown platform: {}", name)))
        }
    }

    fn service(dir: &TempDir, model: MockTextModel, platforms: Vec<MockPlatform>) -> AutopostService {
        AutopostService::new(DataPaths::new(dir.path()))
            .unwrap()
            .with_model_factory(Arc::new(FixedModelFactory(Arc::new(model))))
            .with_platform_factory(Arc::new(MockFactory::new(platforms)))
            .with_retry_policy(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_publish_records_succeeded_platforms() {
        let dir = TempDir::new().unwrap();
        let x = MockPlatform::with_post_id("x", "42");
        let threads = MockPlatform::post_failure("threads", "boom");
        let svc = service(&dir, MockTextModel::replying("unused"), vec![x, threads]);

        let report = svc
            .publish(PublishOptions::text(
                "Hello",
                vec!["x".to_string(), "threads".to_string()],
            ))
            .await
            .unwrap();
        assert_eq!(report.status_map()["x"], "success");
        assert!(report.status_map()["threads"].starts_with("error: "));

        let history = svc.history().load();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].platform, "x");
        assert_eq!(history[0].post_id.as_deref(), Some("42"));
        assert_eq!(history[0].source, EntrySource::App);
        assert_eq!(svc.activity().len(), 2);
    }

    #[tokio::test]
    async fn test_publish_without_success_records_nothing() {
        let dir = TempDir::new().unwrap();
        let svc = service(
            &dir,
            MockTextModel::replying("unused"),
            vec![MockPlatform::post_failure("x", "nope")],
        );
        svc.publish(PublishOptions::text("Hello", vec!["x".to_string()]))
            .await
            .unwrap();
        assert!(svc.history().load().is_empty());
    }

    #[tokio::test]
    async fn test_publish_rejects_empty_text_and_unknown_platform() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir, MockTextModel::replying("unused"), vec![]);

        let err = svc
            .publish(PublishOptions::text("  ", vec!["x".to_string()]))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = svc
            .publish(PublishOptions::text("hi", vec!["myspace".to_string()]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown platform"));
    }

    #[tokio::test]
    async fn test_generate_independent_posts() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir, MockTextModel::replying("A calm morning thought"), vec![]);

        let outcomes = svc
            .generate(GenerateOptions {
                kind: PostKind::Independent,
                count: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        match &outcomes[0] {
            GenerationOutcome::Post { text, char_count, .. } => {
                assert_eq!(text, "A calm morning thought");
                assert_eq!(*char_count, text.chars().count());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_promotion_without_articles() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir, MockTextModel::replying("unused"), vec![]);

        let outcomes = svc
            .generate(GenerateOptions {
                kind: PostKind::Promotional,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(
            outcomes,
            vec![GenerationOutcome::Failed {
                error: "No note articles registered".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_generate_requires_gemini_key() {
        let dir = TempDir::new().unwrap();
        let svc = AutopostService::new(DataPaths::new(dir.path())).unwrap();
        let err = svc.generate(GenerateOptions::default()).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("gemini_api_key"));
    }

    #[tokio::test]
    async fn test_analyze_engagement_without_data_is_cached_guidance() {
        let dir = TempDir::new().unwrap();
        let model = MockTextModel::replying("unused");
        let svc = service(&dir, model.clone(), vec![]);

        let cached = svc.analyze_engagement().await.unwrap();
        assert!(cached.analysis.starts_with("Not enough data"));
        assert_eq!(model.call_count(), 0);
        assert_eq!(svc.analysis_cache().load(), Some(cached));
    }

    #[tokio::test]
    async fn test_check_connections_reports_every_service() {
        let dir = TempDir::new().unwrap();
        let svc = service(
            &dir,
            MockTextModel::replying("OK"),
            vec![
                MockPlatform::success("x"),
                MockPlatform::not_configured("threads"),
            ],
        );
        let checks = svc.check_connections().await.unwrap();
        let services: Vec<_> = checks.iter().map(|c| c.service.as_str()).collect();
        assert_eq!(services, vec!["gemini", "x", "threads"]);
        assert!(checks[0].ok);
        assert!(checks[1].ok);
        assert!(!checks[2].ok);
    }

    #[tokio::test]
    async fn test_status_and_config_updates() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir, MockTextModel::replying("unused"), vec![]);

        let status = svc.status(true).unwrap();
        assert!(!status.gemini);
        assert!(status.scheduler);

        svc.update_section("api_keys", json!({"gemini_api_key": "g-key"}))
            .unwrap();
        assert!(svc.status(false).unwrap().gemini);
        assert_eq!(svc.masked_config().unwrap()["api_keys"]["gemini_api_key"], "***");
        assert_eq!(svc.raw_config().unwrap()["api_keys"]["gemini_api_key"], "g-key");

        svc.reset_config().unwrap();
        assert!(!svc.status(false).unwrap().gemini);
    }

    #[tokio::test]
    async fn test_fetch_note_articles_requires_url() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir, MockTextModel::replying("unused"), vec![]);
        let err = svc.fetch_note_articles(" ").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_refresh_token_requires_token() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir, MockTextModel::replying("unused"), vec![]);
        let err = svc.refresh_threads_token().await.unwrap_err();
        assert!(err.to_string().contains("Threads token is not set"));
    }
}

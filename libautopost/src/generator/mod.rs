//! Content generation
//!
//! [`ContentGenerator`] turns a [`PostRequest`] into publishable text: it
//! assembles the prompt, calls the model through the retry and fallback
//! wrapper, strips wrapping quotes and Markdown, and for promotional posts
//! pins the real article URL at the end.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, Persona, PromotionStyle, WritingStyle};
use crate::error::{ModelError, Result};
use crate::llm::{generate_with_fallback, GenerationRequest, TextModel};
use crate::retry::RetryPolicy;
use crate::types::{DailyOverview, HistoryEntry, NoteArticle, PostKind, TrendAngle, TrendItem};

pub mod prompt;
pub mod sanitize;
pub mod selection;

pub use sanitize::sanitize;

/// Temperature for post text
pub const POST_TEMPERATURE: f32 = 0.9;
/// Temperature for analysis calls that must return structured output
pub const ANALYSIS_TEMPERATURE: f32 = 0.3;
const PERSONA_TEMPERATURE: f32 = 0.8;
const KEYWORD_TEMPERATURE: f32 = 0.7;

/// Minimum engaged posts before engagement analysis is attempted
pub const MIN_ENGAGED_FOR_ANALYSIS: usize = 3;
const ANALYSIS_WINDOW: usize = 30;
const MAX_KEYWORDS: usize = 5;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?```").expect("valid regex"));

/// What to generate, carrying only the inputs each kind needs
#[derive(Debug, Clone)]
pub enum PostRequest {
    TrendLinked {
        trends: Vec<TrendItem>,
        style: WritingStyle,
        smart_analysis: bool,
        feedback: String,
    },
    Independent {
        style: WritingStyle,
        /// Recorded with the post; independent posts have no trends to analyze
        smart_analysis: bool,
        feedback: String,
    },
    Promotional {
        article: NoteArticle,
        style: PromotionStyle,
    },
}

impl PostRequest {
    pub fn kind(&self) -> PostKind {
        match self {
            PostRequest::TrendLinked { .. } => PostKind::TrendLinked,
            PostRequest::Independent { .. } => PostKind::Independent,
            PostRequest::Promotional { .. } => PostKind::Promotional,
        }
    }
}

/// A finished post ready for review or publishing
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPost {
    pub text: String,
    pub kind: PostKind,
    /// Writing or promotion style name
    pub style: String,
    /// Trend titles the post was based on, comma-joined
    pub trend: String,
    pub smart_analysis: bool,
    pub article_url: Option<String>,
}

impl GeneratedPost {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

pub struct ContentGenerator {
    model: Arc<dyn TextModel>,
    retry: RetryPolicy,
}

impl ContentGenerator {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self {
            model,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn call(&self, request: GenerationRequest) -> std::result::Result<String, ModelError> {
        generate_with_fallback(self.model.as_ref(), &request, &self.retry).await
    }

    /// Generate one post
    pub async fn generate(&self, config: &Config, request: PostRequest) -> Result<GeneratedPost> {
        let persona = config.persona.summary();
        let settings = &config.prompt_settings;

        match request {
            PostRequest::TrendLinked {
                trends,
                style,
                smart_analysis,
                feedback,
            } => {
                let (trend_text, used) = if trends.is_empty() {
                    (None, String::new())
                } else {
                    let (text, used) = self.trend_input(&trends, &persona, smart_analysis).await;
                    (Some(text), used)
                };
                let parts = prompt::PostPromptParts {
                    style: &style,
                    persona: &persona,
                    guidelines: &settings.writing_guidelines,
                    ng_expressions: &settings.ng_expressions,
                    feedback: &feedback,
                };
                let text = self
                    .write_post(prompt::post_prompt(&parts, trend_text.as_deref()), &persona)
                    .await?;
                Ok(GeneratedPost {
                    text,
                    kind: PostKind::TrendLinked,
                    style: style.name,
                    trend: used,
                    smart_analysis,
                    article_url: None,
                })
            }
            PostRequest::Independent {
                style,
                smart_analysis,
                feedback,
            } => {
                let parts = prompt::PostPromptParts {
                    style: &style,
                    persona: &persona,
                    guidelines: &settings.writing_guidelines,
                    ng_expressions: &settings.ng_expressions,
                    feedback: &feedback,
                };
                let text = self
                    .write_post(prompt::post_prompt(&parts, None), &persona)
                    .await?;
                Ok(GeneratedPost {
                    text,
                    kind: PostKind::Independent,
                    style: style.name,
                    trend: String::new(),
                    smart_analysis,
                    article_url: None,
                })
            }
            PostRequest::Promotional { article, style } => {
                let text = self.generate_promotion(&article, &style, &persona).await?;
                Ok(GeneratedPost {
                    text,
                    kind: PostKind::Promotional,
                    style: style.name,
                    trend: String::new(),
                    smart_analysis: false,
                    article_url: Some(article.url),
                })
            }
        }
    }

    /// Trend lines for the prompt and the titles actually used
    ///
    /// Smart analysis offers only the top-ranked trend with its angle; when
    /// the analysis fails or returns nothing, up to two random trends are used.
    async fn trend_input(
        &self,
        trends: &[TrendItem],
        persona: &str,
        smart_analysis: bool,
    ) -> (String, String) {
        if smart_analysis {
            let titles: Vec<String> = trends.iter().map(|t| t.title.clone()).collect();
            match self.analyze_trends(&titles, persona).await {
                Ok(ranked) if !ranked.is_empty() => {
                    let best = &ranked[0];
                    info!("Smart analysis picked \"{}\" (score {})", best.trend, best.score);
                    return (prompt::best_trend_line(best), best.trend.clone());
                }
                Ok(_) => warn!("Smart analysis returned no ranking, using random trends"),
                Err(e) => warn!("Smart analysis failed, using random trends: {}", e),
            }
        }

        let picked = {
            let mut rng = rand::thread_rng();
            selection::pick_trends(trends, &mut rng)
        };
        let used = picked
            .iter()
            .map(|t| t.title.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        (prompt::trend_lines(&picked), used)
    }

    async fn write_post(&self, prompt: String, persona: &str) -> Result<String> {
        debug!("Post prompt is {} characters", prompt.chars().count());
        let request =
            GenerationRequest::new(prompt, POST_TEMPERATURE).with_system_directive(persona);
        let raw = self.call(request).await?;
        Ok(sanitize(&sanitize::strip_wrapping_quotes(&raw)))
    }

    /// Promotional post for one of the author's articles
    pub async fn generate_promotion(
        &self,
        article: &NoteArticle,
        style: &PromotionStyle,
        persona: &str,
    ) -> Result<String> {
        let request = GenerationRequest::new(
            prompt::promotion_prompt(article, style, persona),
            POST_TEMPERATURE,
        )
        .with_system_directive(persona);
        let raw = self.call(request).await?;
        let text = sanitize(&sanitize::strip_wrapping_quotes(&raw));
        Ok(sanitize::pin_article_url(&text, &article.url))
    }

    /// Rank trends by fit with the persona, best first, at most three
    ///
    /// Output the model does not format as a JSON array yields an empty list.
    pub async fn analyze_trends(&self, trends: &[String], persona: &str) -> Result<Vec<TrendAngle>> {
        if trends.is_empty() {
            return Ok(Vec::new());
        }
        let request = GenerationRequest::new(
            prompt::trend_analysis_prompt(trends, persona),
            ANALYSIS_TEMPERATURE,
        );
        let raw = self.call(request).await?;
        Ok(parse_trend_ranking(&raw))
    }

    /// Generate persona text from the profile fields
    pub async fn generate_persona(&self, persona: &Persona) -> Result<String> {
        let request = GenerationRequest::new(prompt::persona_prompt(persona), PERSONA_TEMPERATURE);
        let raw = self.call(request).await?;
        Ok(strip_preamble(&raw))
    }

    /// Suggest up to five feed search keywords for the persona
    pub async fn suggest_keywords(&self, persona_info: &str) -> Result<Vec<String>> {
        let request = GenerationRequest::new(prompt::keyword_prompt(persona_info), KEYWORD_TEMPERATURE);
        let raw = self.call(request).await?;
        Ok(parse_keywords(&raw))
    }

    /// Advice derived from past engagement
    ///
    /// With fewer than three engaged posts a guidance message is returned and
    /// the model is not called.
    pub async fn analyze_engagement(
        &self,
        history: &[HistoryEntry],
        overview: &[DailyOverview],
    ) -> Result<String> {
        let engaged: Vec<HistoryEntry> = history
            .iter()
            .filter(|h| h.engagement.is_some())
            .cloned()
            .collect();
        if engaged.len() < MIN_ENGAGED_FOR_ANALYSIS {
            return Ok(insufficient_data_message(engaged.len()));
        }
        let recent = &engaged[engaged.len().saturating_sub(ANALYSIS_WINDOW)..];
        let request = GenerationRequest::new(
            prompt::engagement_prompt(recent, overview),
            ANALYSIS_TEMPERATURE,
        );
        Ok(self.call(request).await?.trim().to_string())
    }
}

/// Guidance shown when there is not enough engagement data to analyse
pub fn insufficient_data_message(engaged: usize) -> String {
    format!(
        "Not enough data to analyse.\n\
         Posts with engagement: {} / at least {} needed.\n\
         Download the analytics CSV from X and drop it into the inbox folder.",
        engaged, MIN_ENGAGED_FOR_ANALYSIS
    )
}

/// Parse the model's trend ranking, tolerating a Markdown code fence
pub fn parse_trend_ranking(raw: &str) -> Vec<TrendAngle> {
    let text = raw.trim();
    let body = if text.contains("```") {
        CODE_FENCE
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .unwrap_or(text)
    } else {
        text
    };

    match serde_json::from_str::<Vec<TrendAngle>>(body) {
        Ok(mut ranked) => {
            ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
            ranked.truncate(3);
            ranked
        }
        Err(e) => {
            debug!("Trend ranking was not a JSON array: {}", e);
            Vec::new()
        }
    }
}

/// Drop any chatty preamble before the persona text proper
fn strip_preamble(raw: &str) -> String {
    let text = raw.trim();
    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .position(|l| {
            let l = l.trim();
            l.starts_with("You are") || l.starts_with("##")
        })
        .unwrap_or(0);
    lines[start..].join("\n").trim().to_string()
}

fn parse_keywords(raw: &str) -> Vec<String> {
    const BULLETS: &[char] = &['・', '-', '•', '*', '.', ' ', '\u{3000}', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && l.chars().count() < 30)
        .map(|l| l.trim_start_matches(BULLETS).trim().to_string())
        .filter(|l| !l.is_empty())
        .take(MAX_KEYWORDS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockTextModel;
    use crate::types::Engagement;

    fn generator(model: &MockTextModel) -> ContentGenerator {
        ContentGenerator::new(Arc::new(model.clone())).with_retry_policy(RetryPolicy::none())
    }

    fn trend(title: &str) -> TrendItem {
        TrendItem {
            title: title.to_string(),
            source_url: String::new(),
            source_name: "feed".to_string(),
        }
    }

    #[tokio::test]
    async fn test_independent_post_is_sanitized() {
        let model = MockTextModel::replying("\"**Bold** opener\n\n\n\n- point\"");
        let post = generator(&model)
            .generate(
                &Config::default(),
                PostRequest::Independent {
                    style: WritingStyle::freeform(),
                    smart_analysis: false,
                    feedback: String::new(),
                },
            )
            .await
            .unwrap();

        assert_eq!(post.text, "Bold opener\n\n・point");
        assert_eq!(post.kind, PostKind::Independent);
        assert_eq!(post.style, "Freeform");
        let (_, request) = &model.requests()[0];
        assert!((request.temperature - POST_TEMPERATURE).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_trend_linked_without_trends_uses_trendless_prompt() {
        let model = MockTextModel::replying("post");
        generator(&model)
            .generate(
                &Config::default(),
                PostRequest::TrendLinked {
                    trends: vec![],
                    style: WritingStyle::freeform(),
                    smart_analysis: false,
                    feedback: String::new(),
                },
            )
            .await
            .unwrap();
        assert!(model.last_prompt().unwrap().contains("There is no trend input"));
    }

    #[tokio::test]
    async fn test_smart_analysis_uses_best_trend_and_angle() {
        let model = MockTextModel::replying("final post").with_responses(vec![Ok(
            "```json\n[{\"trend\": \"B\", \"angle\": \"cost\", \"score\": 6}, {\"trend\": \"A\", \"angle\": \"speed\", \"score\": 9}]\n```"
                .to_string(),
        )]);
        let post = generator(&model)
            .generate(
                &Config::default(),
                PostRequest::TrendLinked {
                    trends: vec![trend("A"), trend("B")],
                    style: WritingStyle::freeform(),
                    smart_analysis: true,
                    feedback: String::new(),
                },
            )
            .await
            .unwrap();

        assert_eq!(post.trend, "A");
        assert!(post.smart_analysis);
        let prompt = model.last_prompt().unwrap();
        assert!(prompt.contains("- A\n  (suggested angle: speed)"));
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_smart_analysis_failure_falls_back_to_random_trends() {
        let model = MockTextModel::replying("final post")
            .with_responses(vec![Ok("I cannot rank these.".to_string())]);
        let post = generator(&model)
            .generate(
                &Config::default(),
                PostRequest::TrendLinked {
                    trends: vec![trend("Only trend")],
                    style: WritingStyle::freeform(),
                    smart_analysis: true,
                    feedback: String::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(post.trend, "Only trend");
        assert!(model.last_prompt().unwrap().contains("- Only trend"));
    }

    #[tokio::test]
    async fn test_promotion_pins_real_url() {
        let model = MockTextModel::replying(
            "\u{300c}Wrote about estimates.\nhttps://note.com/fake/n/zzz\n\nRead if you like.\u{300d}",
        );
        let article = NoteArticle {
            url: "https://note.com/me/n/real".to_string(),
            title: "Estimates".to_string(),
            summary: String::new(),
        };
        let post = generator(&model)
            .generate(
                &Config::default(),
                PostRequest::Promotional {
                    article,
                    style: PromotionStyle::understated(),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            post.text,
            "Wrote about estimates.\n\nRead if you like.\n\nhttps://note.com/me/n/real"
        );
        assert_eq!(post.article_url.as_deref(), Some("https://note.com/me/n/real"));
    }

    #[tokio::test]
    async fn test_persona_directive_is_sent() {
        let model = MockTextModel::replying("post");
        let mut config = Config::default();
        config.persona.generated_text = "You are a night-shift nurse.".to_string();
        generator(&model)
            .generate(
                &config,
                PostRequest::Independent {
                    style: WritingStyle::freeform(),
                    smart_analysis: false,
                    feedback: String::new(),
                },
            )
            .await
            .unwrap();
        let (_, request) = &model.requests()[0];
        assert_eq!(
            request.system_directive.as_deref(),
            Some("You are a night-shift nurse.")
        );
    }

    #[tokio::test]
    async fn test_independent_post_keeps_requested_analysis_flag() {
        let model = MockTextModel::replying("post");
        let with_feedback = generator(&model)
            .generate(
                &Config::default(),
                PostRequest::Independent {
                    style: WritingStyle::freeform(),
                    smart_analysis: false,
                    feedback: "Posts that did well:\n  - likes 9".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(!with_feedback.smart_analysis);

        let requested = generator(&model)
            .generate(
                &Config::default(),
                PostRequest::Independent {
                    style: WritingStyle::freeform(),
                    smart_analysis: true,
                    feedback: String::new(),
                },
            )
            .await
            .unwrap();
        assert!(requested.smart_analysis);
    }

    #[tokio::test]
    async fn test_analyze_trends_empty_input_skips_model() {
        let model = MockTextModel::replying("[]");
        let ranked = generator(&model).analyze_trends(&[], "p").await.unwrap();
        assert!(ranked.is_empty());
        assert_eq!(model.call_count(), 0);
    }

    #[test]
    fn test_parse_trend_ranking_sorts_and_caps() {
        let raw = r#"[{"trend":"a","angle":"x","score":3},{"trend":"b","angle":"y","score":9},
                      {"trend":"c","angle":"z","score":5},{"trend":"d","angle":"w","score":7}]"#;
        let ranked = parse_trend_ranking(raw);
        let names: Vec<_> = ranked.iter().map(|r| r.trend.as_str()).collect();
        assert_eq!(names, vec!["b", "d", "c"]);
        assert!(parse_trend_ranking("not json").is_empty());
        assert!(parse_trend_ranking("{\"trend\": \"a\"}").is_empty());
    }

    #[tokio::test]
    async fn test_generate_persona_strips_preamble() {
        let model = MockTextModel::replying(
            "Sure! Here is your persona.\n\nYou are a quiet accountant.\n## Voice\n- dry",
        );
        let text = generator(&model)
            .generate_persona(&Persona::default())
            .await
            .unwrap();
        assert_eq!(text, "You are a quiet accountant.\n## Voice\n- dry");
    }

    #[tokio::test]
    async fn test_suggest_keywords_cleans_lines() {
        let model = MockTextModel::replying(
            "1. remote work\n- AI side job\n・project management\n\nThis line is far too long to be a keyword at all\nsaunas\nferments\nextra",
        );
        let keywords = generator(&model).suggest_keywords("engineer").await.unwrap();
        assert_eq!(
            keywords,
            vec!["remote work", "AI side job", "project management", "saunas", "ferments"]
        );
    }

    #[tokio::test]
    async fn test_analyze_engagement_needs_three_posts() {
        let model = MockTextModel::replying("advice");
        let history: Vec<HistoryEntry> = (0..2)
            .map(|i| HistoryEntry {
                timestamp: format!("2024-01-0{} 09:00:00", i + 1),
                epoch: 0,
                platform: "x".to_string(),
                post_id: Some(i.to_string()),
                text: "t".to_string(),
                char_count: 1,
                style: String::new(),
                trend: String::new(),
                smart_analysis: false,
                source: Default::default(),
                engagement: Some(Engagement::default()),
                engagement_updated: None,
            })
            .collect();

        let text = generator(&model)
            .analyze_engagement(&history, &[])
            .await
            .unwrap();
        assert!(text.contains("2 / at least 3"));
        assert_eq!(model.call_count(), 0);

        let mut more = history.clone();
        more.push(history[0].clone());
        let text = generator(&model).analyze_engagement(&more, &[]).await.unwrap();
        assert_eq!(text, "advice");
    }
}

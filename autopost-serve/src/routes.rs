//! API route handlers for the control surface
//!
//! Request bodies are parsed leniently: an empty body counts as `{}` and
//! missing fields take their defaults. Anything that fails is answered with
//! `{"error": message}`.

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use libautopost::service::{GenerateOptions, PublishOptions};
use libautopost::trends::keywords_to_feed_urls;
use libautopost::types::MediaAttachment;
use libautopost::{CsvKind, PostKind, StartOutcome};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::api_error::ApiError;
use crate::server::AppState;

type ApiResult = Result<Json<Value>, ApiError>;

/// Log lines returned when no count is given
const DEFAULT_LOG_COUNT: usize = 50;

/// Parse a JSON body, treating an empty body as the default value
fn parse_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))
}

fn to_json<T: serde::Serialize>(value: T) -> ApiResult {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| ApiError::internal(e.to_string()))
}

// ----- configuration -----

pub async fn get_config(State(state): State<Arc<AppState>>) -> ApiResult {
    let config = state.service.masked_config().map_err(|e| state.fail(e))?;
    Ok(Json(config))
}

pub async fn get_raw_config(State(state): State<Arc<AppState>>) -> ApiResult {
    let config = state.service.raw_config().map_err(|e| state.fail(e))?;
    Ok(Json(config))
}

pub async fn update_config(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    let patch: Value = parse_json(&body)?;
    if !patch.as_object().is_some_and(|m| !m.is_empty()) {
        return Err(ApiError::bad_request("No data provided"));
    }
    state.service.save_config(patch).map_err(|e| state.fail(e))?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn update_config_section(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult {
    let patch: Value = parse_json(&body)?;
    state
        .service
        .update_section(&name, patch)
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn reset_config(State(state): State<Arc<AppState>>) -> ApiResult {
    state.service.reset_config().map_err(|e| state.fail(e))?;
    info!("Configuration reset to defaults");
    Ok(Json(json!({ "status": "ok" })))
}

// ----- trends and generation -----

pub async fn get_trends(State(state): State<Arc<AppState>>) -> ApiResult {
    let trends = state.service.trends().await.map_err(|e| state.fail(e))?;
    Ok(Json(json!({ "trends": trends })))
}

/// A trend given either as its title or as a full trend object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TrendInput {
    Title(String),
    Item { title: String },
}

impl TrendInput {
    fn into_title(self) -> String {
        match self {
            TrendInput::Title(title) | TrendInput::Item { title } => title,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalyzeTrendsBody {
    trends: Vec<TrendInput>,
}

pub async fn analyze_trends(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    let body: AnalyzeTrendsBody = parse_json(&body)?;
    let titles: Vec<String> = body.trends.into_iter().map(TrendInput::into_title).collect();
    let analysis = state
        .service
        .analyze_trends(&titles)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({ "analysis": analysis })))
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GenerateBody {
    post_type: String,
    count: usize,
    trend: Option<String>,
    style: Option<String>,
    smart_analysis: bool,
}

impl Default for GenerateBody {
    fn default() -> Self {
        Self {
            post_type: "A".to_string(),
            count: 1,
            trend: None,
            style: None,
            smart_analysis: false,
        }
    }
}

pub async fn generate(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    let body: GenerateBody = parse_json(&body)?;
    let kind = PostKind::parse(&body.post_type)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown post type: {}", body.post_type)))?;

    let posts = state
        .service
        .generate(GenerateOptions {
            kind,
            count: body.count,
            trend: body.trend,
            style: body.style,
            smart_analysis: body.smart_analysis,
        })
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({ "posts": posts })))
}

// ----- publishing -----

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PostBody {
    text: String,
    /// Explicit target list; overrides the two flags below
    platforms: Option<Vec<String>>,
    post_to_x: bool,
    post_to_threads: bool,
    style: String,
    trend: String,
}

impl Default for PostBody {
    fn default() -> Self {
        Self {
            text: String::new(),
            platforms: None,
            post_to_x: true,
            post_to_threads: false,
            style: String::new(),
            trend: String::new(),
        }
    }
}

impl PostBody {
    fn targets(&self) -> Vec<String> {
        if let Some(platforms) = &self.platforms {
            return platforms.clone();
        }
        let mut targets = Vec::new();
        if self.post_to_x {
            targets.push("x".to_string());
        }
        if self.post_to_threads {
            targets.push("threads".to_string());
        }
        targets
    }
}

/// Image received with a post, deleted from disk when dropped
struct Upload {
    file: NamedTempFile,
    alt_text: String,
}

impl Upload {
    fn attachment(&self) -> MediaAttachment {
        MediaAttachment::new(self.file.path()).with_alt_text(self.alt_text.clone())
    }
}

fn spool_upload(file_name: &str, data: &[u8]) -> Result<NamedTempFile, ApiError> {
    let suffix = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_else(|| ".png".to_string());

    let mut file = tempfile::Builder::new()
        .prefix("autopost-upload-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| ApiError::internal(format!("Could not store upload: {}", e)))?;
    file.write_all(data)
        .map_err(|e| ApiError::internal(format!("Could not store upload: {}", e)))?;
    Ok(file)
}

async fn read_post_form(mut multipart: Multipart) -> Result<(PostBody, Option<Upload>), ApiError> {
    let mut body = PostBody::default();
    let mut alt_text = String::new();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            if !file_name.is_empty() && !data.is_empty() {
                image = Some(spool_upload(&file_name, &data)?);
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        match name.as_str() {
            "text" => body.text = value,
            "post_to_x" => body.post_to_x = value == "true",
            "post_to_threads" => body.post_to_threads = value == "true",
            "alt_text" => alt_text = value,
            "style" => body.style = value,
            "trend" => body.trend = value,
            other => debug!("Ignoring form field {}", other),
        }
    }

    let upload = image.map(|file| Upload { file, alt_text });
    Ok((body, upload))
}

/// Publish now; accepts JSON or a multipart form carrying an image
pub async fn publish(State(state): State<Arc<AppState>>, request: Request) -> ApiResult {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let (body, upload) = if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        read_post_form(multipart).await?
    } else {
        let bytes = Bytes::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        (parse_json::<PostBody>(&bytes)?, None)
    };

    let options = PublishOptions {
        platforms: body.targets(),
        text: body.text,
        image: upload.as_ref().map(Upload::attachment),
        style: body.style,
        trend: body.trend,
        smart_analysis: false,
    };
    let report = state
        .service
        .publish(options)
        .await
        .map_err(|e| state.fail(e))?;
    drop(upload);

    to_json(report.status_map())
}

// ----- scheduler and logs -----

pub async fn scheduler_status(State(state): State<Arc<AppState>>) -> ApiResult {
    to_json(state.scheduler.status(DEFAULT_LOG_COUNT))
}

pub async fn scheduler_start(State(state): State<Arc<AppState>>) -> ApiResult {
    let status = match state.start_scheduler().map_err(|e| state.fail(e))? {
        StartOutcome::Started => "started",
        StartOutcome::AlreadyRunning => "already_running",
    };
    Ok(Json(json!({ "status": status })))
}

pub async fn scheduler_stop(State(state): State<Arc<AppState>>) -> ApiResult {
    state.scheduler.stop();
    Ok(Json(json!({ "status": "stopped" })))
}

pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    let count = params
        .get("count")
        .and_then(|c| c.parse().ok())
        .unwrap_or(DEFAULT_LOG_COUNT);
    Ok(Json(json!({ "logs": state.scheduler.log().recent(count) })))
}

// ----- engagement -----

pub async fn engagement_data(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(Json(json!({ "data": state.service.history().newest_first() })))
}

pub async fn import_engagement(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if !file_name.to_lowercase().ends_with(".csv") {
            return Err(ApiError::bad_request("Only .csv files are supported"));
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        let summary = state
            .service
            .importer()
            .import_bytes(&file_name, &data)
            .map_err(|e| state.fail(e))?;
        let label = match summary.kind {
            CsvKind::Content => "per-post",
            CsvKind::Overview => "daily overview",
        };

        let Json(mut value) = to_json(summary)?;
        value["status"] = json!("ok");
        value["csv_type_label"] = json!(label);
        return Ok(Json(value));
    }

    Err(ApiError::bad_request("No file selected"))
}

pub async fn analyze_engagement(State(state): State<Arc<AppState>>) -> ApiResult {
    let cached = state
        .service
        .analyze_engagement()
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({ "analysis": cached.analysis })))
}

pub async fn analysis_cache(State(state): State<Arc<AppState>>) -> ApiResult {
    match state.service.analysis_cache().load() {
        Some(cached) => to_json(cached),
        None => Ok(Json(json!({}))),
    }
}

pub async fn engagement_summary(State(state): State<Arc<AppState>>) -> ApiResult {
    to_json(state.service.summary())
}

pub async fn dashboard_stats(State(state): State<Arc<AppState>>) -> ApiResult {
    to_json(state.service.history().dashboard_stats())
}

// ----- promotion and persona -----

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NoteFetchBody {
    note_url: String,
}

pub async fn fetch_note_articles(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult {
    let body: NoteFetchBody = parse_json(&body)?;
    let doc = state
        .service
        .fetch_note_articles(&body.note_url)
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({ "articles": doc.articles })))
}

pub async fn note_cache(State(state): State<Arc<AppState>>) -> ApiResult {
    to_json(state.service.note_cache().load())
}

pub async fn generate_persona(State(state): State<Arc<AppState>>) -> ApiResult {
    let text = state
        .service
        .generate_persona()
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({ "generated_text": text })))
}

pub async fn suggest_keywords(State(state): State<Arc<AppState>>) -> ApiResult {
    let keywords = state
        .service
        .suggest_keywords()
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({ "keywords": keywords })))
}

// ----- status and connections -----

pub async fn status(State(state): State<Arc<AppState>>) -> ApiResult {
    let status = state
        .service
        .status(state.scheduler.is_running())
        .map_err(|e| state.fail(e))?;
    to_json(status)
}

pub async fn test_connections(State(state): State<Arc<AppState>>) -> ApiResult {
    let results = state
        .service
        .check_connections()
        .await
        .map_err(|e| state.fail(e))?;
    Ok(Json(json!({ "results": results })))
}

pub async fn refresh_threads_token(State(state): State<Arc<AppState>>) -> ApiResult {
    let refreshed = state
        .service
        .refresh_threads_token()
        .await
        .map_err(|e| state.fail(e))?;
    to_json(refreshed)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KeywordsBody {
    keywords: Vec<String>,
}

pub async fn keywords_to_rss(body: Bytes) -> ApiResult {
    let body: KeywordsBody = parse_json(&body)?;
    let urls = keywords_to_feed_urls(&body.keywords);
    if urls.is_empty() {
        return Err(ApiError::bad_request("No keywords given"));
    }
    Ok(Json(json!({ "urls": urls })))
}

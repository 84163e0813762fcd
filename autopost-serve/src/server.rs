//! Router and shared state for the control surface

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use libautopost::scheduler::SchedulePlan;
use libautopost::service::cycle::ScheduledCycle;
use libautopost::{AutopostError, AutopostService, Scheduler, StartOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api_error::ApiError;
use crate::routes;

/// Largest request body accepted (image uploads, CSV exports)
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub struct AppState {
    pub service: Arc<AutopostService>,
    pub scheduler: Scheduler,
}

impl AppState {
    /// State whose scheduler writes to the service's activity log
    pub fn new(service: Arc<AutopostService>) -> Self {
        let scheduler = Scheduler::new(service.activity().clone());
        Self { service, scheduler }
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Start the posting schedule from the current configuration
    pub fn start_scheduler(&self) -> libautopost::Result<StartOutcome> {
        let config = self.service.config()?;
        let plan = SchedulePlan::from_config(&config.schedule);
        let runner = Arc::new(ScheduledCycle::new(self.service.clone()));
        Ok(self
            .scheduler
            .start(plan, runner, config.api_keys.redactor()))
    }

    /// Error response for `err` with the configured credentials redacted
    pub fn fail(&self, err: AutopostError) -> ApiError {
        ApiError::from_error(&err, &self.service.redactor())
    }
}

pub fn router(state: Arc<AppState>, frontend_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/api/config", get(routes::get_config).post(routes::update_config))
        .route("/api/config/raw", get(routes::get_raw_config))
        .route("/api/config/section/{name}", post(routes::update_config_section))
        .route("/api/config/reset", post(routes::reset_config))
        .route("/api/trends", get(routes::get_trends))
        .route("/api/trends/analyze", post(routes::analyze_trends))
        .route("/api/generate", post(routes::generate))
        .route("/api/post", post(routes::publish))
        .route("/api/scheduler/status", get(routes::scheduler_status))
        .route("/api/scheduler/start", post(routes::scheduler_start))
        .route("/api/scheduler/stop", post(routes::scheduler_stop))
        .route("/api/logs", get(routes::get_logs))
        .route("/api/engagement/data", get(routes::engagement_data))
        .route("/api/engagement/import", post(routes::import_engagement))
        .route("/api/engagement/analyze", post(routes::analyze_engagement))
        .route("/api/engagement/analysis-cache", get(routes::analysis_cache))
        .route("/api/engagement/summary", get(routes::engagement_summary))
        .route("/api/dashboard/stats", get(routes::dashboard_stats))
        .route("/api/note/fetch", post(routes::fetch_note_articles))
        .route("/api/note/cache", get(routes::note_cache))
        .route("/api/persona/generate", post(routes::generate_persona))
        .route("/api/persona/suggest-keywords", post(routes::suggest_keywords))
        .route("/api/status", get(routes::status))
        .route("/api/test-connections", post(routes::test_connections))
        .route("/api/threads/refresh-token", post(routes::refresh_threads_token))
        .route("/api/keywords-to-rss", post(routes::keywords_to_rss))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state);

    let app = match frontend_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true)),
        None => api,
    };
    app.layer(TraceLayer::new_for_http())
}

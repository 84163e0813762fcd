//! Autopost - persona-driven posting to X and Threads
//!
//! This library generates short posts with a text model from trends, a
//! persona and past engagement, publishes them to X and Threads, keeps a
//! post history with imported analytics, and runs the posting schedule.

pub mod config;
pub mod credentials;
pub mod engagement;
pub mod error;
pub mod generator;
pub mod history;
pub mod llm;
pub mod logging;
pub mod platforms;
pub mod promotion;
pub mod publisher;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod trends;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigStore, DataPaths};
pub use credentials::{Redactor, Secret};
pub use engagement::{CsvKind, EngagementImporter, ImportSummary, OverviewStore};
pub use error::{AutopostError, Result};
pub use history::{HistoryStore, PostRecord};
pub use publisher::{PostResult, PublishReport};
pub use scheduler::{ActivityLog, Scheduler, StartOutcome};
pub use service::AutopostService;
pub use types::{DailyOverview, Engagement, HistoryEntry, PostKind, PublishRequest};

//! Logging setup shared by the autopost binaries
//!
//! Diagnostics go to stderr through `tracing`. The operator-facing activity
//! log kept by the scheduler is separate and lives in [`crate::scheduler`].
//!
//! ```no_run
//! use libautopost::logging::LoggingConfig;
//!
//! // AUTOPOST_LOG_FORMAT=json AUTOPOST_LOG_LEVEL=debug autopost-import csv
//! LoggingConfig::from_env("warn", false).init();
//! ```

use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Environment variable selecting the output format
pub const LOG_FORMAT_ENV: &str = "AUTOPOST_LOG_FORMAT";

/// Environment variable selecting the minimum level
pub const LOG_LEVEL_ENV: &str = "AUTOPOST_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Plain lines without colors
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Multi-line colored output for development
    Pretty,
}

impl LogFormat {
    const ALL: [LogFormat; 3] = [LogFormat::Text, LogFormat::Json, LogFormat::Pretty];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "Invalid log format: '{}'. Valid options: text, json, pretty",
                    s
                )
            })
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Forces the `debug` level
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Settings from [`LOG_FORMAT_ENV`] and [`LOG_LEVEL_ENV`]
    ///
    /// An unset or unparseable format falls back to text, an unset level to
    /// `default_level`.
    pub fn from_env(default_level: &str, verbose: bool) -> Self {
        let format = std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let level = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| default_level.to_string());
        Self::new(format, level, verbose)
    }

    fn filter(&self) -> EnvFilter {
        let fallback = if self.verbose { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    }

    /// Install the global subscriber
    ///
    /// # Panics
    ///
    /// Panics if a subscriber is already installed.
    pub fn init(&self) {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_writer(std::io::stderr);

        match self.format {
            LogFormat::Json => builder
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .init(),
            LogFormat::Pretty => builder.pretty().with_line_number(true).init(),
            LogFormat::Text => builder.with_target(false).init(),
        }
    }
}

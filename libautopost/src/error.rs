//! Error types for Autopost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AutopostError>;

/// Error text fragments that mark a provider failure as temporary even when
/// no status code is available.
const OVERLOAD_MARKERS: &[&str] = &[
    "429",
    "503",
    "resource_exhausted",
    "rate limit",
    "rate_limit",
    "ratelimit",
    "quota",
    "overloaded",
];

#[derive(Error, Debug)]
pub enum AutopostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AutopostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AutopostError::InvalidInput(_) => 3,
            AutopostError::Import(_) => 3,
            AutopostError::Platform(PlatformError::Authentication(_)) => 2,
            AutopostError::Platform(PlatformError::NotConfigured(_)) => 2,
            AutopostError::Config(ConfigError::MissingCredential(_)) => 2,
            AutopostError::Model(ModelError::Unauthorized(_)) => 2,
            AutopostError::Platform(_) => 1,
            AutopostError::Model(_) => 1,
            AutopostError::Config(_) => 1,
            AutopostError::Store(_) => 1,
        }
    }

    /// HTTP status used when this error crosses the control surface
    pub fn status_code(&self) -> u16 {
        match self {
            AutopostError::InvalidInput(_) => 400,
            AutopostError::Import(_) => 400,
            AutopostError::Config(ConfigError::MissingCredential(_)) => 400,
            AutopostError::Config(ConfigError::UnknownSection(_)) => 400,
            AutopostError::Platform(PlatformError::NotConfigured(_)) => 400,
            AutopostError::Platform(PlatformError::Validation(_)) => 400,
            _ => 500,
        }
    }

    /// Whether retrying the failed call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AutopostError::Platform(e) => e.is_transient(),
            AutopostError::Model(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[source] std::io::Error),

    #[error("Failed to write config file: {0}")]
    WriteError(#[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Unknown config section: {0}")]
    UnknownSection(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Platform not configured: {0}")]
    NotConfigured(String),
}

impl PlatformError {
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::Network(_)
            | PlatformError::Timeout(_)
            | PlatformError::RateLimit(_)
            | PlatformError::Unavailable(_) => true,
            PlatformError::Authentication(_)
            | PlatformError::Validation(_)
            | PlatformError::Posting(_)
            | PlatformError::NotConfigured(_) => false,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum ModelError {
    #[error("Model API rejected the key: {0}")]
    Unauthorized(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Model API rate limited: {0}")]
    RateLimited(String),

    #[error("Model API unavailable: {0}")]
    Unavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Model API error: {0}")]
    Provider(String),
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::RateLimited(_)
            | ModelError::Unavailable(_)
            | ModelError::Network(_)
            | ModelError::Timeout(_) => true,
            ModelError::Provider(msg) => has_overload_marker(msg),
            ModelError::Unauthorized(_)
            | ModelError::ModelNotFound(_)
            | ModelError::InvalidRequest(_)
            | ModelError::InvalidResponse(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unrecognized CSV layout (headers: {0}). Suggestion: Export the post-level or account overview CSV from X analytics.")]
    UnrecognizedHeaders(String),

    #[error("CSV file is empty: {0}")]
    Empty(String),

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to read file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No CSV file found in {0}")]
    NoFile(String),
}

/// Classifies free-form provider error text
pub fn has_overload_marker(message: &str) -> bool {
    let lower = message.to_lowercase();
    OVERLOAD_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = AutopostError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = AutopostError::Platform(PlatformError::Authentication("Bad token".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_not_configured() {
        let error = AutopostError::Platform(PlatformError::NotConfigured("x".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_import_error() {
        let error = AutopostError::Import(ImportError::UnrecognizedHeaders("a, b".to_string()));
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_posting_error() {
        let error = AutopostError::Platform(PlatformError::Posting("HTTP 500".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = AutopostError::Platform(PlatformError::Posting("Container failed".to_string()));
        assert_eq!(
            error.to_string(),
            "Platform error: Posting failed: Container failed"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AutopostError::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(
            AutopostError::Config(ConfigError::MissingCredential("threads_api_key".into()))
                .status_code(),
            400
        );
        assert_eq!(
            AutopostError::Model(ModelError::Provider("boom".into())).status_code(),
            500
        );
    }

    #[test]
    fn test_platform_transient_classification() {
        assert!(PlatformError::Network("reset".into()).is_transient());
        assert!(PlatformError::Timeout("30s".into()).is_transient());
        assert!(PlatformError::RateLimit("429".into()).is_transient());
        assert!(PlatformError::Unavailable("503".into()).is_transient());

        assert!(!PlatformError::Authentication("401".into()).is_transient());
        assert!(!PlatformError::Validation("empty".into()).is_transient());
        assert!(!PlatformError::Posting("400".into()).is_transient());
        assert!(!PlatformError::NotConfigured("x".into()).is_transient());
    }

    #[test]
    fn test_model_transient_classification() {
        assert!(ModelError::RateLimited("slow down".into()).is_transient());
        assert!(ModelError::Provider("RESOURCE_EXHAUSTED: quota".into()).is_transient());
        assert!(ModelError::Provider("The model is overloaded".into()).is_transient());
        assert!(!ModelError::Provider("safety block".into()).is_transient());
        assert!(!ModelError::ModelNotFound("gemini-x".into()).is_transient());
        assert!(!ModelError::Unauthorized("key".into()).is_transient());
    }

    #[test]
    fn test_overload_marker_ignores_generate_content() {
        // "generateContent" contains "rate" and must not count as a rate limit
        assert!(!has_overload_marker(
            "models/gemini:generateContent returned an empty candidate"
        ));
        assert!(has_overload_marker("Rate limit reached"));
    }

    #[test]
    fn test_top_level_transient_delegates() {
        let err: AutopostError = PlatformError::Network("x".into()).into();
        assert!(err.is_transient());
        let err: AutopostError = ModelError::Timeout("x".into()).into();
        assert!(err.is_transient());
        let err = AutopostError::InvalidInput("x".into());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_platform_error_with_suggestion() {
        let error = PlatformError::Posting(
            "HTTP 403. Suggestion: Attach the app to a Project.".to_string(),
        );
        assert!(error.to_string().contains("Suggestion"));
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(original.to_string(), cloned.to_string());
    }
}

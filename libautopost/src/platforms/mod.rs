//! Platform abstraction and implementations
//!
//! This module provides a unified trait for the social platforms a post can be
//! published to. Each implementation handles request signing, media handling
//! and content validation according to platform-specific requirements.
//!
//! # Examples
//!
//! ```no_run
//! use libautopost::platforms::{Platform, threads::ThreadsClient};
//! use libautopost::types::PublishRequest;
//!
//! # async fn example() -> libautopost::error::Result<()> {
//! let platform = ThreadsClient::new(reqwest::Client::new(), "token");
//!
//! if platform.is_configured() {
//!     let request = PublishRequest::text("Morning standup ran 40 minutes.");
//!     platform.validate_content(&request.text)?;
//!     let post_id = platform.post(&request).await?;
//!     println!("Posted: {}", post_id);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::types::{ConnectionCheck, PublishRequest};

pub mod threads;
pub mod x;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Platform trait for unified social media platform interactions
#[async_trait]
pub trait Platform: Send + Sync {
    /// Publish the request and return the platform-assigned post ID
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Credentials are rejected (`PlatformError::Authentication`)
    /// - The platform refuses the post (`PlatformError::Posting`)
    /// - Network issues occur (`PlatformError::Network`, `PlatformError::Timeout`)
    async fn post(&self, request: &PublishRequest) -> Result<String>;

    /// Validate content before posting
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Validation` if the content fails validation
    fn validate_content(&self, content: &str) -> Result<()>;

    /// Lowercase identifier for the platform ("x", "threads")
    fn name(&self) -> &str;

    /// Maximum characters per post, or `None` when not enforced locally
    fn character_limit(&self) -> Option<usize>;

    /// Whether all credentials needed to post are present
    fn is_configured(&self) -> bool;

    /// Whether a local image file can be attached
    ///
    /// Platforms that only accept public image URLs publish the text alone
    /// when given a local file.
    fn supports_local_images(&self) -> bool {
        false
    }

    /// Whether `post` retries its own requests step by step
    ///
    /// The publisher makes a single `post` call for such platforms instead of
    /// retrying the whole call.
    fn retries_steps(&self) -> bool {
        false
    }

    /// Verify the stored credentials against the platform
    async fn check_connection(&self) -> ConnectionCheck;
}

/// Shared validation: rejects empty content and enforces a character limit
pub(crate) fn validate_length(content: &str, limit: Option<usize>) -> Result<()> {
    if content.trim().is_empty() {
        return Err(PlatformError::Validation("Content cannot be empty".to_string()).into());
    }

    if let Some(limit) = limit {
        let count = content.chars().count();
        if count > limit {
            return Err(PlatformError::Validation(format!(
                "Content exceeds {} character limit (got {} characters)",
                limit, count
            ))
            .into());
        }
    }

    Ok(())
}

/// Map a transport-level reqwest failure
///
/// The URL is stripped first; some endpoints take the access token as a
/// query parameter.
pub(crate) fn map_transport_error(e: reqwest::Error, context: &str) -> PlatformError {
    let e = e.without_url();
    if e.is_timeout() {
        PlatformError::Timeout(format!("{} timed out: {}", context, e))
    } else {
        PlatformError::Network(format!("{} failed: {}", context, e))
    }
}

/// Map a non-success HTTP status to a platform error
pub(crate) fn map_status_error(status: u16, message: String) -> PlatformError {
    match status {
        401 => PlatformError::Authentication(message),
        429 => PlatformError::RateLimit(message),
        503 => PlatformError::Unavailable(message),
        _ => PlatformError::Posting(message),
    }
}

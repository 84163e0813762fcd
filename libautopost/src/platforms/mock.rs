//! Mock platform implementation for testing
//!
//! This module provides a configurable mock platform that can simulate
//! successes, permanent failures, a number of transient failures before
//! success, and delays. It's designed for use in integration tests to verify
//! multi-platform publishing without platform credentials or network access.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::{validate_length, Platform};
use crate::types::{ConnectionCheck, PublishRequest};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name (e.g., "x", "threads")
    pub name: String,

    /// Whether posting should succeed once transient failures are used up
    pub post_succeeds: bool,

    /// Error to return on posting failure
    pub post_error: Option<String>,

    /// Calls that fail with a network error before the configured outcome
    pub transient_failures: usize,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Character limit for validation
    pub character_limit: Option<usize>,

    /// Whether the platform is configured
    pub is_configured: bool,

    /// Whether local image files are accepted
    pub local_images: bool,

    /// ID returned on success; a generated one when unset
    pub post_id: Option<String>,

    /// Number of times post has been called
    pub post_call_count: Arc<Mutex<usize>>,

    /// Requests that were published (for verification)
    pub posted: Arc<Mutex<Vec<PublishRequest>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            post_succeeds: true,
            post_error: None,
            transient_failures: 0,
            delay: Duration::from_millis(0),
            character_limit: None,
            is_configured: true,
            local_images: true,
            post_id: None,
            post_call_count: Arc::new(Mutex::new(0)),
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
///
/// Clones share call counters and recorded posts.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform that always succeeds with a fixed post ID
    pub fn with_post_id(name: &str, post_id: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            post_id: Some(post_id.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock platform that fails posting permanently
    pub fn post_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            post_succeeds: false,
            post_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock platform that fails `failures` times with a network error, then succeeds
    pub fn flaky(name: &str, failures: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            transient_failures: failures,
            ..Default::default()
        })
    }

    /// Create a mock platform with a delay
    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    /// Create a mock platform with a character limit
    pub fn with_limit(name: &str, limit: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            character_limit: Some(limit),
            ..Default::default()
        })
    }

    /// Create a mock platform that is not configured
    pub fn not_configured(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            is_configured: false,
            ..Default::default()
        })
    }

    /// Create a mock platform that only accepts public image URLs
    pub fn text_only(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            local_images: false,
            ..Default::default()
        })
    }

    /// Get the number of times post was called
    pub fn post_call_count(&self) -> usize {
        *self.config.post_call_count.lock().unwrap()
    }

    /// Get the text of everything that was posted
    pub fn posted_content(&self) -> Vec<String> {
        self.posted_requests().into_iter().map(|r| r.text).collect()
    }

    /// Get all requests that were posted
    pub fn posted_requests(&self) -> Vec<PublishRequest> {
        self.config.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn post(&self, request: &PublishRequest) -> Result<String> {
        let call = {
            let mut count = self.config.post_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if call <= self.config.transient_failures {
            return Err(PlatformError::Network(format!(
                "Mock connection reset (call {})",
                call
            ))
            .into());
        }

        if self.config.post_succeeds {
            self.config.posted.lock().unwrap().push(request.clone());
            let post_id = self
                .config
                .post_id
                .clone()
                .unwrap_or_else(|| format!("{}:mock-{}", self.config.name, uuid::Uuid::new_v4()));
            Ok(post_id)
        } else {
            let error_msg = self
                .config
                .post_error
                .clone()
                .unwrap_or_else(|| "Mock posting failed".to_string());
            Err(PlatformError::Posting(error_msg).into())
        }
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        validate_length(content, self.config.character_limit)
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }

    fn is_configured(&self) -> bool {
        self.config.is_configured
    }

    fn supports_local_images(&self) -> bool {
        self.config.local_images
    }

    async fn check_connection(&self) -> ConnectionCheck {
        if self.config.is_configured {
            ConnectionCheck::ok(&self.config.name, "Connected (mock)")
        } else {
            ConnectionCheck::failed(&self.config.name, "Not configured")
        }
    }
}

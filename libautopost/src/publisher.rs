//! Multi-platform publishing
//!
//! Publishes one request to each target platform in turn. Every platform call
//! goes through the retry wrapper, except for platforms whose post is a
//! multi-step handshake: those retry each step themselves. A failure on one
//! platform is logged and reported but never prevents the next platform from
//! being attempted.

use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::Config;
use crate::credentials::Redactor;
use crate::error::{AutopostError, Result};
use crate::platforms::{threads::ThreadsClient, x::XClient, x::XCredentials, Platform};
use crate::retry::{retry, RetryPolicy};
use crate::types::PublishRequest;

/// Platform names accepted by [`PlatformFactory`]
pub const KNOWN_PLATFORMS: &[&str] = &["x", "threads"];

/// Result of posting to a single platform
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostResult {
    /// Platform name ("x", "threads")
    pub platform: String,
    pub success: bool,
    /// Platform-assigned post ID (if successful)
    pub platform_post_id: Option<String>,
    /// Redacted error message (if failed)
    pub error: Option<String>,
}

impl PostResult {
    /// `"success"` or `"error: <message>"`
    pub fn status_text(&self) -> String {
        if self.success {
            "success".to_string()
        } else {
            format!("error: {}", self.error.as_deref().unwrap_or("unknown error"))
        }
    }
}

/// Outcomes of one publish across all target platforms, in target order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublishReport {
    pub results: Vec<PostResult>,
}

impl PublishReport {
    /// Names of the platforms that accepted the post
    pub fn succeeded(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.platform.as_str())
            .collect()
    }

    pub fn any_success(&self) -> bool {
        self.results.iter().any(|r| r.success)
    }

    /// Post ID from the first platform that succeeded
    pub fn first_post_id(&self) -> Option<&str> {
        self.results
            .iter()
            .find(|r| r.success)
            .and_then(|r| r.platform_post_id.as_deref())
    }

    /// `{platform: "success" | "error: ..."}`
    pub fn status_map(&self) -> BTreeMap<String, String> {
        self.results
            .iter()
            .map(|r| (r.platform.clone(), r.status_text()))
            .collect()
    }
}

/// Builds platform clients for a publish
///
/// The service depends on this trait rather than on concrete clients so that
/// tests can substitute mock platforms.
pub trait PlatformFactory: Send + Sync {
    fn create(&self, name: &str, config: &Config) -> Result<Box<dyn Platform>>;
}

/// Factory for the real X and Threads clients
pub struct HttpPlatformFactory {
    client: Client,
    retry: RetryPolicy,
}

impl HttpPlatformFactory {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Policy for clients that retry their own steps
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl PlatformFactory for HttpPlatformFactory {
    fn create(&self, name: &str, config: &Config) -> Result<Box<dyn Platform>> {
        match name {
            "x" => Ok(Box::new(XClient::new(
                self.client.clone(),
                XCredentials::from_api_keys(&config.api_keys),
            ))),
            "threads" => Ok(Box::new(
                ThreadsClient::new(self.client.clone(), config.api_keys.threads_api_key.expose())
                    .with_retry_policy(self.retry),
            )),
            other => Err(AutopostError::InvalidInput(format!(
                "Unknown platform: {}. Supported platforms: {}",
                other,
                KNOWN_PLATFORMS.join(", ")
            ))),
        }
    }
}

/// Sequential publisher with per-platform retry and isolated failures
pub struct Publisher {
    retry: RetryPolicy,
    redactor: Redactor,
}

impl Publisher {
    pub fn new(redactor: Redactor) -> Self {
        Self {
            retry: RetryPolicy::default(),
            redactor,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Publish `request` to every platform in order
    pub async fn publish(
        &self,
        platforms: &[Box<dyn Platform>],
        request: &PublishRequest,
    ) -> PublishReport {
        let mut report = PublishReport::default();
        for platform in platforms {
            report
                .results
                .push(self.publish_one(platform.as_ref(), request).await);
        }
        report
    }

    async fn publish_one(&self, platform: &dyn Platform, request: &PublishRequest) -> PostResult {
        let name = platform.name().to_string();
        info!("Posting to platform: {}", name);

        if let Err(e) = platform.validate_content(&request.text) {
            let message = self.redactor.redact(&e.to_string());
            warn!("Rejected content for {}: {}", name, message);
            return PostResult {
                platform: name,
                success: false,
                platform_post_id: None,
                error: Some(message),
            };
        }

        let request = request_for(platform, request);
        let outcome = if platform.retries_steps() {
            platform.post(&request).await
        } else {
            let label = format!("posting to {}", name);
            retry(&self.retry, &label, || platform.post(&request)).await
        };
        match outcome {
            Ok(post_id) => {
                info!("Successfully posted to {}: {}", name, post_id);
                PostResult {
                    platform: name,
                    success: true,
                    platform_post_id: Some(post_id),
                    error: None,
                }
            }
            Err(e) => {
                let message = self.redactor.redact(&e.to_string());
                warn!("Failed to post to {}: {}", name, message);
                PostResult {
                    platform: name,
                    success: false,
                    platform_post_id: None,
                    error: Some(message),
                }
            }
        }
    }
}

/// The request as `platform` can take it
///
/// Platforms that only fetch media from a public URL get the text alone when
/// the image exists only on local disk.
fn request_for(platform: &dyn Platform, request: &PublishRequest) -> PublishRequest {
    match &request.image {
        Some(image) if image.public_url.is_none() && !platform.supports_local_images() => {
            info!(
                "{} needs a public image URL, posting text only",
                platform.name()
            );
            PublishRequest::text(request.text.clone())
        }
        _ => request.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::MockPlatform;
    use crate::types::MediaAttachment;

    fn publisher() -> Publisher {
        Publisher::new(Redactor::new(["sk-live-secret"])).with_retry_policy(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_partial_failure_reported_independently() {
        let a = MockPlatform::with_post_id("platformA", "123");
        let b = MockPlatform::post_failure("platformB", "Duplicate content");
        let platforms: Vec<Box<dyn Platform>> = vec![Box::new(a.clone()), Box::new(b.clone())];

        let report = publisher()
            .publish(&platforms, &PublishRequest::text("hello"))
            .await;

        let map = report.status_map();
        assert_eq!(map["platformA"], "success");
        assert!(map["platformB"].starts_with("error: "));
        assert_eq!(report.succeeded(), vec!["platformA"]);
        assert_eq!(report.first_post_id(), Some("123"));
        assert_eq!(a.post_call_count(), 1);
        assert_eq!(b.post_call_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_first_does_not_stop_second() {
        let failing = MockPlatform::post_failure("x", "boom");
        let ok = MockPlatform::success("threads");
        let platforms: Vec<Box<dyn Platform>> =
            vec![Box::new(failing), Box::new(ok.clone())];

        let report = publisher()
            .publish(&platforms, &PublishRequest::text("hello"))
            .await;
        assert!(report.any_success());
        assert_eq!(report.succeeded(), vec!["threads"]);
        assert_eq!(ok.posted_content(), vec!["hello".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let flaky = MockPlatform::flaky("x", 2);
        let platforms: Vec<Box<dyn Platform>> = vec![Box::new(flaky.clone())];

        let report = Publisher::new(Redactor::default())
            .publish(&platforms, &PublishRequest::text("hello"))
            .await;
        assert!(report.any_success());
        assert_eq!(flaky.post_call_count(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let failing = MockPlatform::post_failure("x", "Forbidden");
        let platforms: Vec<Box<dyn Platform>> = vec![Box::new(failing.clone())];

        let report = Publisher::new(Redactor::default())
            .publish(&platforms, &PublishRequest::text("hello"))
            .await;
        assert!(!report.any_success());
        assert_eq!(failing.post_call_count(), 1);
    }

    #[tokio::test]
    async fn test_error_text_is_redacted() {
        let failing = MockPlatform::post_failure("x", "bad key sk-live-secret");
        let platforms: Vec<Box<dyn Platform>> = vec![Box::new(failing)];

        let report = publisher()
            .publish(&platforms, &PublishRequest::text("hello"))
            .await;
        let error = report.results[0].error.as_deref().unwrap();
        assert!(!error.contains("sk-live-secret"));
        assert!(error.contains("***"));
    }

    #[tokio::test]
    async fn test_local_image_dropped_for_url_only_platform() {
        let x = MockPlatform::success("x");
        let threads = MockPlatform::text_only("threads");
        let platforms: Vec<Box<dyn Platform>> = vec![Box::new(x.clone()), Box::new(threads.clone())];
        let request =
            PublishRequest::text("with picture").with_image(MediaAttachment::new("/tmp/p.png"));

        let report = publisher().publish(&platforms, &request).await;
        assert_eq!(report.succeeded(), vec!["x", "threads"]);
        assert!(x.posted_requests()[0].image.is_some());
        assert!(threads.posted_requests()[0].image.is_none());
    }

    #[tokio::test]
    async fn test_invalid_content_is_not_posted() {
        let limited = MockPlatform::with_limit("threads", 5);
        let platforms: Vec<Box<dyn Platform>> = vec![Box::new(limited.clone())];

        let report = publisher()
            .publish(&platforms, &PublishRequest::text("far too long"))
            .await;
        assert!(!report.any_success());
        assert!(report.results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("character limit"));
        assert_eq!(limited.post_call_count(), 0);
    }

    #[test]
    fn test_factory_rejects_unknown_platform() {
        let factory = HttpPlatformFactory::new(Client::new());
        let err = factory.create("linkedin", &Config::default()).err().unwrap();
        assert_eq!(err.status_code(), 400);
        assert!(factory.create("x", &Config::default()).is_ok());
        let threads = factory.create("threads", &Config::default()).unwrap();
        assert_eq!(threads.name(), "threads");
        assert!(!threads.is_configured());
    }
}

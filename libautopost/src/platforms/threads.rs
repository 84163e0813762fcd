//! Threads platform implementation
//!
//! Publishing is a two-phase handshake with the Threads Graph API:
//!
//! 1. `POST /me/threads` creates a media container (text, or text plus a
//!    public image URL) and returns its id.
//! 2. The container status is polled every 2 seconds, up to 15 times, until
//!    it reports `FINISHED`. `ERROR` aborts with the provider's message; when
//!    polling runs out a warning is logged and publishing is attempted anyway.
//! 3. `POST /me/threads_publish` publishes the container and returns the post id.
//!
//! Creating and publishing are retried one step at a time, so a transient
//! failure while publishing reuses the container that already exists.
//!
//! Threads fetches images by URL, so a local image file without a public URL
//! is dropped and the text is published alone.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::credentials::Redactor;
use crate::error::{PlatformError, Result};
use crate::platforms::{map_status_error, map_transport_error, validate_length, Platform};
use crate::retry::{retry, RetryPolicy};
use crate::types::{ConnectionCheck, PublishRequest};

pub const THREADS_API_BASE: &str = "https://graph.threads.net";

/// Threads post length limit
pub const CHARACTER_LIMIT: usize = 500;

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const MAX_POLLS: u32 = 15;

/// Lifetime of a refreshed long-lived token
pub const LONG_LIVED_TOKEN_DAYS: u64 = 60;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Graph API error code for an expired or invalidated session
const EXPIRED_SESSION_CODE: i64 = 190;

const EXPIRED_HINT: &str = "Suggestion: The Threads access token has expired. \
     Refresh it from the settings page or issue a new one in the Meta developer console.";

/// A long-lived token returned by the refresh endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Seconds until expiry
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl RefreshedToken {
    /// Validity in whole days
    pub fn expires_in_days(&self) -> u64 {
        self.expires_in
            .map(|s| s / 86_400)
            .unwrap_or(LONG_LIVED_TOKEN_DAYS)
    }
}

pub struct ThreadsClient {
    client: Client,
    token: String,
    base_url: String,
    poll_interval: Duration,
    max_polls: u32,
    retry: RetryPolicy,
    redactor: Redactor,
}

impl ThreadsClient {
    pub fn new(client: Client, token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            client,
            redactor: Redactor::new([token.as_str()]),
            token,
            base_url: THREADS_API_BASE.to_string(),
            poll_interval: POLL_INTERVAL,
            max_polls: MAX_POLLS,
            retry: RetryPolicy::default(),
        }
    }

    /// Point the client at another host (used by tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1.0/{}", self.base_url, path)
    }

    /// Step 1: create the media container
    async fn create_container(&self, request: &PublishRequest) -> Result<String> {
        let image_url = request
            .image
            .as_ref()
            .and_then(|image| image.public_url.as_deref());
        let mut params: Vec<(&str, &str)> = vec![("text", request.text.as_str())];
        match image_url {
            Some(url) => {
                params.push(("media_type", "IMAGE"));
                params.push(("image_url", url));
            }
            None => {
                if request.image.is_some() {
                    warn!("Threads needs a public image URL; publishing text only");
                }
                params.push(("media_type", "TEXT"));
            }
        }

        let response = self
            .client
            .post(self.url("me/threads"))
            .bearer_auth(&self.token)
            .query(&params)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "Threads container creation"))?;
        let response = self.check(response, "container creation").await?;

        let created: IdResponse = response.json().await.map_err(|e| {
            PlatformError::Posting(format!("Unexpected Threads response: {}", e.without_url()))
        })?;
        created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PlatformError::Posting("Threads returned no container id".to_string()).into())
    }

    /// Step 2: wait until the container has been processed
    ///
    /// Returns `Ok(true)` when the container finished and `Ok(false)` when
    /// polling ran out without a final status.
    async fn wait_for_container(&self, container_id: &str) -> Result<bool> {
        for attempt in 1..=self.max_polls {
            sleep(self.poll_interval).await;

            let response = match self
                .client
                .get(self.url(container_id))
                .bearer_auth(&self.token)
                .query(&[("fields", "status,error_message")])
                .timeout(STATUS_TIMEOUT)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    debug!("Container status check {} failed: {}", attempt, e.without_url());
                    continue;
                }
            };
            if !response.status().is_success() {
                debug!(
                    "Container status check {} returned HTTP {}",
                    attempt,
                    response.status().as_u16()
                );
                continue;
            }

            let status: ContainerStatus = match response.json().await {
                Ok(status) => status,
                Err(_) => continue,
            };
            match status.status.as_deref() {
                Some("FINISHED") => {
                    debug!("Container {} finished after {} checks", container_id, attempt);
                    return Ok(true);
                }
                Some("ERROR") => {
                    let message = status
                        .error_message
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Err(PlatformError::Posting(format!(
                        "Threads container processing failed: {}",
                        self.redactor.redact(&message)
                    ))
                    .into());
                }
                _ => {}
            }
        }
        Ok(false)
    }

    /// Step 3: publish the processed container
    async fn publish_container(&self, container_id: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url("me/threads_publish"))
            .bearer_auth(&self.token)
            .query(&[("creation_id", container_id)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "Threads publish"))?;
        let response = self.check(response, "publish").await?;

        let published: IdResponse = response.json().await.map_err(|e| {
            PlatformError::Posting(format!("Unexpected Threads response: {}", e.without_url()))
        })?;
        Ok(published.id.unwrap_or_else(|| "unknown".to_string()))
    }

    /// Exchange the current token for a long-lived one
    ///
    /// The token travels as a query parameter, so it is stripped from every
    /// error this returns.
    pub async fn refresh_token(&self) -> Result<RefreshedToken> {
        if self.token.trim().is_empty() {
            return Err(PlatformError::NotConfigured(
                "Threads access token is not set".to_string(),
            )
            .into());
        }

        let response = self
            .client
            .get(format!("{}/refresh_access_token", self.base_url))
            .query(&[
                ("grant_type", "th_refresh_token"),
                ("access_token", self.token.as_str()),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "Threads token refresh"))?;
        let response = self.check(response, "token refresh").await?;

        let body = response.text().await.map_err(|e| {
            PlatformError::Posting(format!("Failed to read refresh response: {}", e.without_url()))
        })?;
        let refreshed: RefreshedToken = serde_json::from_str(&body).map_err(|_| {
            PlatformError::Posting(
                "Token refresh response did not contain an access_token".to_string(),
            )
        })?;
        info!(
            "Threads token refreshed, valid for {} days",
            refreshed.expires_in_days()
        );
        Ok(refreshed)
    }

    async fn fetch_username(&self) -> std::result::Result<String, PlatformError> {
        let response = self
            .client
            .get(self.url("me"))
            .bearer_auth(&self.token)
            .query(&[("fields", "id,username")])
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "Threads profile lookup"))?;
        let response = self.check(response, "profile lookup").await?;
        let me: ThreadsUser = response
            .json()
            .await
            .map_err(|e| PlatformError::Posting(e.without_url().to_string()))?;
        Ok(me.username.unwrap_or_else(|| "?".to_string()))
    }

    /// Pass through a success response or build a redacted platform error
    async fn check(
        &self,
        response: Response,
        action: &str,
    ) -> std::result::Result<Response, PlatformError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let mut message = format!(
            "Threads {} failed (HTTP {}): {}",
            action,
            status.as_u16(),
            self.redactor.redact(body.trim())
        );
        if is_expired_session(&body) {
            message = format!("{}. {}", message, EXPIRED_HINT);
            return Err(PlatformError::Authentication(message));
        }
        Err(map_status_error(status.as_u16(), message))
    }
}

#[async_trait]
impl Platform for ThreadsClient {
    async fn post(&self, request: &PublishRequest) -> Result<String> {
        if !self.is_configured() {
            return Err(PlatformError::NotConfigured(
                "Threads access token is not set. Suggestion: Add it in the API settings."
                    .to_string(),
            )
            .into());
        }
        self.validate_content(&request.text)?;

        let container_id = retry(&self.retry, "creating Threads container", || {
            self.create_container(request)
        })
        .await?;
        debug!("Created Threads container {}", container_id);

        if !self.wait_for_container(&container_id).await? {
            warn!(
                "Threads container {} not finished after {} checks, publishing anyway",
                container_id, self.max_polls
            );
        }

        let post_id = retry(&self.retry, "publishing Threads container", || {
            self.publish_container(&container_id)
        })
        .await?;
        info!("Posted to Threads: {}", post_id);
        Ok(post_id)
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        validate_length(content, Some(CHARACTER_LIMIT))
    }

    fn name(&self) -> &str {
        "threads"
    }

    fn character_limit(&self) -> Option<usize> {
        Some(CHARACTER_LIMIT)
    }

    fn is_configured(&self) -> bool {
        !self.token.trim().is_empty()
    }

    fn retries_steps(&self) -> bool {
        true
    }

    async fn check_connection(&self) -> ConnectionCheck {
        if !self.is_configured() {
            return ConnectionCheck::failed("threads", "Threads access token is not set");
        }
        match self.fetch_username().await {
            Ok(username) => ConnectionCheck::ok("threads", format!("Connected (@{})", username)),
            Err(e) => ConnectionCheck::failed("threads", e.to_string()),
        }
    }
}

/// Whether a Graph API error body reports an expired session
fn is_expired_session(body: &str) -> bool {
    serde_json::from_str::<GraphErrorEnvelope>(body)
        .map(|env| env.error.code == Some(EXPIRED_SESSION_CODE))
        .unwrap_or(false)
}

// === Request/Response Types ===

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    status: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadsUser {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    code: Option<i64>,
}

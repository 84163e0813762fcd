//! X platform implementation
//!
//! Posts go through the v2 `POST /2/tweets` endpoint. Images are uploaded
//! first through the v1.1 media endpoint, optionally followed by an alt text
//! metadata call, and the returned media id is attached to the post. Every
//! request is signed with OAuth 1.0a user context (HMAC-SHA1).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use sha1::Sha1;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ApiKeys;
use crate::credentials::Secret;
use crate::error::{PlatformError, Result};
use crate::platforms::{map_status_error, map_transport_error, validate_length, Platform};
use crate::types::{ConnectionCheck, MediaAttachment, PublishRequest};

type HmacSha1 = Hmac<Sha1>;

pub const X_API_BASE: &str = "https://api.twitter.com";
pub const X_UPLOAD_BASE: &str = "https://upload.twitter.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// X accepts at most this many characters of alt text
const MAX_ALT_TEXT: usize = 1000;

const FORBIDDEN_HINT: &str = "Suggestion: Check that the app is attached to a Project in the \
     X developer portal and has Read and Write permission, then regenerate the access token.";

/// The four OAuth 1.0a values for user-context requests
#[derive(Debug, Clone, Default)]
pub struct XCredentials {
    pub api_key: Secret,
    pub api_secret: Secret,
    pub access_token: Secret,
    pub access_token_secret: Secret,
}

impl XCredentials {
    pub fn from_api_keys(keys: &ApiKeys) -> Self {
        Self {
            api_key: keys.x_api_key.clone(),
            api_secret: keys.x_api_secret.clone(),
            access_token: keys.x_access_token.clone(),
            access_token_secret: keys.x_access_token_secret.clone(),
        }
    }

    fn is_complete(&self) -> bool {
        !(self.api_key.is_empty()
            || self.api_secret.is_empty()
            || self.access_token.is_empty()
            || self.access_token_secret.is_empty())
    }
}

pub struct XClient {
    client: Client,
    credentials: XCredentials,
    api_base: String,
    upload_base: String,
}

impl XClient {
    pub fn new(client: Client, credentials: XCredentials) -> Self {
        Self {
            client,
            credentials,
            api_base: X_API_BASE.to_string(),
            upload_base: X_UPLOAD_BASE.to_string(),
        }
    }

    /// Point both endpoints at another host (used by tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base = base_url.into().trim_end_matches('/').to_string();
        self.api_base = base.clone();
        self.upload_base = base;
        self
    }

    fn authorization(&self, method: &str, url: &str) -> String {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = chrono::Utc::now().timestamp();
        oauth_header(method, url, &self.credentials, &nonce, timestamp)
    }

    /// Upload an image and return its media id
    async fn upload_media(&self, image: &MediaAttachment) -> Result<String> {
        let bytes = tokio::fs::read(&image.path).await.map_err(|e| {
            PlatformError::Posting(format!(
                "Failed to read image {}: {}",
                image.path.display(),
                e
            ))
        })?;
        let file_name = image
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());

        debug!("Uploading {} bytes of media to X", bytes.len());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(image.mime_type().as_str())
            .map_err(|e| PlatformError::Posting(format!("Invalid media type: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("media", part);

        let url = format!("{}/1.1/media/upload.json", self.upload_base);
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.authorization("POST", &url))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "X media upload"))?;
        let response = check_response(response, "media upload").await?;

        let upload: MediaUploadResponse = response.json().await.map_err(|e| {
            PlatformError::Posting(format!("Unexpected media upload response: {}", e.without_url()))
        })?;
        debug!("Uploaded media {}", upload.media_id_string);
        Ok(upload.media_id_string)
    }

    async fn set_alt_text(&self, media_id: &str, alt_text: &str) -> Result<()> {
        let alt_text: String = alt_text.chars().take(MAX_ALT_TEXT).collect();
        let url = format!("{}/1.1/media/metadata/create.json", self.upload_base);
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.authorization("POST", &url))
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "media_id": media_id, "alt_text": { "text": alt_text } }))
            .send()
            .await
            .map_err(|e| map_transport_error(e, "X media metadata"))?;
        check_response(response, "alt text").await?;
        Ok(())
    }

    async fn create_post(&self, text: &str, media_id: Option<&str>) -> Result<String> {
        let mut body = json!({ "text": text });
        if let Some(id) = media_id {
            body["media"] = json!({ "media_ids": [id] });
        }

        let url = format!("{}/2/tweets", self.api_base);
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.authorization("POST", &url))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "X post"))?;
        let response = check_response(response, "post").await?;

        let created: DataEnvelope<CreatedPost> = response.json().await.map_err(|e| {
            PlatformError::Posting(format!("Unexpected X response: {}", e.without_url()))
        })?;
        Ok(created.data.id)
    }
}

#[async_trait]
impl Platform for XClient {
    async fn post(&self, request: &PublishRequest) -> Result<String> {
        if !self.is_configured() {
            return Err(PlatformError::NotConfigured(
                "X credentials are incomplete. Suggestion: Set all four X keys in the API settings."
                    .to_string(),
            )
            .into());
        }
        self.validate_content(&request.text)?;

        let media_id = match &request.image {
            Some(image) => {
                let id = self.upload_media(image).await?;
                if let Some(alt) = image.alt_text.as_deref() {
                    // alt text is best effort; the post goes out without it
                    if let Err(e) = self.set_alt_text(&id, alt).await {
                        warn!("Failed to set alt text on X media {}: {}", id, e);
                    }
                }
                Some(id)
            }
            None => None,
        };

        let post_id = self.create_post(&request.text, media_id.as_deref()).await?;
        info!("Posted to X: {}", post_id);
        Ok(post_id)
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        validate_length(content, None)
    }

    fn name(&self) -> &str {
        "x"
    }

    fn character_limit(&self) -> Option<usize> {
        None
    }

    fn is_configured(&self) -> bool {
        self.credentials.is_complete()
    }

    fn supports_local_images(&self) -> bool {
        true
    }

    async fn check_connection(&self) -> ConnectionCheck {
        if !self.is_configured() {
            return ConnectionCheck::failed("x", "X credentials are incomplete");
        }

        match self.fetch_me().await {
            Ok(me) => ConnectionCheck::ok("x", format!("Connected (@{})", me.username)),
            Err(e) => ConnectionCheck::failed("x", e.to_string()),
        }
    }
}

impl XClient {
    async fn fetch_me(&self) -> std::result::Result<XUser, PlatformError> {
        let url = format!("{}/2/users/me", self.api_base);
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.authorization("GET", &url))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "X user lookup"))?;
        let response = check_response(response, "user lookup").await?;
        let me: DataEnvelope<XUser> = response
            .json()
            .await
            .map_err(|e| PlatformError::Posting(e.without_url().to_string()))?;
        Ok(me.data)
    }
}

/// Pass through a success response or turn the failure into a platform error
async fn check_response(
    response: Response,
    action: &str,
) -> std::result::Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = error_detail(&body);
    let mut message = format!("X {} failed (HTTP {}): {}", action, status.as_u16(), detail);
    if status.as_u16() == 403 {
        message = format!("{}. {}", message, FORBIDDEN_HINT);
    }
    Err(map_status_error(status.as_u16(), message))
}

/// Readable message from an X error body
fn error_detail(body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<XErrorBody>(body) {
        if let Some(detail) = err.detail.filter(|d| !d.is_empty()) {
            return detail;
        }
        if let Some(first) = err.errors.into_iter().find_map(|e| e.message) {
            return first;
        }
        if let Some(title) = err.title.filter(|t| !t.is_empty()) {
            return title;
        }
    }
    if body.trim().is_empty() {
        "empty response".to_string()
    } else {
        body.chars().take(300).collect()
    }
}

/// RFC 3986 percent-encoding as OAuth 1.0a requires
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// OAuth 1.0a HMAC-SHA1 signature over the request and `params`
///
/// `params` holds every oauth_* value plus any query or form parameters.
/// JSON and multipart bodies are not signed.
pub fn oauth_signature(
    method: &str,
    url: &str,
    params: &[(&str, &str)],
    consumer_secret: &str,
    token_secret: &str,
) -> String {
    let mut encoded: Vec<(String, String)> =
        params.iter().map(|(k, v)| (encode(k), encode(v))).collect();
    encoded.sort();
    let parameter_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let base = format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(url),
        encode(&parameter_string)
    );
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));

    let mut mac =
        HmacSha1::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(base.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Build the `Authorization: OAuth ...` header value
pub fn oauth_header(
    method: &str,
    url: &str,
    credentials: &XCredentials,
    nonce: &str,
    timestamp: i64,
) -> String {
    let timestamp = timestamp.to_string();
    let mut params = vec![
        ("oauth_consumer_key", credentials.api_key.expose()),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp.as_str()),
        ("oauth_token", credentials.access_token.expose()),
        ("oauth_version", "1.0"),
    ];
    let signature = oauth_signature(
        method,
        url,
        &params,
        credentials.api_secret.expose(),
        credentials.access_token_secret.expose(),
    );
    params.push(("oauth_signature", signature.as_str()));
    params.sort_by(|a, b| a.0.cmp(b.0));

    let fields = params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {}", fields)
}

// === Request/Response Types ===

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: String,
}

#[derive(Debug, Deserialize)]
struct XUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    media_id_string: String,
}

#[derive(Debug, Deserialize)]
struct XErrorBody {
    detail: Option<String>,
    title: Option<String>,
    #[serde(default)]
    errors: Vec<XErrorItem>,
}

#[derive(Debug, Deserialize)]
struct XErrorItem {
    message: Option<String>,
}

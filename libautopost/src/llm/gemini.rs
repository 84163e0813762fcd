//! Gemini API client
//!
//! Implements [`TextModel`] against the `generateContent` endpoint. The API
//! key travels in the `x-goog-api-key` header rather than the query string,
//! so request URLs can be logged safely.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::ModelError;
use crate::llm::{GenerationRequest, TextModel};
use crate::types::ConnectionCheck;

/// Gemini API base URL
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Gemini API client
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(client: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Point the client at another endpoint (used by tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.base_url, model)
    }

    fn build_request(request: &GenerationRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            system_instruction: request.system_directive.as_ref().map(|text| Content {
                role: None,
                parts: vec![Part { text: text.clone() }],
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        }
    }

    /// Send a trivial prompt to confirm the key and model work
    pub async fn check_connection(&self) -> ConnectionCheck {
        let request = GenerationRequest::new("OK", 0.0);
        match self.generate(&self.model, &request).await {
            Ok(_) => ConnectionCheck::ok("gemini", format!("Connected ({})", self.model)),
            Err(e) => ConnectionCheck::failed("gemini", e.to_string()),
        }
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    fn default_model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<String, ModelError> {
        debug!(model = %model, "Sending request to Gemini API");

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&Self::build_request(request))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();

        if status.is_success() {
            let body: GenerateContentResponse = response.json().await.map_err(|e| {
                let e = e.without_url();
                error!(error = %e, "Failed to parse Gemini API response");
                ModelError::InvalidResponse(e.to_string())
            })?;

            let text = body
                .candidates
                .into_iter()
                .filter_map(|c| c.content)
                .flat_map(|c| c.parts)
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("");

            if text.trim().is_empty() {
                return Err(ModelError::InvalidResponse(
                    "No text content in response".to_string(),
                ));
            }

            debug!(text_length = text.len(), "Received response from Gemini API");
            Ok(text.trim().to_string())
        } else {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body, status.as_u16());

            match status.as_u16() {
                401 | 403 => {
                    error!("Gemini API authentication failed");
                    Err(ModelError::Unauthorized(message))
                }
                404 => Err(ModelError::ModelNotFound(format!("{}: {}", model, message))),
                429 => {
                    warn!("Gemini API rate limit exceeded");
                    Err(ModelError::RateLimited(message))
                }
                503 => {
                    warn!("Gemini API unavailable");
                    Err(ModelError::Unavailable(message))
                }
                400 => {
                    error!(body = %message, "Gemini API invalid request");
                    Err(ModelError::InvalidRequest(message))
                }
                _ => {
                    error!(status = %status, body = %message, "Gemini API error");
                    Err(ModelError::Provider(format!("HTTP {}: {}", status.as_u16(), message)))
                }
            }
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> ModelError {
    let e = e.without_url();
    if e.is_timeout() {
        ModelError::Timeout(e.to_string())
    } else {
        ModelError::Network(e.to_string())
    }
}

/// Pull the human-readable message out of a Gemini error body
fn error_message(body: &str, status: u16) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|env| match env.error.status {
            Some(code) if !code.is_empty() => format!("{} ({})", env.error.message, code),
            _ => env.error.message,
        })
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                body.chars().take(300).collect()
            }
        })
}

// === Request/Response Types ===

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

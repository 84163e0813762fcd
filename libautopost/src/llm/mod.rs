//! Text generation model abstraction
//!
//! The content generator talks to a [`TextModel`]. The production
//! implementation is [`gemini::GeminiClient`]; [`mock::MockTextModel`] returns
//! scripted responses for tests.
//!
//! [`generate_with_fallback`] is the one entry point callers use: it wraps the
//! call in the retry policy and, when the configured model does not exist,
//! repeats the request once with [`FALLBACK_MODEL`].

use async_trait::async_trait;
use tracing::warn;

use crate::error::ModelError;
use crate::retry::{retry, RetryPolicy};

pub mod gemini;

// Mock model is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Model used when the configured one is not found
pub const FALLBACK_MODEL: &str = "gemini-2.5-pro";

/// A single prompt sent to the model
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    /// Persona or role text sent as the system instruction
    pub system_directive: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            system_directive: None,
        }
    }

    /// Attach a system directive, ignoring blank text
    pub fn with_system_directive(mut self, directive: &str) -> Self {
        let directive = directive.trim();
        if !directive.is_empty() {
            self.system_directive = Some(directive.to_string());
        }
        self
    }
}

#[async_trait]
pub trait TextModel: Send + Sync {
    /// Model used when the caller does not name one
    fn default_model(&self) -> &str;

    /// Run one generation call against `model`
    async fn generate(&self, model: &str, request: &GenerationRequest)
        -> Result<String, ModelError>;
}

/// Generate with retries, falling back to [`FALLBACK_MODEL`] once on model-not-found
pub async fn generate_with_fallback(
    model: &dyn TextModel,
    request: &GenerationRequest,
    policy: &RetryPolicy,
) -> Result<String, ModelError> {
    let primary: &str = model.default_model();
    match retry(policy, "model call", || model.generate(primary, request)).await {
        Err(ModelError::ModelNotFound(reason)) if primary != FALLBACK_MODEL => {
            warn!(
                "Model {} not available ({}), retrying with {}",
                primary, reason, FALLBACK_MODEL
            );
            retry(policy, "model call", || model.generate(FALLBACK_MODEL, request)).await
        }
        other => other,
    }
}

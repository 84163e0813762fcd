//! Scripted text model for testing
//!
//! Responses are returned in the order they were queued; once the queue is
//! empty every call returns the default response. Every request is recorded
//! together with the model name it was sent to.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::ModelError;
use crate::llm::{GenerationRequest, TextModel};

#[derive(Clone)]
pub struct MockTextModel {
    model: String,
    default_response: String,
    responses: Arc<Mutex<VecDeque<Result<String, ModelError>>>>,
    requests: Arc<Mutex<Vec<(String, GenerationRequest)>>>,
}

impl MockTextModel {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            default_response: "Mock generated post".to_string(),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Mock that answers every call with `text`
    pub fn replying(text: &str) -> Self {
        Self::new(crate::config::DEFAULT_MODEL).with_default_response(text)
    }

    pub fn with_default_response(mut self, text: &str) -> Self {
        self.default_response = text.to_string();
        self
    }

    pub fn with_responses(self, responses: Vec<Result<String, ModelError>>) -> Self {
        self.responses.lock().unwrap().extend(responses);
        self
    }

    pub fn push_response(&self, response: Result<String, ModelError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// All requests made so far, with the model each was sent to
    pub fn requests(&self) -> Vec<(String, GenerationRequest)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Prompt of the most recent request
    pub fn last_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .map(|(_, r)| r.prompt.clone())
    }
}

#[async_trait]
impl TextModel for MockTextModel {
    fn default_model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<String, ModelError> {
        self.requests
            .lock()
            .unwrap()
            .push((model.to_string(), request.clone()));

        let scripted = self.responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.default_response.clone()))
    }
}

//! Ollama `/api/generate` client

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prompt::{answer_prompt, expansion_prompt, parse_variants};
use super::{AnswerGenerator, QueryExpander};
use crate::{GroveError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Non-streaming completion client for an Ollama server
///
/// Implements both [`QueryExpander`] and [`AnswerGenerator`]; the two roles
/// differ only in prompt and in the error variant a failure maps to.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `prompt` and return the trimmed completion text
    ///
    /// Errors are plain strings; callers wrap them in the variant for their role.
    fn complete(&self, prompt: &str) -> std::result::Result<String, String> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .map_err(|e| format!("ollama request failed: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(format!("ollama returned {status}: {body}"));
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| format!("ollama response has no usable \"response\" field: {e}"))?;
        Ok(parsed.response.trim().to_string())
    }
}

impl QueryExpander for OllamaClient {
    fn expand(&self, question: &str, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let text = self
            .complete(&expansion_prompt(question, count))
            .map_err(GroveError::ExpansionProvider)?;

        let mut variants = parse_variants(&text);
        variants.truncate(count);
        debug!(model = %self.model, requested = count, received = variants.len(), "question expanded");
        Ok(variants)
    }
}

impl AnswerGenerator for OllamaClient {
    fn generate(&self, question: &str, passages: &[&str]) -> Result<String> {
        let answer = self
            .complete(&answer_prompt(question, passages))
            .map_err(GroveError::GenerationProvider)?;
        debug!(model = %self.model, passages = passages.len(), chars = answer.len(), "answer generated");
        Ok(answer)
    }
}

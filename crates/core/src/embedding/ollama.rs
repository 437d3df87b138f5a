//! Ollama embedding provider
//!
//! Talks to the `/api/embed` endpoint of an Ollama server, which accepts a batch
//! of inputs per request.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Embedder;
use crate::{GroveError, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embedder backed by an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    /// Expected output width; 0 accepts whatever the model returns
    dimension: usize,
    timeout: Duration,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension: 0,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Reject responses whose vectors are not `dimension` wide
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether the server answers `/api/tags`
    pub fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).timeout(Duration::from_secs(5)).send() {
            Ok(response) if response.status().is_success() => {
                debug!(model = %self.model, "ollama health check passed");
                true
            }
            Ok(response) => {
                warn!(status = %response.status(), "ollama health check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "ollama unreachable");
                false
            }
        }
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .map_err(|e| GroveError::EmbeddingProvider(format!("ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GroveError::EmbeddingProvider(format!(
                "ollama returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .map_err(|e| GroveError::EmbeddingProvider(format!("ollama response parse error: {e}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(GroveError::EmbeddingProvider(format!(
                "ollama returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            )));
        }
        if self.dimension > 0 {
            if let Some(bad) = parsed.embeddings.iter().find(|v| v.len() != self.dimension) {
                return Err(GroveError::EmbeddingProvider(format!(
                    "model {} returned {} dimensions, expected {}",
                    self.model,
                    bad.len(),
                    self.dimension
                )));
            }
        }

        debug!(model = %self.model, inputs = texts.len(), "embedded batch");
        Ok(parsed.embeddings)
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(&[text])?
            .pop()
            .ok_or_else(|| GroveError::EmbeddingProvider("empty ollama response".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_settings() {
        let embedder = OllamaEmbedder::new("http://example:11434/", "nomic-embed-text")
            .with_dimension(768)
            .with_timeout(Duration::from_secs(3));
        assert_eq!(embedder.base_url, "http://example:11434");
        assert_eq!(embedder.dimension(), 768);
        assert_eq!(embedder.name(), "nomic-embed-text");
        assert_eq!(embedder.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(EmbedRequest {
            model: "m",
            input: &["a", "b"],
        })
        .unwrap();
        assert_eq!(body["model"], "m");
        assert_eq!(body["input"][1], "b");
    }

    #[test]
    fn test_unreachable_server_is_provider_error() {
        // Port 9 (discard) on localhost is not an Ollama server
        let embedder = OllamaEmbedder::new("http://127.0.0.1:9", "m")
            .with_timeout(Duration::from_millis(500));
        assert!(matches!(
            embedder.embed("hello"),
            Err(GroveError::EmbeddingProvider(_))
        ));
        assert!(embedder.embed_batch(&[]).unwrap().is_empty());
    }
}

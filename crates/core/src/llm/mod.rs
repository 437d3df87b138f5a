//! Language-model providers
//!
//! Two capabilities are consumed from an LLM: paraphrasing a question into
//! search variants ([`QueryExpander`]) and answering a question from retrieved
//! passages ([`AnswerGenerator`]). [`OllamaClient`] implements both against an
//! Ollama server; [`prompt`] holds the templates and the variant parser.

pub mod prompt;
#[cfg(feature = "ollama")]
mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::OllamaClient;

use crate::Result;

/// Rephrases a question into search variants with the same meaning
pub trait QueryExpander: Send + Sync {
    /// At most `count` non-blank paraphrases of `question`
    ///
    /// Failures are [`GroveError::ExpansionProvider`](crate::GroveError::ExpansionProvider).
    fn expand(&self, question: &str, count: usize) -> Result<Vec<String>>;
}

/// Writes an answer grounded in supporting passages
pub trait AnswerGenerator: Send + Sync {
    /// Failures are [`GroveError::GenerationProvider`](crate::GroveError::GenerationProvider).
    fn generate(&self, question: &str, passages: &[&str]) -> Result<String>;
}

impl<T: QueryExpander + ?Sized> QueryExpander for std::sync::Arc<T> {
    fn expand(&self, question: &str, count: usize) -> Result<Vec<String>> {
        (**self).expand(question, count)
    }
}

impl<T: AnswerGenerator + ?Sized> AnswerGenerator for std::sync::Arc<T> {
    fn generate(&self, question: &str, passages: &[&str]) -> Result<String> {
        (**self).generate(question, passages)
    }
}

/// Expander for straight retrieval, which never asks for variants
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExpansion;

impl QueryExpander for NoExpansion {
    fn expand(&self, _question: &str, _count: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

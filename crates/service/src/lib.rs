//! Grove - retrieval service
//!
//! Wires the core index and retrieval layer to Ollama providers and on-disk
//! storage:
//!
//! - [`service::RetrievalService`]: the shared, reconfigurable request handler
//! - [`ingest`]: chunk file → embeddings → forest → storage
//! - [`settings::Settings`]: TOML + `GROVE_*` configuration
//! - [`telemetry`]: tracing subscriber for the `grove` binary

pub mod ingest;
pub mod service;
pub mod settings;
pub mod telemetry;

use std::sync::Arc;

use grove_core::embedding::{CachedEmbedder, Embedder, OllamaEmbedder};
use grove_core::llm::OllamaClient;
use grove_core::storage::IndexStorage;
use grove_core::Result;

pub use ingest::{ingest, IngestReport};
pub use service::{
    json_outcome, Answer, RetrievalService, RetrievalSettings, RetrievedChunk, ServiceStatus,
};
pub use settings::{Settings, SettingsError};

/// The embedder described by `[embedding]`, cached unless `cache_size` is 0
pub fn embedder_from_settings(settings: &Settings) -> Arc<dyn Embedder> {
    let embedding = &settings.embedding;
    let client = OllamaEmbedder::new(&embedding.base_url, &embedding.model)
        .with_dimension(embedding.dimension)
        .with_timeout(embedding.timeout());

    if embedding.cache_size == 0 {
        Arc::new(client)
    } else {
        Arc::new(CachedEmbedder::new(client, embedding.cache_size))
    }
}

/// A service with providers and storage from `settings`, nothing loaded yet
pub fn service_from_settings(settings: &Settings) -> Result<RetrievalService> {
    let storage = IndexStorage::with_codec(&settings.storage.path, settings.storage.codec)?;
    let llm = Arc::new(
        OllamaClient::new(&settings.llm.base_url, &settings.llm.model).with_timeout(settings.llm.timeout()),
    );
    RetrievalService::new(
        storage,
        embedder_from_settings(settings),
        llm.clone(),
        llm,
        settings.retrieval.to_config(),
    )
}

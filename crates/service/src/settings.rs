//! Service configuration
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied by the binary)
//! 2. Environment variables (`GROVE_*`)
//! 3. The TOML file passed with `--config`
//! 4. Compiled defaults
//!
//! ```toml
//! [index]
//! tree_count = 10
//! leaf_capacity = 32
//! metric = "angular"
//!
//! [retrieval]
//! multi_query = false
//! rag_fusion = true
//! result_count = 5
//! search_budget = 500
//!
//! [embedding]
//! model = "nomic-embed-text"
//!
//! [llm]
//! model = "llama3"
//!
//! [storage]
//! path = "grove-data"
//! codec = "gzip"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use grove_core::index::DEFAULT_SEARCH_BUDGET;
use grove_core::retrieval::{DEFAULT_RESULT_COUNT, DEFAULT_VARIANT_COUNT};
use grove_core::{
    Codec, ForestConfig, GroveError, Metric, RetrievalConfig, RetrievalStrategy, DEFAULT_RRF_K,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::DEFAULT_BATCH_SIZE;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const ENV_PREFIX: &str = "GROVE_";

/// Failure to assemble a valid [`Settings`]
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("environment variable {var} has invalid value {value:?}")]
    Env { var: String, value: String },

    #[error(transparent)]
    Invalid(#[from] GroveError),
}

/// Top-level configuration aggregating every section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index: ForestConfig,
    pub retrieval: RetrievalSection,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub storage: StorageSettings,
}

/// `[retrieval]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub multi_query: bool,
    pub rag_fusion: bool,
    pub result_count: usize,
    pub variant_count: usize,
    pub search_budget: usize,
    pub rrf_k: u32,
    pub include_original: bool,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            multi_query: false,
            rag_fusion: false,
            result_count: DEFAULT_RESULT_COUNT,
            variant_count: DEFAULT_VARIANT_COUNT,
            search_budget: DEFAULT_SEARCH_BUDGET,
            rrf_k: DEFAULT_RRF_K,
            include_original: false,
        }
    }
}

impl RetrievalSection {
    pub fn strategy(&self) -> RetrievalStrategy {
        RetrievalStrategy::from_flags(self.multi_query, self.rag_fusion)
    }

    pub fn to_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            strategy: self.strategy(),
            result_count: self.result_count,
            variant_count: self.variant_count,
            search_budget: self.search_budget,
            rrf_k: self.rrf_k,
            include_original: self.include_original,
        }
    }
}

/// `[embedding]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    /// Expected vector width, 0 to accept what the model returns
    pub dimension: usize,
    pub timeout_secs: u64,
    /// Chunks per embedding request during ingest
    pub batch_size: usize,
    /// Query embeddings kept in memory, 0 disables the cache
    pub cache_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: "nomic-embed-text".to_string(),
            dimension: 0,
            timeout_secs: 60,
            batch_size: DEFAULT_BATCH_SIZE,
            cache_size: 10_000,
        }
    }
}

impl EmbeddingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[llm]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: "llama3".to_string(),
            timeout_secs: 120,
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[storage]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub path: PathBuf,
    pub codec: Codec,
    pub index_name: String,
    pub chunks_name: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("grove-data"),
            codec: Codec::default(),
            index_name: "index".to_string(),
            chunks_name: "chunks".to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then `path` if given, then `GROVE_*` variables; validated
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Parse a TOML document; unset keys keep their defaults
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(|e| SettingsError::Parse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    /// Override fields from `GROVE_*` variables resolved through `lookup`
    ///
    /// Unset variables leave the field alone; unparsable values are an error
    /// rather than being skipped.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        env.parse("INDEX_TREE_COUNT", &mut self.index.tree_count)?;
        env.parse("INDEX_LEAF_CAPACITY", &mut self.index.leaf_capacity)?;
        if let Some(metric) = env.get("INDEX_METRIC") {
            self.index.metric = match metric.to_ascii_lowercase().as_str() {
                "angular" => Metric::Angular,
                "euclidean" => Metric::Euclidean,
                _ => return Err(env.invalid("INDEX_METRIC", metric)),
            };
        }
        if let Some(seed) = env.get("INDEX_SEED") {
            self.index.seed = Some(seed.parse().map_err(|_| env.invalid("INDEX_SEED", seed))?);
        }

        env.parse("RETRIEVAL_MULTI_QUERY", &mut self.retrieval.multi_query)?;
        env.parse("RETRIEVAL_RAG_FUSION", &mut self.retrieval.rag_fusion)?;
        env.parse("RETRIEVAL_RESULT_COUNT", &mut self.retrieval.result_count)?;
        env.parse("RETRIEVAL_VARIANT_COUNT", &mut self.retrieval.variant_count)?;
        env.parse("RETRIEVAL_SEARCH_BUDGET", &mut self.retrieval.search_budget)?;
        env.parse("RETRIEVAL_RRF_K", &mut self.retrieval.rrf_k)?;

        env.parse("EMBEDDING_URL", &mut self.embedding.base_url)?;
        env.parse("EMBEDDING_MODEL", &mut self.embedding.model)?;
        env.parse("EMBEDDING_DIMENSION", &mut self.embedding.dimension)?;
        env.parse("EMBEDDING_BATCH_SIZE", &mut self.embedding.batch_size)?;

        env.parse("LLM_URL", &mut self.llm.base_url)?;
        env.parse("LLM_MODEL", &mut self.llm.model)?;

        env.parse("STORAGE_PATH", &mut self.storage.path)?;
        env.parse("STORAGE_CODEC", &mut self.storage.codec)?;
        Ok(())
    }

    /// Reject values no component can run with
    pub fn validate(&self) -> Result<(), GroveError> {
        self.index.validate()?;
        self.retrieval.to_config().validate()?;

        if self.embedding.batch_size == 0 {
            return Err(GroveError::InvalidConfig("embedding.batch_size must be at least 1".into()));
        }
        if self.embedding.timeout_secs == 0 || self.llm.timeout_secs == 0 {
            return Err(GroveError::InvalidConfig("provider timeouts must be at least 1 second".into()));
        }
        for (field, url) in [
            ("embedding.base_url", &self.embedding.base_url),
            ("llm.base_url", &self.llm.base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(GroveError::InvalidConfig(format!(
                    "{field} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        if self.storage.index_name == self.storage.chunks_name {
            return Err(GroveError::InvalidConfig(
                "storage.index_name and storage.chunks_name must differ".into(),
            ));
        }
        Ok(())
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{key}"))
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, field: &mut T) -> Result<(), SettingsError> {
        if let Some(value) = self.get(key) {
            *field = value.parse().map_err(|_| self.invalid(key, value))?;
        }
        Ok(())
    }

    fn invalid(&self, key: &str, value: String) -> SettingsError {
        SettingsError::Env {
            var: format!("{ENV_PREFIX}{key}"),
            value,
        }
    }
}

//! Question → ranked chunk ids
//!
//! Three strategies share one entry point, [`Retriever::retrieve`]:
//!
//! - **Straight**: embed the question, search once.
//! - **MultiQuery**: have the LLM paraphrase the question, search every
//!   paraphrase, keep the union of ids in first-seen order.
//! - **RagFusion**: same fan-out, merged with reciprocal rank fusion.
//!
//! Paraphrases are embedded in a single batch call and searched in parallel.

pub mod fusion;

use std::collections::HashMap;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::index::{AnnIndex, RankedList, DEFAULT_SEARCH_BUDGET};
use crate::llm::QueryExpander;
use crate::{GroveError, Result};

use fusion::{reciprocal_rank_fusion, DEFAULT_RRF_K};

/// Default number of results returned per question
pub const DEFAULT_RESULT_COUNT: usize = 5;
/// Default number of paraphrases requested per question
pub const DEFAULT_VARIANT_COUNT: usize = 5;

/// How a question is turned into searches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    #[default]
    Straight,
    MultiQuery,
    RagFusion,
}

impl RetrievalStrategy {
    /// Map the two service toggles to a strategy; `multi_query` wins if both are set
    pub fn from_flags(multi_query: bool, rag_fusion: bool) -> Self {
        match (multi_query, rag_fusion) {
            (true, _) => RetrievalStrategy::MultiQuery,
            (false, true) => RetrievalStrategy::RagFusion,
            (false, false) => RetrievalStrategy::Straight,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RetrievalStrategy::Straight => "straight",
            RetrievalStrategy::MultiQuery => "multi_query",
            RetrievalStrategy::RagFusion => "rag_fusion",
        }
    }

    /// Whether the strategy asks the expander for paraphrases
    pub fn expands(&self) -> bool {
        !matches!(self, RetrievalStrategy::Straight)
    }
}

/// Retrieval parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub strategy: RetrievalStrategy,
    /// Results returned (N)
    pub result_count: usize,
    /// Paraphrases requested (M)
    pub variant_count: usize,
    /// Tree nodes visited per search
    ///
    /// Recall rises with the budget until every leaf is reached; latency rises
    /// linearly with it.
    pub search_budget: usize,
    pub rrf_k: u32,
    /// Also search the question itself alongside its paraphrases
    pub include_original: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: RetrievalStrategy::default(),
            result_count: DEFAULT_RESULT_COUNT,
            variant_count: DEFAULT_VARIANT_COUNT,
            search_budget: DEFAULT_SEARCH_BUDGET,
            rrf_k: DEFAULT_RRF_K,
            include_original: false,
        }
    }
}

impl RetrievalConfig {
    pub fn with_strategy(mut self, strategy: RetrievalStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_result_count(mut self, result_count: usize) -> Self {
        self.result_count = result_count;
        self
    }

    pub fn with_variant_count(mut self, variant_count: usize) -> Self {
        self.variant_count = variant_count;
        self
    }

    pub fn with_search_budget(mut self, search_budget: usize) -> Self {
        self.search_budget = search_budget;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.result_count == 0 {
            return Err(GroveError::InvalidConfig("result_count must be at least 1".into()));
        }
        if self.search_budget == 0 {
            return Err(GroveError::InvalidConfig("search_budget must be at least 1".into()));
        }
        Ok(())
    }
}

/// One retrieved id with a strategy-specific score (higher is better)
///
/// Straight and MultiQuery report similarity derived from the metric distance;
/// RagFusion reports the fused RRF score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievedId {
    pub id: u32,
    pub score: f64,
}

/// Outcome of one retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retrieval {
    pub strategy: RetrievalStrategy,
    /// Texts that were actually embedded and searched
    pub queries: Vec<String>,
    pub hits: Vec<RetrievedId>,
}

impl Retrieval {
    pub fn ids(&self) -> Vec<u32> {
        self.hits.iter().map(|hit| hit.id).collect()
    }
}

/// Runs a retrieval strategy against one index
///
/// Borrows everything it needs, so it is cheap to construct per request.
pub struct Retriever<'a> {
    index: &'a AnnIndex,
    embedder: &'a dyn Embedder,
    expander: &'a dyn QueryExpander,
    config: RetrievalConfig,
}

impl<'a> Retriever<'a> {
    pub fn new(
        index: &'a AnnIndex,
        embedder: &'a dyn Embedder,
        expander: &'a dyn QueryExpander,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            expander,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve up to `result_count` ids relevant to `question`
    ///
    /// # Errors
    /// * `EmptyQuery` - If the question is blank (checked before any provider call)
    /// * `InvalidConfig` - If the configuration fails validation
    /// * `EmbeddingProvider` / `ExpansionProvider` - Provider failures
    /// * `DimensionMismatch` - If embeddings do not match the index
    pub fn retrieve(&self, question: &str) -> Result<Retrieval> {
        if question.trim().is_empty() {
            return Err(GroveError::EmptyQuery);
        }
        self.config.validate()?;

        let start = Instant::now();
        let strategy = self.config.strategy;
        let queries = if strategy.expands() {
            self.search_queries(question)?
        } else {
            vec![question.to_string()]
        };

        let lists = self.search_all(&queries)?;
        let n = self.config.result_count;
        let hits = match strategy {
            RetrievalStrategy::Straight => self.similarity_hits(&lists[0]),
            RetrievalStrategy::MultiQuery => self.union_hits(&lists),
            RetrievalStrategy::RagFusion => {
                let ids: Vec<Vec<u32>> = lists.iter().map(RankedList::ids).collect();
                let mut fused = reciprocal_rank_fusion(&ids, self.config.rrf_k);
                fused.truncate(n);
                fused
                    .iter()
                    .map(|entry| RetrievedId {
                        id: entry.id,
                        score: entry.score,
                    })
                    .collect()
            }
        };

        debug!(
            strategy = strategy.name(),
            queries = queries.len(),
            hits = hits.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "retrieval finished"
        );

        Ok(Retrieval {
            strategy,
            queries,
            hits,
        })
    }

    /// Paraphrases to search, falling back to the question itself
    fn search_queries(&self, question: &str) -> Result<Vec<String>> {
        let wanted = self.config.variant_count;
        let mut queries: Vec<String> = if wanted == 0 {
            Vec::new()
        } else {
            self.expander
                .expand(question, wanted)?
                .into_iter()
                .map(|variant| variant.trim().to_string())
                .filter(|variant| !variant.is_empty())
                .take(wanted)
                .collect()
        };

        if queries.is_empty() {
            warn!(question, "no usable paraphrases, searching the question alone");
            return Ok(vec![question.to_string()]);
        }
        if self.config.include_original {
            queries.insert(0, question.to_string());
        }
        Ok(queries)
    }

    /// Embed every query in one batch and search them in parallel
    fn search_all(&self, queries: &[String]) -> Result<Vec<RankedList>> {
        let texts: Vec<&str> = queries.iter().map(String::as_str).collect();
        let vectors = if texts.len() == 1 {
            vec![self.embedder.embed(texts[0])?]
        } else {
            self.embedder.embed_batch(&texts)?
        };
        if vectors.len() != texts.len() {
            return Err(GroveError::EmbeddingProvider(format!(
                "{} returned {} embeddings for {} queries",
                self.embedder.name(),
                vectors.len(),
                texts.len()
            )));
        }

        let n = self.config.result_count;
        let budget = self.config.search_budget;
        vectors
            .par_iter()
            .map(|vector| self.index.search(vector, n, budget))
            .collect()
    }

    fn similarity_hits(&self, list: &RankedList) -> Vec<RetrievedId> {
        let metric = self.index.metric();
        list.iter()
            .take(self.config.result_count)
            .map(|hit| RetrievedId {
                id: hit.id,
                score: metric.similarity(hit.distance) as f64,
            })
            .collect()
    }

    /// First-seen union of the per-query lists, scored by best similarity
    fn union_hits(&self, lists: &[RankedList]) -> Vec<RetrievedId> {
        let metric = self.index.metric();
        let mut slots: HashMap<u32, usize> = HashMap::new();
        let mut hits: Vec<RetrievedId> = Vec::new();

        for list in lists {
            for hit in list.iter().take(self.config.result_count) {
                let score = metric.similarity(hit.distance) as f64;
                match slots.get(&hit.id) {
                    Some(&slot) => {
                        if score > hits[slot].score {
                            hits[slot].score = score;
                        }
                    }
                    None => {
                        slots.insert(hit.id, hits.len());
                        hits.push(RetrievedId { id: hit.id, score });
                    }
                }
            }
        }

        hits.truncate(self.config.result_count);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ForestBuilder, ForestConfig};
    use crate::vector::VectorStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds a text as the one-hot vector of its first byte modulo 8
    struct ByteEmbedder {
        calls: AtomicUsize,
    }

    impl ByteEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Embedder for ByteEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut v = vec![0.01; 8];
            v[(text.as_bytes()[0] % 8) as usize] = 1.0;
            Ok(v)
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    struct FixedExpander(Vec<String>);

    impl QueryExpander for FixedExpander {
        fn expand(&self, _question: &str, count: usize) -> Result<Vec<String>> {
            Ok(self.0.iter().take(count).cloned().collect())
        }
    }

    /// One vector per axis, each slightly tilted towards the next axis
    fn axis_index() -> AnnIndex {
        let mut store = VectorStore::new(8);
        for axis in 0..8 {
            let mut v = vec![0.0; 8];
            v[axis] = 1.0;
            v[(axis + 1) % 8] = 0.2;
            store.add(&v).unwrap();
        }
        ForestBuilder::new(ForestConfig::default().with_leaf_capacity(2).with_seed(1))
            .build(store)
            .unwrap()
    }

    #[test]
    fn test_from_flags() {
        assert_eq!(RetrievalStrategy::from_flags(false, false), RetrievalStrategy::Straight);
        assert_eq!(RetrievalStrategy::from_flags(true, false), RetrievalStrategy::MultiQuery);
        assert_eq!(RetrievalStrategy::from_flags(false, true), RetrievalStrategy::RagFusion);
        assert_eq!(RetrievalStrategy::from_flags(true, true), RetrievalStrategy::MultiQuery);
    }

    #[test]
    fn test_straight_returns_nearest_first() {
        let index = axis_index();
        let embedder = ByteEmbedder::new();
        let config = RetrievalConfig::default().with_result_count(3);
        let retriever = Retriever::new(&index, &embedder, &crate::llm::NoExpansion, config);

        // 'C' = 67, 67 % 8 = 3
        let retrieval = retriever.retrieve("Cats").unwrap();
        assert_eq!(retrieval.strategy, RetrievalStrategy::Straight);
        assert_eq!(retrieval.queries, vec!["Cats".to_string()]);
        assert_eq!(retrieval.hits.len(), 3);
        assert_eq!(retrieval.hits[0].id, 3);
        assert!(retrieval.hits[0].score >= retrieval.hits[1].score);
    }

    #[test]
    fn test_multi_query_unions_in_first_seen_order() {
        let index = axis_index();
        let embedder = ByteEmbedder::new();
        // 'B' = 66 -> axis 2, 'A' = 65 -> axis 1
        let expander = FixedExpander(vec!["Banana".into(), "Apple".into()]);
        let config = RetrievalConfig::default()
            .with_strategy(RetrievalStrategy::MultiQuery)
            .with_result_count(2);
        let retriever = Retriever::new(&index, &embedder, &expander, config);

        let retrieval = retriever.retrieve("fruit?").unwrap();
        assert_eq!(retrieval.queries, vec!["Banana".to_string(), "Apple".to_string()]);
        // Lists are [2, 1] and [1, 0]; the union is cut back to two
        assert_eq!(retrieval.ids(), vec![2, 1]);
        // id 1 keeps the similarity from the list where it ranked first
        assert!(retrieval.hits[1].score >= retrieval.hits[0].score - 1e-6);
    }

    #[test]
    fn test_rag_fusion_rewards_agreement() {
        let index = axis_index();
        let embedder = ByteEmbedder::new();
        let expander = FixedExpander(vec!["Apple".into(), "Avocado".into(), "Banana".into()]);
        let config = RetrievalConfig::default()
            .with_strategy(RetrievalStrategy::RagFusion)
            .with_result_count(2);
        let retriever = Retriever::new(&index, &embedder, &expander, config);

        let retrieval = retriever.retrieve("fruit?").unwrap();
        assert_eq!(retrieval.hits.len(), 2);
        // Two of three paraphrases land on axis 1
        assert_eq!(retrieval.hits[0].id, 1);
        assert!(retrieval.hits[0].score > retrieval.hits[1].score);
    }

    #[test]
    fn test_blank_question_rejected_before_providers() {
        let index = axis_index();
        let embedder = ByteEmbedder::new();
        let retriever = Retriever::new(
            &index,
            &embedder,
            &crate::llm::NoExpansion,
            RetrievalConfig::default(),
        );

        for question in ["", "   ", "\n\t"] {
            assert!(matches!(retriever.retrieve(question), Err(GroveError::EmptyQuery)));
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_no_variants_falls_back_to_question() {
        let index = axis_index();
        let embedder = ByteEmbedder::new();
        let expander = FixedExpander(vec!["   ".into(), String::new()]);
        let config = RetrievalConfig::default().with_strategy(RetrievalStrategy::RagFusion);
        let retriever = Retriever::new(&index, &embedder, &expander, config);

        let retrieval = retriever.retrieve("Cats").unwrap();
        assert_eq!(retrieval.queries, vec!["Cats".to_string()]);
        assert_eq!(retrieval.hits[0].id, 3);
    }

    #[test]
    fn test_include_original_searches_question_first() {
        let index = axis_index();
        let embedder = ByteEmbedder::new();
        let expander = FixedExpander(vec!["Apple".into()]);
        let config = RetrievalConfig {
            strategy: RetrievalStrategy::MultiQuery,
            include_original: true,
            ..RetrievalConfig::default()
        };
        let retriever = Retriever::new(&index, &embedder, &expander, config);

        let retrieval = retriever.retrieve("Cats").unwrap();
        assert_eq!(retrieval.queries, vec!["Cats".to_string(), "Apple".to_string()]);
        assert_eq!(retrieval.hits[0].id, 3);
    }

    #[test]
    fn test_variants_beyond_count_ignored() {
        let index = axis_index();
        let embedder = ByteEmbedder::new();
        let expander = FixedExpander(vec!["A1".into(), "B2".into(), "C3".into()]);
        let config = RetrievalConfig::default()
            .with_strategy(RetrievalStrategy::MultiQuery)
            .with_variant_count(2);
        let retriever = Retriever::new(&index, &embedder, &expander, config);

        let retrieval = retriever.retrieve("q").unwrap();
        assert_eq!(retrieval.queries.len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let index = axis_index();
        let embedder = ByteEmbedder::new();
        let config = RetrievalConfig::default().with_result_count(0);
        let retriever = Retriever::new(&index, &embedder, &crate::llm::NoExpansion, config);
        assert!(matches!(retriever.retrieve("q"), Err(GroveError::InvalidConfig(_))));
    }
}

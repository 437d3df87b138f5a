//! Benchmarks for the retrieval strategies and rank fusion
//!
//! Providers are in-process stand-ins, so the numbers isolate the cost of
//! fan-out, parallel search and merging from network latency.
//!
//! ## Running Benchmarks
//! ```bash
//! cargo bench -p grove-benches --bench retrieval
//! cargo bench -p grove-benches --bench retrieval -- rrf
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use grove_core::{
    reciprocal_rank_fusion, AnnIndex, Embedder, ForestBuilder, ForestConfig, QueryExpander,
    Result, RetrievalConfig, RetrievalStrategy, Retriever, VectorStore, DEFAULT_RRF_K,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIM: usize = 384;

/// Seeds a vector from the text bytes
struct SeededEmbedder;

impl Embedder for SeededEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let seed = text.bytes().fold(17u64, |h, b| h.wrapping_mul(31).wrapping_add(b as u64));
        let mut rng = StdRng::seed_from_u64(seed);
        Ok((0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

struct SuffixExpander;

impl QueryExpander for SuffixExpander {
    fn expand(&self, question: &str, count: usize) -> Result<Vec<String>> {
        Ok((0..count).map(|i| format!("{question} (variant {i})")).collect())
    }
}

fn corpus(count: usize) -> AnnIndex {
    let mut rng = StdRng::seed_from_u64(5);
    let mut store = VectorStore::with_capacity(DIM, count);
    for _ in 0..count {
        let v: Vec<f32> = (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();
        store.add(&v).unwrap();
    }
    ForestBuilder::new(ForestConfig::default().with_seed(9))
        .build(store)
        .unwrap()
}

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("retrieval_strategy");
    let index = corpus(10_000);

    for strategy in [
        RetrievalStrategy::Straight,
        RetrievalStrategy::MultiQuery,
        RetrievalStrategy::RagFusion,
    ] {
        for variants in [3, 5] {
            let config = RetrievalConfig::default()
                .with_strategy(strategy)
                .with_variant_count(variants);
            let retriever = Retriever::new(&index, &SeededEmbedder, &SuffixExpander, config);
            group.bench_with_input(
                BenchmarkId::new(strategy.name(), variants),
                &variants,
                |bench, _| {
                    bench.iter(|| black_box(retriever.retrieve(black_box("how do tides form")).unwrap()));
                },
            );
            if strategy == RetrievalStrategy::Straight {
                break;
            }
        }
    }

    group.finish();
}

fn bench_rrf(c: &mut Criterion) {
    let mut group = c.benchmark_group("rrf");
    let mut rng = StdRng::seed_from_u64(3);

    for (lists, len) in [(3, 10), (5, 10), (5, 100), (20, 100)] {
        let input: Vec<Vec<u32>> = (0..lists)
            .map(|_| (0..len).map(|_| rng.gen_range(0..(len as u32 * 2))).collect())
            .collect();
        group.bench_with_input(
            BenchmarkId::new(format!("{lists}_lists"), len),
            &input,
            |bench, input| {
                bench.iter(|| black_box(reciprocal_rank_fusion(black_box(input), DEFAULT_RRF_K)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_strategies, bench_rrf);
criterion_main!(benches);

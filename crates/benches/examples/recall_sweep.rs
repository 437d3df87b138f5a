//! Recall and latency as a function of the search budget
//!
//! Builds one forest, computes exact top-k by brute force, then reports
//! recall@k and query latency for a range of budgets (tree nodes visited per
//! query). Use it to pick `retrieval.search_budget` for a corpus size.
//!
//! Run with: cargo run -p grove-benches --example recall_sweep --release

use std::collections::HashSet;
use std::time::Instant;

use grove_core::{AnnIndex, ForestBuilder, ForestConfig, Metric, VectorStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NUM_VECTORS: usize = 20_000;
const NUM_QUERIES: usize = 200;
const DIM: usize = 128;
const K: usize = 10;
const BUDGETS: [usize; 8] = [25, 50, 100, 250, 500, 1_000, 2_500, 5_000];

/// Gaussian-ish clusters so neighbours are meaningful
fn generate_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let centers: Vec<Vec<f32>> = (0..64)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();

    (0..count)
        .map(|_| {
            let center = &centers[rng.gen_range(0..centers.len())];
            center.iter().map(|c| c + rng.gen_range(-0.3..0.3)).collect()
        })
        .collect()
}

fn exact_top_k(index: &AnnIndex, query: &[f32], k: usize) -> HashSet<u32> {
    let metric = index.metric();
    let mut scored: Vec<(f32, u32)> = index
        .store()
        .iter()
        .map(|(id, vector)| (metric.distance(query, vector), id))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    scored.into_iter().take(k).map(|(_, id)| id).collect()
}

fn main() {
    println!("=== Search Budget Sweep ===\n");
    println!(
        "Dataset: {} vectors, {}d, {} queries, top-{}\n",
        NUM_VECTORS, DIM, NUM_QUERIES, K
    );

    let base = generate_vectors(NUM_VECTORS, DIM, 42);
    let queries = generate_vectors(NUM_QUERIES, DIM, 7);

    let mut store = VectorStore::with_capacity(DIM, NUM_VECTORS);
    if let Err(e) = store.add_batch(&base) {
        eprintln!("cannot fill store: {e}");
        return;
    }

    for tree_count in [10, 25] {
        let config = ForestConfig::default()
            .with_tree_count(tree_count)
            .with_metric(Metric::Angular)
            .with_seed(1);

        let start = Instant::now();
        let index = match ForestBuilder::new(config).build(store.clone()) {
            Ok(index) => index,
            Err(e) => {
                eprintln!("build failed: {e}");
                return;
            }
        };
        println!(
            "--- {} trees, {} nodes, built in {:?} ---",
            tree_count,
            index.forest().node_count(),
            start.elapsed()
        );

        let truth: Vec<HashSet<u32>> = queries.iter().map(|q| exact_top_k(&index, q, K)).collect();

        println!("{:>8} {:>10} {:>12} {:>10}", "budget", "recall@10", "latency_us", "QPS");
        for budget in BUDGETS {
            let start = Instant::now();
            let mut hits = 0;
            for (query, expected) in queries.iter().zip(&truth) {
                let Ok(found) = index.search(query, K, budget) else {
                    continue;
                };
                hits += found.iter().filter(|hit| expected.contains(&hit.id)).count();
            }
            let elapsed = start.elapsed();

            let recall = hits as f64 / (NUM_QUERIES * K) as f64;
            let latency_us = elapsed.as_secs_f64() * 1e6 / NUM_QUERIES as f64;
            let qps = NUM_QUERIES as f64 / elapsed.as_secs_f64();
            println!("{:>8} {:>10.3} {:>12.1} {:>10.0}", budget, recall, latency_us, qps);
        }
        println!();
    }
}

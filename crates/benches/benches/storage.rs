//! Benchmarks for the storage layer
//!
//! - Compression codecs over index payloads
//! - Index codec save / load
//! - File storage round trips (atomic write, metadata, decompression)
//!
//! ## Running Benchmarks
//! ```bash
//! cargo bench -p grove-benches --bench storage
//! cargo bench -p grove-benches --bench storage --features lz4,zstd
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use grove_core::index::codec;
use grove_core::storage::{compress_with, decompress, Codec, IndexStorage};
use grove_core::{AnnIndex, ChunkStore, ForestBuilder, ForestConfig, VectorStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

const DIM: usize = 384;

fn index_of(count: usize) -> AnnIndex {
    let mut rng = StdRng::seed_from_u64(11);
    let mut store = VectorStore::with_capacity(DIM, count);
    for _ in 0..count {
        let v: Vec<f32> = (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();
        store.add(&v).unwrap();
    }
    ForestBuilder::new(ForestConfig::default().with_seed(2))
        .build(store)
        .unwrap()
}

fn chunks_of(count: usize) -> ChunkStore {
    ChunkStore::from_texts((0..count).map(|i| {
        (
            format!("Passage {i}: the quick brown fox jumps over the lazy dog. ").repeat(12),
            format!("article-{}", i / 10),
        )
    }))
    .unwrap()
}

fn codecs() -> Vec<Codec> {
    let mut codecs = vec![Codec::None, Codec::Gzip];
    #[cfg(feature = "lz4")]
    codecs.push(Codec::Lz4);
    #[cfg(feature = "zstd")]
    codecs.push(Codec::Zstd);
    codecs
}

fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression_codecs");
    let payload = codec::save(&index_of(2_000));
    group.throughput(Throughput::Bytes(payload.len() as u64));

    for codec in codecs() {
        group.bench_with_input(BenchmarkId::new("compress", codec.name()), &payload, |bench, payload| {
            bench.iter(|| black_box(compress_with(black_box(payload), codec).unwrap()));
        });

        let (framed, _) = compress_with(&payload, codec).unwrap();
        group.bench_with_input(BenchmarkId::new("decompress", codec.name()), &framed, |bench, framed| {
            bench.iter(|| black_box(decompress(black_box(framed)).unwrap()));
        });
    }

    group.finish();
}

fn bench_index_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_codec");
    group.sample_size(20);

    for count in [1_000, 10_000] {
        let index = index_of(count);
        let bytes = codec::save(&index);
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("save", count), &index, |bench, index| {
            bench.iter(|| black_box(codec::save(black_box(index))));
        });
        group.bench_with_input(BenchmarkId::new("load", count), &bytes, |bench, bytes| {
            bench.iter(|| black_box(codec::load(black_box(bytes)).unwrap()));
        });
    }

    group.finish();
}

fn bench_file_storage(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_storage");
    group.sample_size(20);
    let dir = TempDir::new().unwrap();
    let index = index_of(5_000);
    let chunks = chunks_of(5_000);

    for codec in codecs() {
        let storage = IndexStorage::with_codec(dir.path().join(codec.name()), codec).unwrap();

        group.bench_function(BenchmarkId::new("save_index", codec.name()), |bench| {
            bench.iter(|| storage.save_index("bench-index", black_box(&index)).unwrap());
        });
        group.bench_function(BenchmarkId::new("load_index", codec.name()), |bench| {
            bench.iter(|| black_box(storage.load_index("bench-index").unwrap()));
        });
        group.bench_function(BenchmarkId::new("save_chunks", codec.name()), |bench| {
            bench.iter(|| storage.save_chunks("bench-chunks", black_box(&chunks)).unwrap());
        });
        group.bench_function(BenchmarkId::new("load_chunks", codec.name()), |bench| {
            bench.iter(|| black_box(storage.load_chunks("bench-chunks").unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compression, bench_index_codec, bench_file_storage);
criterion_main!(benches);

//! `grove` command line
//!
//! - `grove index --chunks chunks.json`: embed, build and persist an index
//! - `grove search "question"`: print the retrieved chunks
//! - `grove ask "question"`: retrieve, then generate an answer

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use grove_core::storage::IndexStorage;
use grove_service::ingest::read_chunk_file;
use grove_service::{embedder_from_settings, ingest, service_from_settings, telemetry, Settings};
use grove_service::{json_outcome, RetrievalService, RetrievedChunk};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "grove", version, about = "Question answering over a random-projection forest index")]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv); overrides GROVE_LOG
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed a chunk file, build the forest and save both
    Index {
        /// JSON array of {"text", "source"} records
        #[arg(long)]
        chunks: PathBuf,
        #[arg(long)]
        trees: Option<usize>,
        #[arg(long)]
        leaf_capacity: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the chunks retrieved for a question
    Search {
        question: String,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
    /// Answer a question from the retrieved chunks
    Ask {
        question: String,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
}

#[derive(Args)]
struct RetrievalArgs {
    /// Search LLM paraphrases and merge them in first-seen order
    #[arg(long)]
    multi_query: bool,
    /// Search LLM paraphrases and merge them with reciprocal rank fusion
    #[arg(long)]
    rag_fusion: bool,
    /// Number of chunks to return
    #[arg(short = 'n', long)]
    results: Option<usize>,
    /// Number of paraphrases to request
    #[arg(long)]
    variants: Option<usize>,
    /// Tree nodes visited per search
    #[arg(long)]
    budget: Option<usize>,
    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

impl RetrievalArgs {
    fn apply(&self, settings: &mut Settings) {
        let retrieval = &mut settings.retrieval;
        retrieval.multi_query |= self.multi_query;
        retrieval.rag_fusion |= self.rag_fusion;
        if let Some(results) = self.results {
            retrieval.result_count = results;
        }
        if let Some(variants) = self.variants {
            retrieval.variant_count = variants;
        }
        if let Some(budget) = self.budget {
            retrieval.search_budget = budget;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match cli.command {
        Command::Index {
            chunks,
            trees,
            leaf_capacity,
            seed,
        } => {
            if let Some(trees) = trees {
                settings.index.tree_count = trees;
            }
            if let Some(leaf_capacity) = leaf_capacity {
                settings.index.leaf_capacity = leaf_capacity;
            }
            if seed.is_some() {
                settings.index.seed = seed;
            }
            settings.validate().context("invalid settings")?;
            run_index(&settings, &chunks)
        }
        Command::Search { question, retrieval } => {
            retrieval.apply(&mut settings);
            settings.validate().context("invalid settings")?;
            let service = open_service(&settings)?;
            let outcome = service.retrieve(&question);
            if retrieval.json {
                return print_json(&outcome);
            }
            print_chunks(&outcome.context("retrieval failed")?);
            Ok(())
        }
        Command::Ask { question, retrieval } => {
            retrieval.apply(&mut settings);
            settings.validate().context("invalid settings")?;
            let service = open_service(&settings)?;
            let outcome = service.ask(&question);
            if retrieval.json {
                return print_json(&outcome);
            }
            let answer = outcome.context("answering failed")?;
            println!("{}\n", answer.answer);
            println!("Sources ({}):", answer.strategy.name());
            print_chunks(&answer.chunks);
            Ok(())
        }
    }
}

fn run_index(settings: &Settings, chunk_file: &std::path::Path) -> Result<()> {
    let chunks = read_chunk_file(chunk_file)
        .with_context(|| format!("reading chunks from {}", chunk_file.display()))?;
    let storage = IndexStorage::with_codec(&settings.storage.path, settings.storage.codec)
        .context("opening storage")?;
    let embedder = embedder_from_settings(settings);

    let report = ingest(
        embedder.as_ref(),
        &chunks,
        &settings.index,
        settings.embedding.batch_size,
        &storage,
        &settings.storage.index_name,
        &settings.storage.chunks_name,
    )
    .context("indexing failed")?;

    println!(
        "Indexed {} chunks ({}-d) into {} trees / {} nodes in {} ms",
        report.chunks, report.dimension, report.trees, report.nodes, report.elapsed_ms
    );
    println!(
        "Saved {} ({} bytes) and {} ({} bytes) under {}",
        settings.storage.index_name,
        report.index_bytes,
        settings.storage.chunks_name,
        report.chunk_bytes,
        settings.storage.path.display()
    );
    Ok(())
}

fn open_service(settings: &Settings) -> Result<RetrievalService> {
    let service = service_from_settings(settings).context("starting service")?;
    service
        .load_index(&settings.storage.index_name)
        .with_context(|| format!("loading index {:?}", settings.storage.index_name))?;
    service
        .load_chunks(&settings.storage.chunks_name)
        .with_context(|| format!("loading chunks {:?}", settings.storage.chunks_name))?;
    Ok(service)
}

/// Prints the value or its error report; a failed request exits with status 1
fn print_json<T: Serialize>(outcome: &grove_core::Result<T>) -> Result<()> {
    println!("{}", json_outcome(outcome)?);
    if outcome.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_chunks(chunks: &[RetrievedChunk]) {
    for (rank, chunk) in chunks.iter().enumerate() {
        let source = if chunk.source.is_empty() { "-" } else { chunk.source.as_str() };
        println!("[{}] #{} {:.4} ({source})", rank + 1, chunk.id, chunk.score);
        println!("    {}", chunk.text.trim().replace('\n', "\n    "));
    }
}

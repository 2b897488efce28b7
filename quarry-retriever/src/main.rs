use clap::{Parser, Subcommand};
use quarry_retriever::config::RetrieverConfig;
use quarry_retriever::retrieval::{IndexingEngine, QueryType};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// A CLI tool to index a source workspace and query it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace root containing the .quarry.db database file
    #[arg(short, long, default_value = ".")]
    base_dir: PathBuf,

    /// Configuration file (missing file means defaults)
    #[arg(short, long, default_value = "quarry.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan the workspace and bring the index up to date
    Index,
    /// Run a hybrid query against the index
    Search {
        /// Query text
        query: String,
        /// Query type: code, semantic, keyword, or default
        #[arg(short = 't', long, default_value = "default")]
        query_type: QueryType,
        /// Maximum number of results
        #[arg(short = 'k', long, default_value_t = 10)]
        top_k: usize,
        /// Emit results as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Print index statistics
    Stats,
}

#[derive(Serialize)]
struct JsonResult<'a> {
    path: &'a str,
    start_byte: usize,
    end_byte: usize,
    score: f32,
    vector_score: f32,
    keyword_score: f32,
    content: &'a str,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = RetrieverConfig::load(&args.config)?;
    let engine = IndexingEngine::open(&args.base_dir, config).await?;

    match args.command {
        Commands::Index => {
            let summary = engine.reindex(&args.base_dir).await?;
            println!(
                "scanned {} files: {} changed, {} excluded, {} failed",
                summary.scanned, summary.changed, summary.excluded, summary.failed
            );
        }
        Commands::Search {
            query,
            query_type,
            top_k,
            json,
        } => {
            let results = engine.retrieve(&query, query_type, top_k).await?;
            if json {
                let rows: Vec<JsonResult> = results
                    .iter()
                    .map(|r| JsonResult {
                        path: &r.chunk.relative_path,
                        start_byte: r.chunk.start_byte,
                        end_byte: r.chunk.end_byte,
                        score: r.score,
                        vector_score: r.vector_score,
                        keyword_score: r.keyword_score,
                        content: &r.chunk.content,
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for result in &results {
                    println!(
                        "{:.3} {} [{}..{}]",
                        result.score,
                        result.chunk.relative_path,
                        result.chunk.start_byte,
                        result.chunk.end_byte
                    );
                }
                if results.is_empty() {
                    println!("no results");
                }
            }
        }
        Commands::Stats => {
            let stats = engine.statistics().await?;
            println!("files:              {}", stats.total_files);
            println!("chunks:             {}", stats.total_chunks);
            println!("excluded:           {}", stats.files_excluded);
            println!("skipped unchanged:  {}", stats.files_skipped_unchanged);
            println!(
                "embedding cache:    {} hits / {} misses",
                stats.cache_hits, stats.cache_misses
            );
        }
    }
    Ok(())
}

//! quarry-retriever: workspace indexing and hybrid code retrieval
//!
//! This crate scans a source workspace, splits files into overlapping
//! chunks, embeds them through a remote provider, and answers queries by
//! fusing keyword (TF-IDF) and vector (cosine) relevance under per-query-
//! type weights. The index persists in SQLite and is rebuilt incrementally
//! based on content fingerprints.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: scanning, chunk storage, the in-memory indexes,
//!   and the [`retrieval::IndexingEngine`] orchestrator
//! - **[`config`]**: the TOML configuration surface and its validation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quarry_retriever::config::RetrieverConfig;
//! use quarry_retriever::retrieval::{IndexingEngine, QueryType};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RetrieverConfig::load(Path::new("quarry.toml"))?;
//! let engine = IndexingEngine::open(Path::new("."), config).await?;
//! let summary = engine.reindex(Path::new(".")).await?;
//! println!("indexed {} changed files", summary.changed);
//!
//! let results = engine.retrieve("parse config", QueryType::CodeSearch, 5).await?;
//! for result in results {
//!     println!("{:.3} {}", result.score, result.chunk.relative_path);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod retrieval;

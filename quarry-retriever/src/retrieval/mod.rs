//! Core indexing and retrieval: workspace scanning, change detection,
//! the durable store, the in-memory search structures, and hybrid fusion.

pub mod change;
pub mod engine;
pub mod file_index;
pub mod hybrid;
pub mod ignore_rules;
pub mod keyword_index;
pub mod scanner;
pub mod vector_store;

pub use engine::{IndexStatistics, IndexingEngine, ReindexSummary, SearchResult};
pub use file_index::{ChunkRecord, FileIndex, FileRecord};
pub use hybrid::{QueryType, SearchWeights, WeightProfile};
pub use ignore_rules::IgnoreMatcher;
pub use scanner::WorkspaceScanner;

//! Indexing and retrieval orchestration.
//!
//! [`IndexingEngine`] owns the durable store, the in-memory search
//! structures, and the optional embedding client, and exposes the three
//! operations the rest of the system calls: `reindex`, `retrieve`, and
//! `statistics`.
//!
//! Indexing is a scan-then-process pipeline. The scan is sequential so
//! traversal order stays deterministic; per-file work (read, change
//! detection, chunking, embedding, store writes) runs on a bounded pool of
//! concurrent workers since distinct files touch disjoint records. Each
//! file's chunk set is replaced atomically in both the durable store and
//! the in-memory indexes, so a concurrent query sees either the old or the
//! new chunk set, never a mix.

use super::change::{self, ChangeDecision};
use super::file_index::{ChunkRecord, FileIndex, FileRecord};
use super::hybrid::{self, QueryType, SideHit};
use super::keyword_index::KeywordIndex;
use super::scanner::WorkspaceScanner;
use super::vector_store::VectorStore;
use crate::config::RetrieverConfig;
use anyhow::{Context, Result};
use futures::StreamExt;
use quarry_chunk::chunk_text;
use quarry_embed::{EmbeddingCache, EmbeddingClient};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Counts for one `reindex` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexSummary {
    /// Candidate files the scan yielded.
    pub scanned: usize,
    /// Files whose chunk set was rebuilt.
    pub changed: usize,
    /// Files and directories excluded by ignore rules.
    pub excluded: usize,
    /// Files skipped because they could not be read.
    pub failed: usize,
}

/// Point-in-time view of the index, for the `getStatistics` surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStatistics {
    pub total_files: u64,
    pub total_chunks: u64,
    pub files_excluded: u64,
    pub files_skipped_unchanged: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// One retrieval result: the stored chunk plus its fused and per-side
/// normalized scores.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: ChunkRecord,
    pub score: f32,
    pub vector_score: f32,
    pub keyword_score: f32,
}

enum FileOutcome {
    Unchanged,
    Indexed,
    Failed,
}

pub struct IndexingEngine {
    config: RetrieverConfig,
    store: FileIndex,
    embed: Option<EmbeddingClient>,
    cache: Arc<EmbeddingCache>,
    keyword: Arc<RwLock<KeywordIndex>>,
    vectors: Arc<RwLock<VectorStore>>,
    files_excluded: AtomicU64,
    files_skipped_unchanged: AtomicU64,
}

impl IndexingEngine {
    /// Open the durable store under `base` and rebuild the in-memory
    /// indexes from it. A store that cannot be opened is a fatal error;
    /// the caller should trigger a full rebuild in a fresh location.
    pub async fn open(base: &Path, config: RetrieverConfig) -> Result<Self> {
        config.validate()?;
        let store = FileIndex::open(base).await?;
        let cache = Arc::new(EmbeddingCache::new(config.cache.clone()));
        let embed = match &config.embedding {
            Some(embed_config) => Some(
                EmbeddingClient::remote(embed_config.clone(), Arc::clone(&cache))
                    .context("failed to construct embedding client")?,
            ),
            None => None,
        };
        Self::assemble(store, config, embed, cache).await
    }

    /// Assemble an engine over an existing store and client. Used by tests
    /// to inject an in-memory store and a mock provider.
    pub async fn with_parts(
        store: FileIndex,
        config: RetrieverConfig,
        embed: Option<EmbeddingClient>,
        cache: Arc<EmbeddingCache>,
    ) -> Result<Self> {
        config.validate()?;
        Self::assemble(store, config, embed, cache).await
    }

    async fn assemble(
        store: FileIndex,
        config: RetrieverConfig,
        embed: Option<EmbeddingClient>,
        cache: Arc<EmbeddingCache>,
    ) -> Result<Self> {
        let mut keyword = KeywordIndex::default();
        let mut vectors = VectorStore::new();
        for chunk in store.all_chunks().await? {
            let id = chunk.id.context("stored chunk missing its row id")?;
            keyword.add_chunk(id, &chunk.relative_path, &chunk.content);
            if let Some(vector) = chunk.embedding {
                vectors.upsert(id, &chunk.relative_path, vector);
            }
        }
        debug!(chunks = keyword.len(), "in-memory indexes rebuilt from store");
        Ok(Self {
            config,
            store,
            embed,
            cache,
            keyword: Arc::new(RwLock::new(keyword)),
            vectors: Arc::new(RwLock::new(vectors)),
            files_excluded: AtomicU64::new(0),
            files_skipped_unchanged: AtomicU64::new(0),
        })
    }

    /// Scan `root` and bring the index up to date with it: changed and new
    /// files are re-chunked and re-embedded, vanished files are removed,
    /// unchanged files are skipped.
    pub async fn reindex(&self, root: &Path) -> Result<ReindexSummary> {
        let scanner = WorkspaceScanner::for_root(root);
        let mut iter = scanner.scan();
        let candidates: Vec<_> = iter.by_ref().collect();
        let excluded = iter.excluded();
        let scan_failed = iter.failed();
        self.files_skipped_unchanged.store(0, Ordering::Relaxed);
        self.files_excluded.store(excluded as u64, Ordering::Relaxed);

        let seen: HashSet<String> = candidates
            .iter()
            .map(|c| c.relative_path.clone())
            .collect();

        let outcomes: Vec<FileOutcome> = futures::stream::iter(candidates.iter().map(
            |candidate| self.process_file(root, &candidate.relative_path, candidate.language),
        ))
        .buffer_unordered(self.config.max_workers)
        .collect()
        .await;

        // Files present in the store but gone from the workspace.
        for record in self.store.list_files().await? {
            if !seen.contains(&record.relative_path) {
                self.store.remove_file(&record.relative_path).await?;
                let mut keyword = self.keyword.write().await;
                let mut vectors = self.vectors.write().await;
                keyword.remove_file(&record.relative_path);
                vectors.remove_file(&record.relative_path);
                debug!(path = %record.relative_path, "removed vanished file from index");
            }
        }

        let mut summary = ReindexSummary {
            scanned: candidates.len(),
            excluded,
            failed: scan_failed,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                FileOutcome::Indexed => summary.changed += 1,
                FileOutcome::Failed => summary.failed += 1,
                FileOutcome::Unchanged => {}
            }
        }
        info!(
            scanned = summary.scanned,
            changed = summary.changed,
            excluded = summary.excluded,
            failed = summary.failed,
            "reindex complete"
        );
        Ok(summary)
    }

    async fn process_file(&self, root: &Path, relative_path: &str, language: &str) -> FileOutcome {
        match self.try_process_file(root, relative_path, language).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(path = relative_path, error = %e, "failed to index file");
                FileOutcome::Failed
            }
        }
    }

    async fn try_process_file(
        &self,
        root: &Path,
        relative_path: &str,
        language: &str,
    ) -> Result<FileOutcome> {
        let absolute = root.join(relative_path);
        let metadata = tokio::fs::metadata(&absolute).await?;
        let modified_at = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let size = metadata.len();

        let stored = self.store.get_file(relative_path).await?;
        // The fast path needs no file read at all.
        if let Some(record) = &stored
            && record.size == size
            && record.modified_at == modified_at
        {
            self.files_skipped_unchanged.fetch_add(1, Ordering::Relaxed);
            return Ok(FileOutcome::Unchanged);
        }

        let bytes = tokio::fs::read(&absolute).await?;
        let hash = match change::detect(stored.as_ref(), size, modified_at, &bytes) {
            ChangeDecision::Unchanged => {
                // Content identical, metadata moved: refresh the record so
                // the fast path works next time.
                self.store.touch_file(relative_path, size, modified_at).await?;
                self.files_skipped_unchanged.fetch_add(1, Ordering::Relaxed);
                return Ok(FileOutcome::Unchanged);
            }
            ChangeDecision::Changed { hash } => hash,
        };

        let Ok(content) = String::from_utf8(bytes) else {
            debug!(path = relative_path, "skipping non-utf8 file");
            return Ok(FileOutcome::Unchanged);
        };

        let specs = chunk_text(&content, &self.config.chunking);
        let embeddings: Vec<Option<Vec<f32>>> = match &self.embed {
            Some(client) => {
                let texts: Vec<String> = specs.iter().map(|s| s.text.clone()).collect();
                client.embed_batched(&texts).await.vectors
            }
            None => vec![None; specs.len()],
        };

        let chunks: Vec<ChunkRecord> = specs
            .into_iter()
            .zip(embeddings)
            .map(|(spec, embedding)| ChunkRecord {
                id: None,
                relative_path: relative_path.to_string(),
                file_hash: hash,
                start_byte: spec.start,
                end_byte: spec.end,
                content: spec.text,
                embedding,
            })
            .collect();

        let record = FileRecord {
            relative_path: relative_path.to_string(),
            hash,
            size,
            modified_at,
            language: language.to_string(),
        };
        let stored_chunks = self.store.replace_file(&record, &chunks).await?;

        // Both in-memory sides are swapped under their write locks at once,
        // so queries never see one side updated and the other stale.
        let mut keyword = self.keyword.write().await;
        let mut vectors = self.vectors.write().await;
        keyword.remove_file(relative_path);
        vectors.remove_file(relative_path);
        for chunk in &stored_chunks {
            let id = chunk.id.context("inserted chunk missing its row id")?;
            keyword.add_chunk(id, relative_path, &chunk.content);
            if let Some(vector) = &chunk.embedding {
                vectors.upsert(id, relative_path, vector.clone());
            }
        }
        Ok(FileOutcome::Indexed)
    }

    /// Run a hybrid query. When the embedding provider is unavailable or
    /// the query cannot be embedded, retrieval degrades to keyword-only
    /// rather than failing.
    pub async fn retrieve(
        &self,
        query: &str,
        query_type: QueryType,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let fetch = top_k.saturating_mul(hybrid::OVERFETCH_FACTOR);

        let mut keyword_hits: Vec<SideHit> = {
            let keyword = self.keyword.read().await;
            keyword
                .search(query, fetch)
                .into_iter()
                .map(|h| SideHit {
                    chunk_id: h.chunk_id,
                    score: h.score,
                })
                .collect()
        };

        let mut vector_hits: Vec<SideHit> = Vec::new();
        if let Some(client) = &self.embed {
            match client.embed_query(query).await {
                Ok(query_vector) => {
                    let vectors = self.vectors.read().await;
                    vector_hits = vectors
                        .search(&query_vector, fetch)
                        .into_iter()
                        .map(|h| SideHit {
                            chunk_id: h.chunk_id,
                            score: h.score,
                        })
                        .collect();
                }
                Err(e) => {
                    warn!(error = %e, "query embedding failed, using keyword results only");
                }
            }
        }

        hybrid::normalize_scores(&mut vector_hits);
        hybrid::normalize_scores(&mut keyword_hits);
        let profile = self.config.search_weights.profile(query_type);
        let fused = hybrid::fuse(&vector_hits, &keyword_hits, profile, top_k);

        let mut results = Vec::with_capacity(fused.len());
        for hit in fused {
            let Some(chunk) = self.store.get_chunk(hit.chunk_id).await? else {
                continue;
            };
            results.push(SearchResult {
                chunk,
                score: hit.score,
                vector_score: hit.vector_score,
                keyword_score: hit.keyword_score,
            });
        }
        Ok(results)
    }

    pub async fn statistics(&self) -> Result<IndexStatistics> {
        let cache_stats = self.cache.stats();
        Ok(IndexStatistics {
            total_files: self.store.count_files().await?,
            total_chunks: self.store.count_chunks().await?,
            files_excluded: self.files_excluded.load(Ordering::Relaxed),
            files_skipped_unchanged: self.files_skipped_unchanged.load(Ordering::Relaxed),
            cache_hits: cache_stats.hits,
            cache_misses: cache_stats.misses,
        })
    }
}

//! In-memory brute-force vector store.
//!
//! Holds one embedding per chunk and answers nearest-neighbor queries by
//! scanning every vector with cosine similarity. Insertion order is
//! preserved and used as the tie-break, so re-running the same query over
//! the same store always returns the same ranking. Brute force is fine at
//! this scale; an ANN structure would be a drop-in replacement behind the
//! same methods.

use std::collections::HashMap;

/// Nearest-neighbor hit with its raw cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk_id: i64,
    pub score: f32,
}

#[derive(Debug)]
struct StoredVector {
    chunk_id: i64,
    vector: Vec<f32>,
    norm: f32,
}

/// Chunk embeddings, scanned linearly on search. Not internally
/// synchronized; callers wrap it in a lock alongside the keyword index.
#[derive(Debug, Default)]
pub struct VectorStore {
    /// Insertion order; the search tie-break.
    vectors: Vec<StoredVector>,
    /// chunk id -> position in `vectors`.
    by_id: HashMap<i64, usize>,
    /// File path -> chunk ids, for whole-file removal.
    file_chunks: HashMap<String, Vec<i64>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Insert or replace the vector for `chunk_id`. A replaced chunk keeps
    /// its original insertion position.
    pub fn upsert(&mut self, chunk_id: i64, relative_path: &str, vector: Vec<f32>) {
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        let stored = StoredVector {
            chunk_id,
            vector,
            norm,
        };
        match self.by_id.get(&chunk_id) {
            Some(&pos) => self.vectors[pos] = stored,
            None => {
                self.by_id.insert(chunk_id, self.vectors.len());
                self.vectors.push(stored);
                self.file_chunks
                    .entry(relative_path.to_string())
                    .or_default()
                    .push(chunk_id);
            }
        }
    }

    /// Drop every vector belonging to `relative_path`.
    pub fn remove_file(&mut self, relative_path: &str) {
        let Some(chunk_ids) = self.file_chunks.remove(relative_path) else {
            return;
        };
        let removed: std::collections::HashSet<i64> = chunk_ids.into_iter().collect();
        self.vectors.retain(|v| !removed.contains(&v.chunk_id));
        self.by_id.clear();
        for (pos, stored) in self.vectors.iter().enumerate() {
            self.by_id.insert(stored.chunk_id, pos);
        }
    }

    /// The `limit` most similar chunks to `query`, best first. Equal scores
    /// keep insertion order.
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<VectorHit> {
        if limit == 0 {
            return Vec::new();
        }
        let query_norm = query.iter().map(|v| v * v).sum::<f32>().sqrt();
        if query_norm == 0.0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, VectorHit)> = self
            .vectors
            .iter()
            .enumerate()
            .filter_map(|(pos, stored)| {
                if stored.norm == 0.0 || stored.vector.len() != query.len() {
                    return None;
                }
                let dot: f32 = stored
                    .vector
                    .iter()
                    .zip(query)
                    .map(|(a, b)| a * b)
                    .sum();
                Some((
                    pos,
                    VectorHit {
                        chunk_id: stored.chunk_id,
                        score: dot / (stored.norm * query_norm),
                    },
                ))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(limit);
        scored.into_iter().map(|(_, hit)| hit).collect()
    }
}

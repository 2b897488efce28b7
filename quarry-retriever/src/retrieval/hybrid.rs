//! Hybrid score fusion between keyword and vector retrieval.
//!
//! Each side over-fetches, raw scores are min-max normalized into [0, 1]
//! within each result list, and the fused score is a weighted sum with
//! weights chosen by query type. Chunks found by only one side contribute
//! zero from the missing side rather than being dropped, so a strong
//! keyword-only match can still beat a mediocre hit found by both.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Each retrieval side fetches this many times the requested result count
/// before fusion, so a chunk ranked just outside top-k on one side can
/// still win on the combined score.
pub const OVERFETCH_FACTOR: usize = 4;

/// Caller-declared intent of a search query; selects the weight profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Identifier-heavy lookups: function names, error strings.
    CodeSearch,
    /// Conceptual questions about behavior.
    SemanticSearch,
    /// Exact-term matching only.
    KeywordSearch,
    #[default]
    Default,
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" | "code_search" => Ok(Self::CodeSearch),
            "semantic" | "semantic_search" => Ok(Self::SemanticSearch),
            "keyword" | "keyword_search" => Ok(Self::KeywordSearch),
            "default" => Ok(Self::Default),
            other => Err(format!("unknown query type: {other}")),
        }
    }
}

/// Weight split for one query type. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightProfile {
    pub vector: f32,
    pub keyword: f32,
}

impl WeightProfile {
    pub const fn new(vector: f32, keyword: f32) -> Self {
        Self { vector, keyword }
    }
}

/// Per-query-type weight table, validated at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SearchWeights {
    pub code_search: WeightProfile,
    pub semantic_search: WeightProfile,
    pub keyword_search: WeightProfile,
    pub default: WeightProfile,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            code_search: WeightProfile::new(0.4, 0.6),
            semantic_search: WeightProfile::new(0.8, 0.2),
            keyword_search: WeightProfile::new(0.2, 0.8),
            default: WeightProfile::new(0.6, 0.4),
        }
    }
}

impl SearchWeights {
    pub fn profile(&self, query_type: QueryType) -> WeightProfile {
        match query_type {
            QueryType::CodeSearch => self.code_search,
            QueryType::SemanticSearch => self.semantic_search,
            QueryType::KeywordSearch => self.keyword_search,
            QueryType::Default => self.default,
        }
    }

    /// Every profile must have non-negative weights summing to 1 (within
    /// float tolerance). Invalid weights are a configuration error, not
    /// something to silently renormalize.
    pub fn validate(&self) -> Result<(), String> {
        for (name, profile) in [
            ("code_search", self.code_search),
            ("semantic_search", self.semantic_search),
            ("keyword_search", self.keyword_search),
            ("default", self.default),
        ] {
            if profile.vector < 0.0 || profile.keyword < 0.0 {
                return Err(format!("search weight '{name}' has a negative component"));
            }
            let sum = profile.vector + profile.keyword;
            if (sum - 1.0).abs() > 1e-6 {
                return Err(format!(
                    "search weight '{name}' must sum to 1.0, got {sum}"
                ));
            }
        }
        Ok(())
    }
}

/// A scored result from one retrieval side, identified by chunk id and
/// carrying its rank (0 = best) within that side's list.
#[derive(Debug, Clone, Copy)]
pub struct SideHit {
    pub chunk_id: i64,
    pub score: f32,
}

/// A fused result, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub chunk_id: i64,
    pub score: f32,
    pub vector_score: f32,
    pub keyword_score: f32,
}

/// Min-max normalize scores in place to [0, 1] within the list. A list
/// whose scores are all equal (including a singleton) maps to all 1.0,
/// since its best hit is still the best that side found.
pub fn normalize_scores(hits: &mut [SideHit]) {
    let Some(first) = hits.first() else { return };
    let mut min = first.score;
    let mut max = first.score;
    for hit in hits.iter() {
        min = min.min(hit.score);
        max = max.max(hit.score);
    }
    let range = max - min;
    for hit in hits.iter_mut() {
        hit.score = if range > 0.0 {
            (hit.score - min) / range
        } else {
            1.0
        };
    }
}

/// Fuse two already-normalized result lists into a single ranking.
///
/// Fused score is `weights.vector * vector_score + weights.keyword *
/// keyword_score`, with 0 for a side that did not return the chunk. Ties
/// break by better vector rank, then better keyword rank, then ascending
/// chunk id.
pub fn fuse(
    vector_hits: &[SideHit],
    keyword_hits: &[SideHit],
    weights: WeightProfile,
    limit: usize,
) -> Vec<FusedHit> {
    let vector_rank: HashMap<i64, usize> = vector_hits
        .iter()
        .enumerate()
        .map(|(rank, hit)| (hit.chunk_id, rank))
        .collect();
    let keyword_rank: HashMap<i64, usize> = keyword_hits
        .iter()
        .enumerate()
        .map(|(rank, hit)| (hit.chunk_id, rank))
        .collect();

    let mut combined: HashMap<i64, (f32, f32)> = HashMap::new();
    for hit in vector_hits {
        combined.entry(hit.chunk_id).or_insert((0.0, 0.0)).0 = hit.score;
    }
    for hit in keyword_hits {
        combined.entry(hit.chunk_id).or_insert((0.0, 0.0)).1 = hit.score;
    }

    let mut fused: Vec<FusedHit> = combined
        .into_iter()
        .map(|(chunk_id, (vector_score, keyword_score))| FusedHit {
            chunk_id,
            score: weights.vector * vector_score + weights.keyword * keyword_score,
            vector_score,
            keyword_score,
        })
        .collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ar = vector_rank.get(&a.chunk_id).copied().unwrap_or(usize::MAX);
                let br = vector_rank.get(&b.chunk_id).copied().unwrap_or(usize::MAX);
                ar.cmp(&br)
            })
            .then_with(|| {
                let ar = keyword_rank.get(&a.chunk_id).copied().unwrap_or(usize::MAX);
                let br = keyword_rank.get(&b.chunk_id).copied().unwrap_or(usize::MAX);
                ar.cmp(&br)
            })
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    fused.truncate(limit);
    fused
}

//! In-memory TF-IDF keyword index over chunk text.
//!
//! Terms are lowercase identifier-ish tokens (`[A-Za-z0-9_]+`) plus their
//! adjacent bigrams, so "parse config" scores chunks containing the exact
//! phrase above chunks containing the words separately. Document-frequency
//! cutoffs drop terms too rare or too common to discriminate. Scoring is
//! cosine similarity between TF-IDF vectors; ties fall back to ascending
//! chunk id so result order is stable.
//!
//! The index is rebuilt from the durable store at startup and updated
//! incrementally as files change.

use std::collections::{BTreeSet, HashMap};

/// Lowercase word and bigram terms of `text`, in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    let mut terms = Vec::with_capacity(words.len() * 2);
    for pair in words.windows(2) {
        terms.push(format!("{} {}", pair[0], pair[1]));
    }
    terms.extend(words);
    terms
}

/// Search hit with its raw (unnormalized) relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub chunk_id: i64,
    pub score: f32,
}

#[derive(Debug, Default)]
struct DocumentEntry {
    /// Term -> occurrence count within this chunk.
    term_counts: HashMap<String, u32>,
    total_terms: u32,
}

/// TF-IDF keyword index. Not internally synchronized; callers wrap it in a
/// lock alongside the vector store so both are swapped together.
#[derive(Debug)]
pub struct KeywordIndex {
    /// Drop terms appearing in fewer than this many chunks.
    min_doc_freq: usize,
    /// Drop terms appearing in more than this fraction of chunks.
    max_doc_ratio: f32,
    /// Term -> chunk ids containing it.
    postings: HashMap<String, BTreeSet<i64>>,
    documents: HashMap<i64, DocumentEntry>,
    /// File path -> chunk ids, for whole-file removal.
    file_chunks: HashMap<String, Vec<i64>>,
}

impl Default for KeywordIndex {
    fn default() -> Self {
        Self::new(1, 0.9)
    }
}

impl KeywordIndex {
    pub fn new(min_doc_freq: usize, max_doc_ratio: f32) -> Self {
        Self {
            min_doc_freq,
            max_doc_ratio,
            postings: HashMap::new(),
            documents: HashMap::new(),
            file_chunks: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Add one chunk's text under `chunk_id`, associated with its file.
    pub fn add_chunk(&mut self, chunk_id: i64, relative_path: &str, text: &str) {
        let mut entry = DocumentEntry::default();
        for term in tokenize(text) {
            *entry.term_counts.entry(term.clone()).or_insert(0) += 1;
            entry.total_terms += 1;
            self.postings.entry(term).or_default().insert(chunk_id);
        }
        self.documents.insert(chunk_id, entry);
        self.file_chunks
            .entry(relative_path.to_string())
            .or_default()
            .push(chunk_id);
    }

    /// Drop every chunk belonging to `relative_path`.
    pub fn remove_file(&mut self, relative_path: &str) {
        let Some(chunk_ids) = self.file_chunks.remove(relative_path) else {
            return;
        };
        for chunk_id in chunk_ids {
            if let Some(entry) = self.documents.remove(&chunk_id) {
                for term in entry.term_counts.keys() {
                    if let Some(ids) = self.postings.get_mut(term) {
                        ids.remove(&chunk_id);
                        if ids.is_empty() {
                            self.postings.remove(term);
                        }
                    }
                }
            }
        }
    }

    /// The ratio cutoff is meaningless on a handful of documents (any
    /// shared term would hit 100%), so it only applies above this size.
    const MIN_CORPUS_FOR_RATIO: usize = 5;

    fn idf(&self, term: &str) -> Option<f32> {
        let doc_freq = self.postings.get(term)?.len();
        let total = self.documents.len();
        if doc_freq < self.min_doc_freq {
            return None;
        }
        if total >= Self::MIN_CORPUS_FOR_RATIO
            && doc_freq as f32 / total as f32 > self.max_doc_ratio
        {
            return None;
        }
        // Smoothed IDF stays positive even for terms in every document.
        Some(((1.0 + total as f32) / (1.0 + doc_freq as f32)).ln() + 1.0)
    }

    /// Cosine similarity between the query's TF-IDF vector and each
    /// candidate chunk, best first. Ties break toward the lower chunk id.
    pub fn search(&self, query: &str, limit: usize) -> Vec<KeywordHit> {
        if limit == 0 || self.documents.is_empty() {
            return Vec::new();
        }

        let mut query_counts: HashMap<String, u32> = HashMap::new();
        for term in tokenize(query) {
            *query_counts.entry(term).or_insert(0) += 1;
        }
        let query_total: u32 = query_counts.values().sum();
        if query_total == 0 {
            return Vec::new();
        }

        let mut query_weights: HashMap<&str, f32> = HashMap::new();
        let mut query_norm_sq = 0.0f32;
        for (term, count) in &query_counts {
            let Some(idf) = self.idf(term) else { continue };
            let weight = (*count as f32 / query_total as f32) * idf;
            query_norm_sq += weight * weight;
            query_weights.insert(term.as_str(), weight);
        }
        if query_weights.is_empty() {
            return Vec::new();
        }
        let query_norm = query_norm_sq.sqrt();

        // Dot products accumulate only over candidate chunks, found through
        // the postings lists of query terms.
        let mut dots: HashMap<i64, f32> = HashMap::new();
        for (term, query_weight) in &query_weights {
            let idf = self.idf(term).unwrap_or(0.0);
            if let Some(chunk_ids) = self.postings.get(*term) {
                for &chunk_id in chunk_ids {
                    let entry = &self.documents[&chunk_id];
                    let tf = entry.term_counts[*term] as f32 / entry.total_terms.max(1) as f32;
                    *dots.entry(chunk_id).or_insert(0.0) += query_weight * tf * idf;
                }
            }
        }

        let mut hits: Vec<KeywordHit> = dots
            .into_iter()
            .filter_map(|(chunk_id, dot)| {
                let doc_norm = self.document_norm(chunk_id);
                if doc_norm == 0.0 || query_norm == 0.0 {
                    return None;
                }
                Some(KeywordHit {
                    chunk_id,
                    score: dot / (query_norm * doc_norm),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        hits.truncate(limit);
        hits
    }

    fn document_norm(&self, chunk_id: i64) -> f32 {
        let entry = &self.documents[&chunk_id];
        let mut norm_sq = 0.0f32;
        for (term, count) in &entry.term_counts {
            let Some(idf) = self.idf(term) else { continue };
            let tf = *count as f32 / entry.total_terms.max(1) as f32;
            norm_sq += (tf * idf) * (tf * idf);
        }
        norm_sq.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_lowercases_and_splits_on_non_word() {
        let terms = tokenize("parse_config(&Path) -> Result");
        assert!(terms.contains(&"parse_config".to_string()));
        assert!(terms.contains(&"path".to_string()));
        assert!(terms.contains(&"result".to_string()));
        assert!(terms.contains(&"parse_config path".to_string()));
    }

    #[test]
    fn exact_phrase_outscores_scattered_words() {
        let mut index = KeywordIndex::default();
        index.add_chunk(1, "a.rs", "load config from disk and parse config values");
        index.add_chunk(2, "b.rs", "parse the tree then write config to the cache layer");
        // Padding so df cutoffs have something to work against.
        index.add_chunk(3, "c.rs", "unrelated networking code");

        let hits = index.search("parse config", 10);
        assert_eq!(hits[0].chunk_id, 1);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn rare_terms_below_min_doc_freq_are_dropped() {
        let mut index = KeywordIndex::new(2, 0.9);
        index.add_chunk(1, "a.rs", "singleton zebra");
        index.add_chunk(2, "b.rs", "shared token here");
        index.add_chunk(3, "c.rs", "shared token there");

        // "zebra" appears in one chunk, below the cutoff of two.
        assert!(index.search("zebra", 10).is_empty());
        assert!(!index.search("shared token", 10).is_empty());
    }

    #[test]
    fn ubiquitous_terms_above_max_ratio_are_dropped() {
        let mut index = KeywordIndex::new(1, 0.5);
        index.add_chunk(1, "a.rs", "common alpha");
        index.add_chunk(2, "b.rs", "common beta");
        index.add_chunk(3, "c.rs", "common gamma");
        index.add_chunk(4, "d.rs", "common delta");
        index.add_chunk(5, "e.rs", "common epsilon");

        // "common" is in every chunk, over the 50% ratio.
        assert!(index.search("common", 10).is_empty());
        let hits = index.search("beta", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, 2);
    }

    #[test]
    fn ratio_cutoff_is_inert_on_tiny_corpora() {
        let mut index = KeywordIndex::new(1, 0.5);
        index.add_chunk(1, "x.py", "def add(a,b): return a+b");
        index.add_chunk(2, "y.py", "def add(a,b): return a+b");

        // Every term is in 100% of two documents; with so few documents
        // that must not empty the vocabulary.
        let hits = index.search("def add", 10);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn removing_a_file_drops_its_chunks() {
        let mut index = KeywordIndex::default();
        index.add_chunk(1, "a.rs", "needle in this chunk");
        index.add_chunk(2, "a.rs", "needle again");
        index.add_chunk(3, "b.rs", "needle survives");

        index.remove_file("a.rs");
        let hits = index.search("needle", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, 3);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn ties_break_toward_lower_chunk_id() {
        let mut index = KeywordIndex::default();
        index.add_chunk(7, "a.rs", "identical text");
        index.add_chunk(3, "b.rs", "identical text");
        index.add_chunk(9, "c.rs", "other words entirely");

        let hits = index.search("identical text", 10);
        assert_eq!(hits[0].chunk_id, 3);
        assert_eq!(hits[1].chunk_id, 7);
        assert!((hits[0].score - hits[1].score).abs() < 1e-6);
    }

    #[test]
    fn empty_query_yields_nothing() {
        let mut index = KeywordIndex::default();
        index.add_chunk(1, "a.rs", "some text");
        assert!(index.search("", 10).is_empty());
        assert!(index.search("...!!!", 10).is_empty());
    }
}

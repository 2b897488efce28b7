//! Hash-keyed embedding cache shared across files and reindex cycles.
//!
//! The cache is process-wide state with an explicit lifecycle: the indexer
//! constructs one at startup, shares it behind an `Arc`, and test harnesses
//! build an isolated instance per test. Entries are keyed by a blake3
//! fingerprint of the chunk text, so two files containing byte-identical
//! chunk text share one entry and one provider call.
//!
//! Eviction is TTL-then-LRU: expired entries are dropped on lookup, and
//! inserts that push the cache past `max_entries` evict the least recently
//! used entries. A race between two workers embedding the same text is
//! resolved by insert-if-absent — either result is accepted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Fingerprint of a chunk's text, used as the cache key.
pub fn text_fingerprint(text: &str) -> [u8; 32] {
    *blake3::hash(text.as_bytes()).as_bytes()
}

fn default_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_max_entries() -> usize {
    100_000
}

/// Eviction parameters for the embedding cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheConfig {
    /// Entries older than this are dropped on lookup.
    pub ttl_secs: u64,
    /// LRU eviction kicks in above this entry count.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Hit/miss counters, reported through the engine's statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

struct CacheEntry {
    vector: Vec<f32>,
    inserted_at: Instant,
    last_access: Instant,
}

struct CacheInner {
    entries: HashMap<[u8; 32], CacheEntry>,
    stats: CacheStats,
}

/// Concurrency-safe vector cache keyed by text fingerprint.
pub struct EmbeddingCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("EmbeddingCache")
            .field("entries", &inner.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

impl EmbeddingCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Look up a vector by text fingerprint, counting a hit or miss.
    pub fn get(&self, key: &[u8; 32]) -> Option<Vec<f32>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        let expired = match inner.entries.get(key) {
            Some(entry) => now.duration_since(entry.inserted_at) >= self.config.ttl(),
            None => false,
        };
        if expired {
            inner.entries.remove(key);
        }
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = now;
                let vector = entry.vector.clone();
                inner.stats.hits += 1;
                Some(vector)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a vector unless the key is already present, then evict LRU
    /// entries down to the configured maximum.
    pub fn insert_if_absent(&self, key: [u8; 32], vector: Vec<f32>) {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        inner.entries.entry(key).or_insert(CacheEntry {
            vector,
            inserted_at: now,
            last_access: now,
        });

        while inner.entries.len() > self.config.max_entries {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| *key);
            match oldest {
                Some(key) => {
                    inner.entries.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_entries: usize, ttl_secs: u64) -> EmbeddingCache {
        EmbeddingCache::new(CacheConfig {
            ttl_secs,
            max_entries,
        })
    }

    #[test]
    fn miss_then_hit() {
        let cache = cache(10, 3600);
        let key = text_fingerprint("def add(a,b): return a+b");
        assert!(cache.get(&key).is_none());
        cache.insert_if_absent(key, vec![1.0, 2.0]);
        assert_eq!(cache.get(&key), Some(vec![1.0, 2.0]));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn insert_if_absent_keeps_first_value() {
        let cache = cache(10, 3600);
        let key = text_fingerprint("x");
        cache.insert_if_absent(key, vec![1.0]);
        cache.insert_if_absent(key, vec![2.0]);
        assert_eq!(cache.get(&key), Some(vec![1.0]));
    }

    #[test]
    fn identical_text_shares_one_entry() {
        let cache = cache(10, 3600);
        let a = text_fingerprint("shared chunk text");
        let b = text_fingerprint("shared chunk text");
        assert_eq!(a, b);
        cache.insert_if_absent(a, vec![0.5]);
        cache.insert_if_absent(b, vec![0.5]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn lru_eviction_respects_access_order() {
        let cache = cache(2, 3600);
        let k1 = text_fingerprint("one");
        let k2 = text_fingerprint("two");
        let k3 = text_fingerprint("three");
        cache.insert_if_absent(k1, vec![1.0]);
        cache.insert_if_absent(k2, vec![2.0]);
        // Touch k1 so k2 becomes least recently used.
        assert!(cache.get(&k1).is_some());
        cache.insert_if_absent(k3, vec![3.0]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&k2).is_none());
        assert!(cache.get(&k1).is_some());
        assert!(cache.get(&k3).is_some());
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = cache(10, 0);
        let key = text_fingerprint("ephemeral");
        cache.insert_if_absent(key, vec![1.0]);
        assert!(cache.get(&key).is_none());
    }
}

//! Deterministic windowed chunking of source text.
//!
//! This crate turns a file's content into bounded, possibly overlapping
//! chunks suitable for embedding and keyword indexing. Chunking is purely a
//! function of the input text and the [`ChunkConfig`]: identical content
//! always yields byte-identical chunk boundaries, which is what makes
//! content-hash-based incremental indexing sound.
//!
//! Windows are measured in characters but [`ChunkSpec`] records byte offsets
//! (always on char boundaries) so callers can slice the original content
//! without re-walking it.
//!
//! # Example
//!
//! ```
//! use quarry_chunk::{ChunkConfig, chunk_text};
//!
//! let config = ChunkConfig::default();
//! let chunks = chunk_text("fn main() { println!(\"hello\"); }", &config);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].start, 0);
//! ```

use serde::{Deserialize, Serialize};

/// Configuration for windowed chunking.
///
/// All sizes are in characters. Validation is strict: invalid parameters
/// reject initialization rather than being silently clamped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ChunkConfig {
    /// Maximum size of each chunk in characters.
    pub chunk_size: usize,
    /// Number of characters shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// A trailing chunk shorter than this is merged into the previous chunk.
    pub min_chunk_size: usize,
    /// Hard cap on chunks per file; the remainder of the file is not indexed.
    pub max_chunks_per_file: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_overlap: 200,
            min_chunk_size: 50,
            max_chunks_per_file: 256,
        }
    }
}

/// Errors raised by [`ChunkConfig::validate`].
#[derive(Debug, thiserror::Error)]
pub enum ChunkConfigError {
    #[error("chunk_size must be positive")]
    ZeroChunkSize,

    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },

    #[error("min_chunk_size ({min}) must not exceed chunk_size ({size})")]
    MinExceedsSize { min: usize, size: usize },

    #[error("max_chunks_per_file must be positive")]
    ZeroMaxChunks,
}

impl ChunkConfig {
    /// Validate the configuration, rejecting degenerate window parameters.
    pub fn validate(&self) -> Result<(), ChunkConfigError> {
        if self.chunk_size == 0 {
            return Err(ChunkConfigError::ZeroChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkConfigError::OverlapTooLarge {
                overlap: self.chunk_overlap,
                size: self.chunk_size,
            });
        }
        if self.min_chunk_size > self.chunk_size {
            return Err(ChunkConfigError::MinExceedsSize {
                min: self.min_chunk_size,
                size: self.chunk_size,
            });
        }
        if self.max_chunks_per_file == 0 {
            return Err(ChunkConfigError::ZeroMaxChunks);
        }
        Ok(())
    }
}

/// One chunk of a file's content.
///
/// `start` and `end` are byte offsets into the original content, always on
/// char boundaries, with `text == content[start..end]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSpec {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Split `content` into windows of at most `chunk_size` characters with
/// `chunk_overlap` characters shared between consecutive windows.
///
/// A trailing window shorter than `min_chunk_size` is merged into the
/// previous chunk instead of being emitted as a tiny fragment. Once
/// `max_chunks_per_file` chunks have been produced the remainder of the
/// file is dropped with a warning.
///
/// The caller is expected to have run [`ChunkConfig::validate`] first; the
/// defaults are always valid.
pub fn chunk_text(content: &str, config: &ChunkConfig) -> Vec<ChunkSpec> {
    if content.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end-of-content sentinel.
    let mut boundaries: Vec<usize> = content.char_indices().map(|(i, _)| i).collect();
    boundaries.push(content.len());
    let char_count = boundaries.len() - 1;

    if char_count <= config.chunk_size {
        return vec![ChunkSpec {
            start: 0,
            end: content.len(),
            text: content.to_string(),
        }];
    }

    let step = config.chunk_size - config.chunk_overlap;
    let mut chunks: Vec<ChunkSpec> = Vec::new();
    let mut start_char = 0usize;

    loop {
        let remaining = char_count - start_char;

        // Merge a tiny trailing fragment into the previous chunk.
        if !chunks.is_empty() && remaining < config.min_chunk_size {
            let last = chunks.last_mut().expect("chunks is non-empty");
            last.end = content.len();
            last.text = content[last.start..].to_string();
            break;
        }

        if chunks.len() == config.max_chunks_per_file {
            tracing::warn!(
                chars_remaining = remaining,
                max_chunks = config.max_chunks_per_file,
                "chunk cap reached, remainder of file not indexed"
            );
            break;
        }

        let end_char = (start_char + config.chunk_size).min(char_count);
        let start = boundaries[start_char];
        let end = boundaries[end_char];
        chunks.push(ChunkSpec {
            start,
            end,
            text: content[start..end].to_string(),
        });

        if end_char == char_count {
            break;
        }
        start_char += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(size: usize, overlap: usize, min: usize, max: usize) -> ChunkConfig {
        ChunkConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            min_chunk_size: min,
            max_chunks_per_file: max,
        }
    }

    #[test]
    fn empty_content_yields_no_chunks() {
        assert!(chunk_text("", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn short_content_is_one_chunk() {
        let content = "def add(a,b): return a+b";
        let chunks = chunk_text(content, &ChunkConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, content);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, content.len());
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let content = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk_text(content, &config(10, 4, 1, 100));
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let head = &pair[0];
            let next = &pair[1];
            assert_eq!(next.start, head.start + 6); // step = size - overlap
            assert_eq!(&head.text[head.text.len() - 4..], &next.text[..4]);
        }
    }

    #[test]
    fn trailing_fragment_merges_into_previous_chunk() {
        // 26 chars, size 10, overlap 0: windows at 0, 10, 20; the last window
        // has 6 chars, below min 8, so it folds into the second chunk.
        let content = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunk_text(content, &config(10, 0, 8, 100));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "abcdefghij");
        assert_eq!(chunks[1].text, "klmnopqrstuvwxyz");
        assert_eq!(chunks[1].end, content.len());
    }

    #[test]
    fn chunk_cap_drops_remainder() {
        let content = "a".repeat(100);
        let chunks = chunk_text(&content, &config(10, 0, 1, 3));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.last().unwrap().end, 30);
    }

    #[test]
    fn chunking_is_deterministic() {
        let content = "fn main() {\n    println!(\"hello world\");\n}\n".repeat(50);
        let cfg = config(120, 20, 30, 1000);
        let a = chunk_text(&content, &cfg);
        let b = chunk_text(&content, &cfg);
        assert_eq!(a, b);
        for chunk in &a {
            assert_eq!(chunk.text, &content[chunk.start..chunk.end]);
        }
    }

    #[test]
    fn multibyte_content_stays_on_char_boundaries() {
        let content = "héllo wörld ".repeat(20);
        let chunks = chunk_text(&content, &config(30, 5, 5, 100));
        for chunk in &chunks {
            assert!(content.is_char_boundary(chunk.start));
            assert!(content.is_char_boundary(chunk.end));
            assert_eq!(chunk.text, &content[chunk.start..chunk.end]);
        }
    }

    #[test]
    fn validation_rejects_bad_parameters() {
        assert!(config(0, 0, 0, 1).validate().is_err());
        assert!(config(10, 10, 1, 1).validate().is_err());
        assert!(config(10, 2, 11, 1).validate().is_err());
        assert!(config(10, 2, 1, 0).validate().is_err());
        assert!(ChunkConfig::default().validate().is_ok());
    }
}

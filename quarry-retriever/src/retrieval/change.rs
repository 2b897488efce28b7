//! Content-hash change detection.
//!
//! The blake3 fingerprint is the ground truth for "has this file changed".
//! A size + mtime fast path may skip hashing, but only when both match the
//! stored record exactly; it never overrides a hash comparison, so a
//! changed file can never be mistaken for unchanged.

use super::file_index::FileRecord;

/// Fingerprint file or chunk content.
pub fn fingerprint(content: &[u8]) -> [u8; 32] {
    *blake3::hash(content).as_bytes()
}

/// Outcome of comparing a file on disk against its stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDecision {
    /// Content matches the stored record; no re-indexing needed.
    Unchanged,
    /// New or modified content; carries the freshly computed fingerprint.
    Changed { hash: [u8; 32] },
}

/// Decide whether a file needs re-indexing.
///
/// `size` and `modified_at` come from filesystem metadata; `content` is the
/// file's current bytes. With no stored record the file is always Changed.
pub fn detect(
    stored: Option<&FileRecord>,
    size: u64,
    modified_at: i64,
    content: &[u8],
) -> ChangeDecision {
    let Some(record) = stored else {
        return ChangeDecision::Changed {
            hash: fingerprint(content),
        };
    };

    // Fast path: metadata identical to what we saw last time.
    if record.size == size && record.modified_at == modified_at {
        return ChangeDecision::Unchanged;
    }

    let hash = fingerprint(content);
    if hash == record.hash {
        ChangeDecision::Unchanged
    } else {
        ChangeDecision::Changed { hash }
    }
}

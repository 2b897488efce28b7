//! Gitignore-style pattern matching for workspace scanning.
//!
//! Supports the common subset of the format: `*`, `**`, `?` wildcards,
//! `!` negation, trailing `/` for directory-only patterns, `#` comments,
//! and root anchoring for patterns containing a slash. Later lines take
//! precedence over earlier ones, so a negation declared after a match
//! re-includes the path. Patterns that fail to compile are dropped with a
//! warning rather than aborting the scan.
//!
//! Matching is pure once compiled: the same `(path, is_dir)` pair always
//! produces the same answer.

use globset::{Glob, GlobBuilder, GlobMatcher};
use std::path::Path;
use tracing::warn;

#[derive(Debug)]
struct CompiledPattern {
    matcher: GlobMatcher,
    negated: bool,
    dir_only: bool,
}

/// Compiled ignore patterns answering "is this relative path excluded".
#[derive(Debug, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<CompiledPattern>,
}

impl IgnoreMatcher {
    /// Compile pattern lines in order. Blank lines and `#` comments are
    /// skipped; a line that cannot be compiled is dropped with a warning.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut patterns = Vec::new();
        for (line_no, raw) in lines.into_iter().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (negated, line) = match line.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            let (dir_only, line) = match line.strip_suffix('/') {
                Some(rest) => (true, rest),
                None => (false, line),
            };
            if line.is_empty() {
                warn!(line = line_no + 1, "skipping empty ignore pattern");
                continue;
            }

            // A slash anywhere in the body anchors the pattern to the root;
            // otherwise it matches at any depth.
            let anchored = line.contains('/');
            let body = line.trim_start_matches('/');
            let glob_text = if anchored {
                body.to_string()
            } else {
                format!("**/{body}")
            };

            match compile_glob(&glob_text) {
                Ok(matcher) => patterns.push(CompiledPattern {
                    matcher,
                    negated,
                    dir_only,
                }),
                Err(e) => {
                    warn!(line = line_no + 1, pattern = raw, error = %e, "dropping malformed ignore pattern");
                }
            }
        }
        Self { patterns }
    }

    /// Load patterns from an ignore file; a missing file is an empty set.
    pub fn from_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_lines(content.lines()),
            Err(_) => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether `relative_path` (with `/` separators) is excluded.
    ///
    /// A path is excluded if it matches directly or if any ancestor
    /// directory is excluded — once a directory is out, everything beneath
    /// it is out.
    pub fn is_ignored(&self, relative_path: &str, is_dir: bool) -> bool {
        let path = relative_path.trim_matches('/');
        if path.is_empty() {
            return false;
        }
        for (idx, _) in path.match_indices('/') {
            if self.matches(&path[..idx], true) {
                return true;
            }
        }
        self.matches(path, is_dir)
    }

    /// Evaluate patterns in declaration order; the last matching pattern
    /// decides, so later negations win.
    fn matches(&self, path: &str, is_dir: bool) -> bool {
        let candidate = Path::new(path);
        let mut ignored = false;
        for pattern in &self.patterns {
            if pattern.dir_only && !is_dir {
                continue;
            }
            if pattern.matcher.is_match(candidate) {
                ignored = !pattern.negated;
            }
        }
        ignored
    }
}

fn compile_glob(text: &str) -> Result<GlobMatcher, globset::Error> {
    // literal_separator keeps `*` and `?` from crossing directory
    // boundaries, matching gitignore semantics; `**` still spans them.
    GlobBuilder::new(text)
        .literal_separator(true)
        .build()
        .map(|glob: Glob| glob.compile_matcher())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(lines: &[&str]) -> IgnoreMatcher {
        IgnoreMatcher::from_lines(lines.iter().copied())
    }

    #[test]
    fn directory_pattern_excludes_contents() {
        let m = matcher(&["a/"]);
        assert!(m.is_ignored("a", true));
        assert!(m.is_ignored("a/b.txt", false));
        assert!(m.is_ignored("a/b/c.txt", false));
        assert!(!m.is_ignored("b/a.txt", false));
    }

    #[test]
    fn directory_pattern_does_not_match_plain_file() {
        let m = matcher(&["logs/"]);
        assert!(!m.is_ignored("logs", false));
        assert!(m.is_ignored("logs", true));
    }

    #[test]
    fn unanchored_pattern_matches_at_any_depth() {
        let m = matcher(&["*.log"]);
        assert!(m.is_ignored("debug.log", false));
        assert!(m.is_ignored("deep/nested/trace.log", false));
        assert!(!m.is_ignored("debug.log.txt", false));
    }

    #[test]
    fn anchored_pattern_matches_only_from_root() {
        let m = matcher(&["build/output.txt"]);
        assert!(m.is_ignored("build/output.txt", false));
        assert!(!m.is_ignored("src/build/output.txt", false));
    }

    #[test]
    fn later_negation_wins() {
        let m = matcher(&["*.log", "!keep.log"]);
        assert!(m.is_ignored("debug.log", false));
        assert!(!m.is_ignored("keep.log", false));
        assert!(!m.is_ignored("nested/keep.log", false));
    }

    #[test]
    fn negation_before_pattern_is_overridden() {
        let m = matcher(&["!keep.log", "*.log"]);
        assert!(m.is_ignored("keep.log", false));
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let m = matcher(&["", "# comment", "   ", "*.tmp"]);
        assert!(m.is_ignored("scratch.tmp", false));
        assert!(!m.is_ignored("# comment", false));
    }

    #[test]
    fn question_mark_matches_single_char() {
        let m = matcher(&["file?.txt"]);
        assert!(m.is_ignored("file1.txt", false));
        assert!(!m.is_ignored("file10.txt", false));
        assert!(m.is_ignored("a/b/file1.txt", false));
    }

    #[test]
    fn double_star_spans_directories() {
        let m = matcher(&["docs/**/draft.md"]);
        assert!(m.is_ignored("docs/draft.md", false));
        assert!(m.is_ignored("docs/a/b/draft.md", false));
        assert!(!m.is_ignored("other/docs/draft.md", false));
    }

    #[test]
    fn single_star_does_not_cross_separators() {
        let m = matcher(&["src/*.rs"]);
        assert!(m.is_ignored("src/lib.rs", false));
        assert!(!m.is_ignored("src/nested/lib.rs", false));
    }

    #[test]
    fn malformed_pattern_is_dropped_not_fatal() {
        let m = matcher(&["[invalid", "*.log"]);
        assert!(m.is_ignored("debug.log", false));
    }

    #[test]
    fn missing_file_is_empty_set() {
        let m = IgnoreMatcher::from_file(Path::new("/nonexistent/.gitignore"));
        assert!(m.is_empty());
        assert!(!m.is_ignored("anything", false));
    }
}

//! Workspace traversal with built-in and configurable exclusions.
//!
//! Scanning is a lazy, restartable iterator so very large workspaces never
//! need the whole tree in memory. Traversal order is deterministic for a
//! fixed filesystem snapshot: entries within each directory are visited in
//! lexicographic file-name order, depth first. That keeps indexing
//! reproducible for tests.

use super::ignore_rules::IgnoreMatcher;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Directory names pruned before recursion and never yielded. Kept small:
/// version-control internals and build caches only; everything else goes
/// through the ignore matcher.
const ALWAYS_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
];

/// Extensions that are never worth chunking.
const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bin", "png", "jpg", "jpeg", "gif", "ico", "wasm", "pdf", "zip",
    "gz", "lock",
];

/// Classify a file's language from its extension.
pub fn detect_language(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("rs") => "rust",
        Some("py") => "python",
        Some("js") | Some("jsx") => "javascript",
        Some("ts") | Some("tsx") => "typescript",
        Some("go") => "go",
        Some("java") => "java",
        Some("c") | Some("h") => "c",
        Some("cpp") | Some("hpp") | Some("cc") => "cpp",
        Some("rb") => "ruby",
        Some("md") | Some("markdown") => "markdown",
        Some("toml") => "toml",
        Some("yaml") | Some("yml") => "yaml",
        Some("json") => "json",
        Some("sh") => "shell",
        Some("sql") => "sql",
        Some("txt") => "text",
        _ => "unknown",
    }
}

/// Whether a file is a plausible indexing candidate at all (ignores aside).
fn is_indexable(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str())
        && name.starts_with('.')
    {
        return false;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => !BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => true,
    }
}

/// A file surviving all exclusion layers, relative to the scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    /// Workspace-relative path with `/` separators.
    pub relative_path: String,
    pub language: &'static str,
}

/// Walks the workspace tree applying built-in exclusions plus the ignore
/// matcher, yielding candidate files. Each call to [`scan`](Self::scan)
/// starts a fresh traversal.
#[derive(Debug)]
pub struct WorkspaceScanner {
    root: PathBuf,
    ignore: IgnoreMatcher,
}

impl WorkspaceScanner {
    pub fn new(root: PathBuf, ignore: IgnoreMatcher) -> Self {
        Self { root, ignore }
    }

    /// Build a scanner for `root`, loading its `.gitignore` if present.
    pub fn for_root(root: &Path) -> Self {
        let ignore = IgnoreMatcher::from_file(&root.join(".gitignore"));
        Self::new(root.to_path_buf(), ignore)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scan(&self) -> ScanIter<'_> {
        ScanIter {
            root: &self.root,
            ignore: &self.ignore,
            pending_dirs: VecDeque::from([PathBuf::new()]),
            pending_files: VecDeque::new(),
            excluded: 0,
            failed: 0,
        }
    }
}

/// Lazy traversal state. Exposes counters for excluded and unreadable
/// entries once iteration has progressed past them.
#[derive(Debug)]
pub struct ScanIter<'a> {
    root: &'a Path,
    ignore: &'a IgnoreMatcher,
    /// Directories still to be read, workspace-relative.
    pending_dirs: VecDeque<PathBuf>,
    pending_files: VecDeque<FileCandidate>,
    excluded: usize,
    failed: usize,
}

impl ScanIter<'_> {
    /// Files and directories excluded by ignore rules so far.
    pub fn excluded(&self) -> usize {
        self.excluded
    }

    /// Directories that could not be read so far.
    pub fn failed(&self) -> usize {
        self.failed
    }

    fn read_directory(&mut self, relative_dir: &Path) {
        let absolute = self.root.join(relative_dir);
        let read_dir = match std::fs::read_dir(&absolute) {
            Ok(rd) => rd,
            Err(e) => {
                warn!(path = %absolute.display(), error = %e, "skipping unreadable directory");
                self.failed += 1;
                return;
            }
        };

        let mut entries: Vec<(String, bool)> = Vec::new();
        for entry in read_dir {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(path = %absolute.display(), error = %e, "skipping unreadable entry");
                    self.failed += 1;
                    continue;
                }
            };
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            entries.push((name, is_dir));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        // Directories are queued in reverse so the front of the deque pops
        // them in sorted order, depth first.
        let mut dirs: Vec<PathBuf> = Vec::new();
        for (name, is_dir) in entries {
            let relative = relative_dir.join(&name);
            let relative_str = path_to_unix(&relative);
            if is_dir {
                if ALWAYS_EXCLUDED_DIRS.contains(&name.as_str()) {
                    continue;
                }
                if self.ignore.is_ignored(&relative_str, true) {
                    self.excluded += 1;
                    continue;
                }
                dirs.push(relative);
            } else {
                if !is_indexable(&relative) {
                    continue;
                }
                if self.ignore.is_ignored(&relative_str, false) {
                    self.excluded += 1;
                    continue;
                }
                self.pending_files.push_back(FileCandidate {
                    language: detect_language(&relative),
                    relative_path: relative_str,
                });
            }
        }
        for dir in dirs.into_iter().rev() {
            self.pending_dirs.push_front(dir);
        }
    }
}

impl Iterator for ScanIter<'_> {
    type Item = FileCandidate;

    fn next(&mut self) -> Option<FileCandidate> {
        loop {
            if let Some(candidate) = self.pending_files.pop_front() {
                return Some(candidate);
            }
            let dir = self.pending_dirs.pop_front()?;
            self.read_directory(&dir);
        }
    }
}

/// Render a relative path with `/` separators regardless of platform.
pub fn path_to_unix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "content").unwrap();
    }

    #[test]
    fn traversal_is_sorted_and_deterministic() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "b.rs");
        touch(dir.path(), "a.rs");
        touch(dir.path(), "sub/z.py");
        touch(dir.path(), "sub/a.py");

        let scanner = WorkspaceScanner::for_root(dir.path());
        let first: Vec<String> = scanner.scan().map(|c| c.relative_path).collect();
        let second: Vec<String> = scanner.scan().map(|c| c.relative_path).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["a.rs", "b.rs", "sub/a.py", "sub/z.py"]);
    }

    #[test]
    fn builtin_directories_are_pruned() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "src/main.rs");
        touch(dir.path(), ".git/config.rs");
        touch(dir.path(), "node_modules/pkg/index.js");
        touch(dir.path(), "target/debug/build.rs");

        let scanner = WorkspaceScanner::for_root(dir.path());
        let paths: Vec<String> = scanner.scan().map(|c| c.relative_path).collect();
        assert_eq!(paths, vec!["src/main.rs"]);
    }

    #[test]
    fn ignore_rules_prune_subtrees_and_count() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a/b.txt");
        touch(dir.path(), "keep.txt");
        fs::write(dir.path().join(".gitignore"), "a/\n").unwrap();

        let scanner = WorkspaceScanner::for_root(dir.path());
        let mut iter = scanner.scan();
        let paths: Vec<String> = iter.by_ref().map(|c| c.relative_path).collect();
        assert_eq!(paths, vec!["keep.txt"]);
        assert_eq!(iter.excluded(), 1);
    }

    #[test]
    fn hidden_and_binary_files_are_skipped() {
        let dir = tempdir().unwrap();
        touch(dir.path(), ".hidden.rs");
        touch(dir.path(), "image.png");
        touch(dir.path(), "code.rs");

        let scanner = WorkspaceScanner::for_root(dir.path());
        let paths: Vec<String> = scanner.scan().map(|c| c.relative_path).collect();
        assert_eq!(paths, vec!["code.rs"]);
    }

    #[test]
    fn languages_are_classified() {
        assert_eq!(detect_language(Path::new("x.py")), "python");
        assert_eq!(detect_language(Path::new("src/lib.rs")), "rust");
        assert_eq!(detect_language(Path::new("Makefile")), "unknown");
    }
}

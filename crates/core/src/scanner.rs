//! Finding files with conflict markers.
//!
//! [`Scanner`] walks a codebase and returns every eligible file that holds
//! at least one conflict block, parsed and ready for processing. Eligibility
//! is decided by [`FilePolicy`]:
//!
//! | Condition | Decision |
//! |-----------|----------|
//! | Extension not in `scan.extensions` | `Unsupported` |
//! | Path matches an ignore pattern | `Ignored` |
//! | Size exceeds `max_file_size` (when > 0) | `Oversize` |
//! | None of the above | `Allow` |

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::ScanConfig;
use crate::conflict::{has_conflict_markers, ConflictParser, ParsedDocument};
use crate::errors::ScanError;

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

// ---------------------------------------------------------------------------
// File policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePolicyDecision {
    Allow,
    Unsupported,
    Ignored { pattern: String },
    Oversize { size: u64, limit: u64 },
}

impl FilePolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Extension, ignore-pattern and size checks for candidate files.
#[derive(Debug, Clone)]
pub struct FilePolicy {
    extensions: Vec<String>,
    ignore_patterns: Vec<String>,
    max_file_size: u64,
}

impl FilePolicy {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            ignore_patterns: config
                .ignore_patterns
                .iter()
                .map(|p| p.replace('\\', "/"))
                .collect(),
            max_file_size: config.max_file_size,
        }
    }

    /// Evaluate a file. `rel_path` is relative to the codebase root.
    pub fn evaluate(&self, rel_path: &str, size: u64) -> FilePolicyDecision {
        let path = rel_path.replace('\\', "/");

        let ext = Path::new(&path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext {
            Some(ext) if self.extensions.contains(&ext) => {}
            _ => return FilePolicyDecision::Unsupported,
        }

        if let Some(pattern) = self
            .ignore_patterns
            .iter()
            .find(|p| glob_match::glob_match(p, &path))
        {
            debug!(path = %path, pattern = %pattern, "file matches ignore pattern");
            return FilePolicyDecision::Ignored {
                pattern: pattern.clone(),
            };
        }

        if self.max_file_size > 0 && size > self.max_file_size {
            warn!(
                path = %path,
                size,
                limit = self.max_file_size,
                "file exceeds max_file_size, skipping"
            );
            return FilePolicyDecision::Oversize {
                size,
                limit: self.max_file_size,
            };
        }

        FilePolicyDecision::Allow
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// A file with at least one conflict block.
#[derive(Debug, Clone)]
pub struct ConflictFile {
    pub path: PathBuf,
    /// Forward-slash path relative to the codebase root.
    pub rel_path: String,
    pub content: String,
    pub document: ParsedDocument,
}

impl ConflictFile {
    pub fn conflict_count(&self) -> usize {
        self.document.conflict_count()
    }
}

pub struct Scanner {
    root: PathBuf,
    policy: FilePolicy,
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIPPED_DIRS.contains(&name))
            .unwrap_or(false)
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// File contents as UTF-8, `None` (with a warning) when unreadable.
fn read_text(path: &Path, rel_path: &str) -> Option<String> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %rel_path, error = %e, "cannot read file, skipping");
            return None;
        }
    };
    match String::from_utf8(bytes) {
        Ok(content) => Some(content),
        Err(_) => {
            warn!(path = %rel_path, "file is not valid UTF-8, skipping");
            None
        }
    }
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, config: &ScanConfig) -> Self {
        Self {
            root: root.into(),
            policy: FilePolicy::new(config),
        }
    }

    /// Eligible files under the root, sorted by relative path. Entries that
    /// cannot be read are skipped with a warning; only an unreadable root
    /// fails the walk.
    fn candidates(&self) -> Result<Vec<(String, PathBuf)>, ScanError> {
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e));

        let mut candidates = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(ScanError::WalkFailed {
                        path: self.root.display().to_string(),
                        detail: e.to_string(),
                    });
                }
                Err(e) => {
                    let path = e.path().map(|p| relative_path(&self.root, p));
                    warn!(path = ?path, error = %e, "cannot read entry, skipping");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let rel_path = relative_path(&self.root, entry.path());
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if self.policy.evaluate(&rel_path, size).is_allowed() {
                candidates.push((rel_path, entry.into_path()));
            }
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(candidates)
    }

    /// Collect files with conflicts in sorted path order, stopping after
    /// `limit` files when given.
    pub fn scan(&self, limit: Option<usize>) -> Result<Vec<ConflictFile>, ScanError> {
        if !self.root.is_dir() {
            return Err(ScanError::RootNotFound(self.root.display().to_string()));
        }
        info!(root = %self.root.display(), "scanning for conflicts");

        let candidates = self.candidates()?;
        let mut files = Vec::new();
        let mut examined = 0usize;
        for (rel_path, path) in candidates {
            examined += 1;
            let Some(content) = read_text(&path, &rel_path) else {
                continue;
            };
            if !has_conflict_markers(&content) {
                continue;
            }

            let document = ConflictParser::parse(&content);
            for warning in &document.warnings {
                warn!(
                    path = %rel_path,
                    line = warning.line,
                    message = %warning.message,
                    "malformed conflict block"
                );
            }
            if !document.has_conflicts() {
                continue;
            }

            debug!(path = %rel_path, conflicts = document.conflict_count(), "found conflicts");
            files.push(ConflictFile {
                path,
                rel_path,
                content,
                document,
            });

            if limit.is_some_and(|n| files.len() >= n) {
                debug!(limit = ?limit, "file limit reached");
                break;
            }
        }

        info!(
            examined,
            files = files.len(),
            conflicts = files.iter().map(ConflictFile::conflict_count).sum::<usize>(),
            "scan complete"
        );
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFLICT: &str = "# Title\n<<<<<<< HEAD\nBonjour\n=======\nHello\n>>>>>>> main\n";

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn policy(ignore: &[&str], max: u64) -> FilePolicy {
        FilePolicy::new(&ScanConfig {
            ignore_patterns: ignore.iter().map(|s| s.to_string()).collect(),
            max_file_size: max,
            ..ScanConfig::default()
        })
    }

    #[test]
    fn test_policy_extension() {
        let p = policy(&[], 0);
        assert_eq!(p.evaluate("docs/intro.md", 10), FilePolicyDecision::Allow);
        assert_eq!(p.evaluate("docs/INTRO.MDX", 10), FilePolicyDecision::Allow);
        assert_eq!(
            p.evaluate("img/logo.png", 10),
            FilePolicyDecision::Unsupported
        );
        assert_eq!(p.evaluate("Makefile", 10), FilePolicyDecision::Unsupported);
    }

    #[test]
    fn test_policy_ignore_and_size() {
        let p = policy(&["blog/**"], 100);
        assert_eq!(
            p.evaluate("blog/2023/post.md", 10),
            FilePolicyDecision::Ignored {
                pattern: "blog/**".into()
            }
        );
        assert_eq!(
            p.evaluate("docs/big.md", 500),
            FilePolicyDecision::Oversize {
                size: 500,
                limit: 100
            }
        );
    }

    #[test]
    fn test_scan_finds_conflicts_sorted() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b/second.md", CONFLICT.as_bytes());
        write(dir.path(), "a/first.md", CONFLICT.as_bytes());
        write(dir.path(), "a/clean.md", b"# Clean\n");
        write(dir.path(), "a/image.png", CONFLICT.as_bytes());

        let files = Scanner::new(dir.path(), &ScanConfig::default())
            .scan(None)
            .unwrap();
        let names: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(names, vec!["a/first.md", "b/second.md"]);
        assert_eq!(files[0].conflict_count(), 1);
        assert_eq!(files[0].content, CONFLICT);
    }

    #[test]
    fn test_scan_skips_vcs_and_dependencies() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".git/MERGE_MSG.md", CONFLICT.as_bytes());
        write(dir.path(), "node_modules/pkg/README.md", CONFLICT.as_bytes());
        write(dir.path(), "docs/page.md", CONFLICT.as_bytes());

        let files = Scanner::new(dir.path(), &ScanConfig::default())
            .scan(None)
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "docs/page.md");
    }

    #[test]
    fn test_scan_limit() {
        let dir = TempDir::new().unwrap();
        for name in ["a.md", "b.md", "c.md"] {
            write(dir.path(), name, CONFLICT.as_bytes());
        }
        let files = Scanner::new(dir.path(), &ScanConfig::default())
            .scan(Some(2))
            .unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].rel_path, "b.md");
    }

    #[test]
    fn test_scan_skips_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        let mut bytes = CONFLICT.as_bytes().to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        write(dir.path(), "broken.md", &bytes);
        write(dir.path(), "ok.md", CONFLICT.as_bytes());

        let files = Scanner::new(dir.path(), &ScanConfig::default())
            .scan(None)
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "ok.md");
    }

    #[test]
    fn test_scan_skips_malformed_only_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "open.md", b"<<<<<<< HEAD\nBonjour\n=======\nHello\n");
        let files = Scanner::new(dir.path(), &ScanConfig::default())
            .scan(None)
            .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_scan_orders_by_full_path() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/x.md", CONFLICT.as_bytes());
        write(dir.path(), "a-b.md", CONFLICT.as_bytes());
        write(dir.path(), "A.md", CONFLICT.as_bytes());

        let files = Scanner::new(dir.path(), &ScanConfig::default())
            .scan(None)
            .unwrap();
        let names: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(names, vec!["A.md", "a-b.md", "a/x.md"]);
    }

    #[test]
    fn test_read_text_skips_unreadable_file() {
        let dir = TempDir::new().unwrap();
        assert!(read_text(&dir.path().join("gone.md"), "gone.md").is_none());
        // A directory cannot be read as a file.
        assert!(read_text(dir.path(), "").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_continues_past_unreadable_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write(dir.path(), "docs/a.md", CONFLICT.as_bytes());
        write(dir.path(), "locked/b.md", CONFLICT.as_bytes());
        let locked = dir.path().join("locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let result = Scanner::new(dir.path(), &ScanConfig::default()).scan(None);
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        // Privileged users can still read the directory; either way the
        // readable file is found and the walk does not fail.
        let files = result.unwrap();
        assert_eq!(files[0].rel_path, "docs/a.md");
    }

    #[test]
    fn test_scan_missing_root() {
        let err = Scanner::new("/nonexistent/lingomerge-root", &ScanConfig::default())
            .scan(None)
            .unwrap_err();
        assert!(matches!(err, ScanError::RootNotFound(_)));
    }
}

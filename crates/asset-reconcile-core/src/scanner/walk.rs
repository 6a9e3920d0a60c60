use dashmap::DashMap;
use glob::Pattern;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{error, warn};

use super::{FileRecord, ScanIssue, ScanOutcome};
use crate::error::ScanError;
use crate::paths;

/// Parallel content-tree walker. Runs on whatever rayon pool is current, so
/// callers bound concurrency with `ThreadPool::install`.
pub struct Scanner {
    extensions: HashSet<String>,
    ignore_patterns: Vec<Pattern>,
}

impl Scanner {
    pub fn new(extensions: &[String], ignore_globs: &[String]) -> Self {
        let ignore_patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        Self {
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            ignore_patterns,
        }
    }

    /// Walk `root` and return every matching file, sorted by relative path.
    /// Only an unreadable root fails; anything below it is skipped and
    /// reported.
    pub fn scan(&self, root: &Path) -> Result<ScanOutcome, ScanError> {
        let metadata = fs::metadata(root).map_err(|source| ScanError::Unreadable {
            path: root.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory {
                path: root.to_path_buf(),
            });
        }
        let entries = fs::read_dir(root).map_err(|source| ScanError::Unreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let files: DashMap<String, FileRecord> = DashMap::new();
        let issues: DashMap<String, String> = DashMap::new();
        let walk = Walk {
            root,
            scanner: self,
            files: &files,
            issues: &issues,
        };

        entries
            .par_bridge()
            .for_each(|entry_result| match entry_result {
                Ok(entry) => walk.visit_entry(&entry.path()),
                Err(err) => walk.issue(root, format!("unreadable entry: {}", err)),
            });

        let mut files: Vec<FileRecord> = files.into_iter().map(|(_, record)| record).collect();
        files.sort_by(|a, b| a.current_path.cmp(&b.current_path));
        let mut issues: Vec<ScanIssue> = issues
            .into_iter()
            .map(|(path, reason)| ScanIssue { path, reason })
            .collect();
        issues.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(ScanOutcome {
            root: root.to_path_buf(),
            files,
            issues,
        })
    }

    fn is_ignored(&self, rel: &str, abs: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches(rel) || pattern.matches_path(abs))
    }

    fn accepts_extension(&self, rel: &str) -> bool {
        let (_, ext) = paths::split_name(paths::file_name(rel));
        !ext.is_empty() && self.extensions.contains(&ext.to_ascii_lowercase())
    }
}

struct Walk<'a> {
    root: &'a Path,
    scanner: &'a Scanner,
    files: &'a DashMap<String, FileRecord>,
    issues: &'a DashMap<String, String>,
}

impl Walk<'_> {
    fn issue(&self, path: &Path, reason: String) {
        let shown = paths::relative(self.root, path)
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        warn!("Skipping '{}': {}", shown, reason);
        self.issues.insert(shown, reason);
    }

    fn visit_dir(&self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                self.issue(dir, format!("unreadable directory: {}", err));
                return;
            }
        };

        entries.par_bridge().for_each(|entry_result| match entry_result {
            Ok(entry) => self.visit_entry(&entry.path()),
            Err(err) => self.issue(dir, format!("unreadable entry: {}", err)),
        });
    }

    fn visit_entry(&self, path: &Path) {
        let rel = match paths::relative(self.root, path) {
            Some(rel) => rel,
            None => {
                self.issue(path, "non-UTF-8 file name".to_string());
                return;
            }
        };

        if paths::is_staging_name(paths::file_name(&rel)) {
            self.issue(path, "leftover staging file from an interrupted run".to_string());
            return;
        }
        if self.scanner.is_ignored(&rel, path) {
            return;
        }

        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                self.issue(path, format!("unreadable metadata: {}", err));
                return;
            }
        };

        if metadata.file_type().is_symlink() {
            return;
        }
        if metadata.is_dir() {
            self.visit_dir(path);
        } else if metadata.is_file() && self.scanner.accepts_extension(&rel) {
            self.files
                .entry(rel.clone())
                .or_insert_with(|| FileRecord::new(rel, metadata.len()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn scanner() -> Scanner {
        Scanner::new(
            &["jpg".to_string(), "png".to_string()],
            &["**/private/**".to_string()],
        )
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("img/b")).unwrap();
        fs::create_dir_all(root.join("img/private")).unwrap();
        fs::write(root.join("img/b/z.JPG"), b"z").unwrap();
        fs::write(root.join("img/a.png"), b"a").unwrap();
        fs::write(root.join("img/notes.txt"), b"t").unwrap();
        fs::write(root.join("img/private/secret.jpg"), b"s").unwrap();

        let outcome = scanner().scan(root).unwrap();
        let paths: Vec<&str> = outcome.files.iter().map(|f| f.current_path.as_str()).collect();
        assert_eq!(paths, vec!["img/a.png", "img/b/z.JPG"]);
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.total_bytes(), 2);
    }

    #[test]
    fn test_staging_leftovers_are_reported() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join(".reconcile-stage-0-a.jpg"), b"x").unwrap();
        fs::write(tmp.path().join("a.jpg"), b"x").unwrap();

        let outcome = scanner().scan(tmp.path()).unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.issues.len(), 1);
        assert!(outcome.issues[0].reason.contains("staging"));
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let tmp = tempdir().unwrap();
        let err = scanner().scan(&tmp.path().join("absent")).unwrap_err();
        assert!(matches!(err, ScanError::Unreadable { .. }));
    }

    #[test]
    fn test_file_root_is_fatal() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("a.jpg");
        fs::write(&file, b"x").unwrap();
        let err = scanner().scan(&file).unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.jpg"), b"x").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("a.jpg"), tmp.path().join("link.jpg")).unwrap();

        let outcome = scanner().scan(tmp.path()).unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].current_path, "a.jpg");
    }
}

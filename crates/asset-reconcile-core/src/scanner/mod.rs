pub mod walk;

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::hasher;
use crate::paths;

pub use walk::Scanner;

/// A file discovered during scanning. Identity is `current_path` for the
/// duration of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub current_path: String,
    pub directory: String,
    pub base_name: String,
    pub extension: String,
    pub size_bytes: u64,
    #[serde(skip)]
    content_digest: OnceLock<String>,
}

impl FileRecord {
    pub fn new(current_path: impl Into<String>, size_bytes: u64) -> Self {
        let current_path = current_path.into();
        let directory = paths::parent(&current_path).to_string();
        let (base_name, extension) = paths::split_name(paths::file_name(&current_path));
        Self {
            base_name: base_name.to_string(),
            extension: extension.to_string(),
            directory,
            current_path,
            size_bytes,
            content_digest: OnceLock::new(),
        }
    }

    pub fn file_name(&self) -> &str {
        paths::file_name(&self.current_path)
    }

    pub fn depth(&self) -> usize {
        paths::depth(&self.directory)
    }

    pub fn absolute(&self, root: &Path) -> PathBuf {
        paths::absolute(root, &self.current_path)
    }

    /// Content digest, computed on first use and memoized for the pass.
    pub fn content_digest(&self, root: &Path) -> io::Result<&str> {
        if let Some(digest) = self.content_digest.get() {
            return Ok(digest);
        }
        let digest = hasher::content_digest(&self.absolute(root))?;
        Ok(self.content_digest.get_or_init(|| digest))
    }

    pub fn cached_digest(&self) -> Option<&str> {
        self.content_digest.get().map(|s| s.as_str())
    }
}

/// An entry the scanner skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanIssue {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub root: PathBuf,
    /// Sorted by `current_path`.
    pub files: Vec<FileRecord>,
    /// Sorted by `path`.
    pub issues: Vec<ScanIssue>,
}

impl ScanOutcome {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

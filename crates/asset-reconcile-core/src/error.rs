use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Thread pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// The content root itself could not be walked. Nothing below the root is
/// ever reported this way.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("content root {path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("content root {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single file could not be classified. The file is left where it is.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ClassifyError {
    #[error("unreadable: {0}")]
    Unreadable(String),

    #[error("unrecognized image format")]
    Unrecognized,

    #[error("corrupt image data: {0}")]
    Corrupt(String),
}

/// Problems found while planning. Collected into the plan, never raised.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanningError {
    #[error("record {id} references missing file {path} and no match was found")]
    MissingReference { id: i64, path: String },

    #[error("record {id} references missing file {path}; {matcher} matched {} candidates", .candidates.len())]
    AmbiguousReference {
        id: i64,
        path: String,
        matcher: String,
        candidates: Vec<String>,
    },

    #[error("record {id} would move to {target}, already held by record {holder}")]
    DuplicateReference {
        id: i64,
        path: String,
        target: String,
        holder: i64,
    },

    #[error("record {id} path {path} is outside the content root")]
    OutsideRoot { id: i64, path: String },

    #[error("{path} normalizes to an empty name")]
    EmptyName { path: String },

    #[error("could not digest {path}: {cause}")]
    DigestFailed { path: String, cause: String },

    #[error("could not derive metadata for {path}: {cause}")]
    MetadataFailed { path: String, cause: String },
}

/// Failure of a single plan operation at apply time.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error at {path}: {message}")]
    Image { path: PathBuf, message: String },

    #[error("store error: {0}")]
    Store(#[from] Error),

    #[error("timed out after {0}s")]
    TimedOut(u64),

    #[error("unsupported conversion to {0}")]
    Unsupported(String),

    #[error("worker thread panicked")]
    WorkerLost,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ExecutionError {
    ExecutionError::Io {
        path: path.into(),
        source,
    }
}

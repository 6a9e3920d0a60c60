//! Helpers for content-relative paths (`/`-separated `String`s).

use std::path::{Component, Path, PathBuf};

/// Prefix of every temporary name the executor creates.
pub const STAGING_PREFIX: &str = ".reconcile-";

pub fn join(directory: &str, file_name: &str) -> String {
    if directory.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", directory, file_name)
    }
}

/// Directory part of a relative path, `""` at the root.
pub fn parent(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Splits a file name into stem and extension at the last dot. A leading dot
/// does not start an extension.
pub fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => (&file_name[..idx], &file_name[idx + 1..]),
        _ => (file_name, ""),
    }
}

pub fn depth(directory: &str) -> usize {
    if directory.is_empty() {
        0
    } else {
        directory.split('/').count()
    }
}

pub fn is_staging_name(file_name: &str) -> bool {
    file_name.starts_with(STAGING_PREFIX)
}

/// `path` with its last segment replaced. Works for store paths too, keeping
/// any leading prefix.
pub fn with_file_name(path: &str, name: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => format!("{}/{}", dir, name),
        None => name.to_string(),
    }
}

/// Sibling name used to park `path` while a rename cycle is broken.
pub fn staging_name(path: &str, n: usize) -> String {
    with_file_name(path, &format!("{}stage-{}-{}", STAGING_PREFIX, n, file_name(path)))
}

/// Absolute location of a relative path below `root`.
pub fn absolute(root: &Path, rel: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for part in rel.split('/').filter(|p| !p.is_empty()) {
        out.push(part);
    }
    out
}

/// Relative form of `path` below `root`, or `None` for paths outside the root
/// or with non-UTF-8 components.
pub fn relative(root: &Path, path: &Path) -> Option<String> {
    let stripped = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in stripped.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

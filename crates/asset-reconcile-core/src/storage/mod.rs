pub mod memory;
pub mod models;
pub mod sqlite;

pub use memory::MemoryStore;
pub use models::{AssetRecord, DerivedMetadata};
pub use sqlite::SqliteStore;

use crate::error::Error;

/// The only contract the engine needs from the surrounding application.
///
/// `get` and `find_by_path` fall back to a full listing; stores with an
/// index should override them.
pub trait AssetStore {
    fn list_all(&self) -> Result<Vec<AssetRecord>, Error>;

    fn create(&mut self, path: &str, metadata: &DerivedMetadata) -> Result<i64, Error>;

    fn update_path(&mut self, id: i64, new_path: &str) -> Result<(), Error>;

    fn delete(&mut self, id: i64) -> Result<(), Error>;

    fn get(&self, id: i64) -> Result<Option<AssetRecord>, Error> {
        Ok(self.list_all()?.into_iter().find(|r| r.id == id))
    }

    fn find_by_path(&self, path: &str) -> Result<Option<AssetRecord>, Error> {
        Ok(self.list_all()?.into_iter().find(|r| r.path == path))
    }
}

/// Maps store paths (`/img/a.jpg`) to content-relative paths (`img/a.jpg`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapper {
    prefix: String,
}

impl PathMapper {
    pub fn new(prefix: &str) -> Self {
        let mut prefix = prefix.replace('\\', "/");
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self { prefix }
    }

    pub fn to_relative(&self, store_path: &str) -> Option<String> {
        let normalized = store_path.replace('\\', "/");
        let rest = normalized.strip_prefix(&self.prefix)?;
        let rel = rest.trim_start_matches('/');
        if rel.is_empty() || rel.split('/').any(|part| part == "..") {
            None
        } else {
            Some(rel.to_string())
        }
    }

    pub fn to_store(&self, rel: &str) -> String {
        format!("{}{}", self.prefix, rel)
    }
}

impl Default for PathMapper {
    fn default() -> Self {
        Self::new("/")
    }
}

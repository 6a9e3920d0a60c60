use std::collections::BTreeMap;

use super::{AssetRecord, AssetStore, DerivedMetadata};
use crate::error::Error;

/// In-memory store with the same uniqueness rules as the SQLite one.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: BTreeMap<i64, AssetRecord>,
    next_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without metadata, as an application would have.
    pub fn insert(&mut self, path: &str) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        self.records.insert(
            id,
            AssetRecord {
                id,
                path: path.to_string(),
                metadata: None,
            },
        );
        id
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn path_taken(&self, path: &str, except: Option<i64>) -> bool {
        self.records
            .values()
            .any(|r| r.path == path && Some(r.id) != except)
    }
}

impl AssetStore for MemoryStore {
    fn list_all(&self) -> Result<Vec<AssetRecord>, Error> {
        Ok(self.records.values().cloned().collect())
    }

    fn create(&mut self, path: &str, metadata: &DerivedMetadata) -> Result<i64, Error> {
        if self.path_taken(path, None) {
            return Err(Error::Store(format!("path {} already exists", path)));
        }
        let id = self.insert(path);
        if let Some(record) = self.records.get_mut(&id) {
            record.metadata = Some(metadata.clone());
        }
        Ok(id)
    }

    fn update_path(&mut self, id: i64, new_path: &str) -> Result<(), Error> {
        if self.path_taken(new_path, Some(id)) {
            return Err(Error::Store(format!("path {} already exists", new_path)));
        }
        match self.records.get_mut(&id) {
            Some(record) => {
                record.path = new_path.to_string();
                Ok(())
            }
            None => Err(Error::Store(format!("record {} not found", id))),
        }
    }

    fn delete(&mut self, id: i64) -> Result<(), Error> {
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::Store(format!("record {} not found", id)))
    }

    fn get(&self, id: i64) -> Result<Option<AssetRecord>, Error> {
        Ok(self.records.get(&id).cloned())
    }
}

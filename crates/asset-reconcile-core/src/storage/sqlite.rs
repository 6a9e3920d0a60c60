use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::{AssetRecord, AssetStore, DerivedMetadata};
use crate::error::Error;

const SELECT_ASSET: &str = "SELECT id, path, width, height, aspect_ratio, placeholder FROM asset";

/// SQLite-backed asset store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open read-write, creating the database and schema when missing.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let store = SqliteStore { conn };
        store.configure_pragmas()?;
        store.migrate_schema()?;
        Ok(store)
    }

    /// Open an existing database without write access. Used for dry runs.
    pub fn open_read_only(path: &Path, busy_timeout: Duration) -> Result<Self, Error> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(busy_timeout)?;
        debug!("Opened asset store {} read-only", path.display());
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore { conn };
        store.migrate_schema()?;
        Ok(store)
    }

    fn configure_pragmas(&self) -> Result<(), Error> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        debug!("SQLite pragmas configured (WAL mode)");
        Ok(())
    }

    fn migrate_schema(&self) -> Result<(), Error> {
        self.conn.execute_batch(include_str!("schema.sql"))?;
        debug!("Asset schema initialized");
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<AssetRecord> {
    let width: Option<u32> = row.get(2)?;
    let height: Option<u32> = row.get(3)?;
    let aspect_ratio: Option<f64> = row.get(4)?;
    let placeholder: Option<String> = row.get(5)?;

    let metadata = match (width, height, aspect_ratio) {
        (Some(width), Some(height), Some(aspect_ratio)) => Some(DerivedMetadata {
            width,
            height,
            aspect_ratio,
            placeholder: placeholder.unwrap_or_default(),
        }),
        _ => None,
    };

    Ok(AssetRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        metadata,
    })
}

impl AssetStore for SqliteStore {
    fn list_all(&self) -> Result<Vec<AssetRecord>, Error> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY path, id", SELECT_ASSET))?;
        let records = stmt
            .query_map([], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn create(&mut self, path: &str, metadata: &DerivedMetadata) -> Result<i64, Error> {
        self.conn.execute(
            "INSERT INTO asset (path, width, height, aspect_ratio, placeholder) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                path,
                metadata.width,
                metadata.height,
                metadata.aspect_ratio,
                metadata.placeholder
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_path(&mut self, id: i64, new_path: &str) -> Result<(), Error> {
        let changed = self.conn.execute(
            "UPDATE asset SET path = ?1 WHERE id = ?2",
            params![new_path, id],
        )?;
        if changed == 0 {
            return Err(Error::Store(format!("record {} not found", id)));
        }
        Ok(())
    }

    fn delete(&mut self, id: i64) -> Result<(), Error> {
        let changed = self
            .conn
            .execute("DELETE FROM asset WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(Error::Store(format!("record {} not found", id)));
        }
        Ok(())
    }

    fn get(&self, id: i64) -> Result<Option<AssetRecord>, Error> {
        let record = self
            .conn
            .query_row(&format!("{} WHERE id = ?1", SELECT_ASSET), params![id], map_row)
            .optional()?;
        Ok(record)
    }

    fn find_by_path(&self, path: &str) -> Result<Option<AssetRecord>, Error> {
        let record = self
            .conn
            .query_row(&format!("{} WHERE path = ?1", SELECT_ASSET), params![path], map_row)
            .optional()?;
        Ok(record)
    }
}

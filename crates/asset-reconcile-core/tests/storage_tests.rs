use std::time::Duration;
use tempfile::tempdir;

use asset_reconcile_core::storage::{AssetStore, DerivedMetadata, SqliteStore};
use asset_reconcile_core::Error;

fn make_metadata(width: u32, height: u32) -> DerivedMetadata {
    DerivedMetadata {
        width,
        height,
        aspect_ratio: width as f64 / height as f64,
        placeholder: "data:image/jpeg;base64,AAAA".to_string(),
    }
}

#[test]
fn test_create_and_get_record() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let id = store.create("/img/a.jpg", &make_metadata(40, 20)).unwrap();
    assert!(id > 0);

    let record = store.get(id).unwrap().unwrap();
    assert_eq!(record.path, "/img/a.jpg");
    assert_eq!(record.metadata, Some(make_metadata(40, 20)));
    assert!(store.get(id + 100).unwrap().is_none());
}

#[test]
fn test_list_all_is_ordered_by_path() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    store.create("/img/c.jpg", &make_metadata(1, 1)).unwrap();
    store.create("/img/a.jpg", &make_metadata(1, 1)).unwrap();
    store.create("/img/b.jpg", &make_metadata(1, 1)).unwrap();

    let paths: Vec<String> = store.list_all().unwrap().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, vec!["/img/a.jpg", "/img/b.jpg", "/img/c.jpg"]);
}

#[test]
fn test_records_without_metadata() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
        .connection()
        .execute("INSERT INTO asset (path) VALUES (?1)", rusqlite::params!["/legacy.png"])
        .unwrap();

    let record = store.find_by_path("/legacy.png").unwrap().unwrap();
    assert!(record.metadata.is_none());
    assert!(store.find_by_path("/other.png").unwrap().is_none());
}

#[test]
fn test_paths_are_unique() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let a = store.create("/a.jpg", &make_metadata(1, 1)).unwrap();
    store.create("/b.jpg", &make_metadata(1, 1)).unwrap();

    assert!(matches!(
        store.create("/a.jpg", &make_metadata(2, 2)),
        Err(Error::Database(_))
    ));
    assert!(store.update_path(a, "/b.jpg").is_err());
    assert_eq!(store.get(a).unwrap().unwrap().path, "/a.jpg");
}

#[test]
fn test_update_and_delete_missing_record() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let id = store.create("/a.jpg", &make_metadata(1, 1)).unwrap();

    store.update_path(id, "/img/a.jpg").unwrap();
    assert_eq!(store.find_by_path("/img/a.jpg").unwrap().unwrap().id, id);

    store.delete(id).unwrap();
    assert!(store.get(id).unwrap().is_none());
    assert!(matches!(store.delete(id), Err(Error::Store(_))));
    assert!(matches!(store.update_path(id, "/x.jpg"), Err(Error::Store(_))));
}

#[test]
fn test_read_only_store_refuses_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("assets.db");
    {
        let mut store = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
        store.create("/a.jpg", &make_metadata(3, 2)).unwrap();
    }

    let mut reader = SqliteStore::open_read_only(&path, Duration::from_secs(1)).unwrap();
    assert_eq!(reader.list_all().unwrap().len(), 1);
    assert!(reader.create("/b.jpg", &make_metadata(1, 1)).is_err());
    assert_eq!(reader.list_all().unwrap().len(), 1);
}

#[test]
fn test_reopen_keeps_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("assets.db");
    let id = {
        let mut store = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
        store.create("/keep.jpg", &make_metadata(8, 8)).unwrap()
    };

    let store = SqliteStore::open(&path, Duration::from_secs(1)).unwrap();
    assert_eq!(store.get(id).unwrap().unwrap().path, "/keep.jpg");
}

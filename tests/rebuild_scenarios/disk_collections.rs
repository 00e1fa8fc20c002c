//! Rebuilds over collections stored on disk

use tempfile::TempDir;
use viewbuild::CONFIG_FILE_NAME;

use crate::common::*;

#[test]
fn test_index_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");

    let created = {
        let db = Collection::open(&path).unwrap();
        seed(&db, &["foo", "bar", "baz"]);
        let report = ViewBuilder::new(&db)
            .rebuild(vec![idx_design(by_name())])
            .unwrap();
        db.close().unwrap();
        report.stores_created
    };
    assert!(dir.path().join(&created[0]).is_dir());

    let db = Collection::open(&path).unwrap();
    let report = ViewBuilder::new(&db)
        .rebuild(vec![idx_design(by_name())])
        .unwrap();
    assert_eq!(report.map_evaluations, 0);
    assert_eq!(report.views_skipped, vec!["idx/by_name"]);

    let store = index_store(&db, &created[0]);
    assert_eq!(
        index_keys(store.as_ref()),
        vec![Value::from("bar"), Value::from("baz"), Value::from("foo")]
    );
}

#[test]
fn test_sweep_removes_store_directory() {
    let dir = TempDir::new().unwrap();
    let db = Collection::open(dir.path().join("db")).unwrap();
    seed(&db, &["foo", "bar"]);

    let builder = ViewBuilder::new(&db);
    let first = builder.rebuild(vec![idx_design(by_name())]).unwrap();
    let second = builder
        .rebuild(vec![idx_design(by_name_with_n())])
        .unwrap();

    assert_eq!(second.stores_removed, first.stores_created);
    assert!(!dir.path().join(&first.stores_created[0]).exists());
    assert!(dir.path().join(&second.stores_created[0]).is_dir());
    assert!(dir.path().join("db").is_dir());
}

#[test]
fn test_rebuild_with_config_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join(CONFIG_FILE_NAME);
    BuildConfig {
        chunk_size_read: 4,
        chunk_size_write: 3,
        ..BuildConfig::default()
    }
    .write_to_file(&config_path)
    .unwrap();

    let db = Collection::open(dir.path().join("db")).unwrap();
    let names: Vec<String> = (0..25).map(|i| format!("name{:02}", 24 - i)).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    seed(&db, &names);

    let config = BuildConfig::from_file(&config_path).unwrap();
    let report = ViewBuilder::with_config(&db, config)
        .unwrap()
        .rebuild(vec![idx_design(by_name())])
        .unwrap();
    assert_eq!(report.documents_scanned, 25);
    assert_eq!(report.entries_for("idx/by_name"), 25);

    let store = index_store(&db, &report.stores_created[0]);
    let keys = index_keys(store.as_ref());
    assert_eq!(keys.first(), Some(&Value::from("name00")));
    assert_eq!(keys.last(), Some(&Value::from("name24")));
}

//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::sync::Arc;

pub use viewbuild::{
    parse_indexable_string, store_name, value, view_signature, AllDocsOptions, BuildConfig,
    BuildError, Collection, DesignDoc, Document, DocumentStore, MapError, MapErrorPolicy,
    MapFunction, MapRegistry, RebuildReport, Value, ViewBuilder, ViewDefinition,
    DEPENDENT_VIEWS_ID, LAST_SEQ_ID,
};

// ============================================================================
// Map functions
// ============================================================================

pub const BY_NAME: &str = "function (doc) { emit(doc.name) }";
pub const BY_NAME_WITH_N: &str = "function (doc) { emit(doc.name, doc.n) }";

/// Emits `doc.name` with no value
pub fn by_name() -> MapFunction {
    MapFunction::new(BY_NAME, |doc, emit| {
        if let Some(name) = doc.get("name") {
            emit.emit_key(name.clone());
        }
        Ok(())
    })
}

/// Emits `doc.name` with `doc.n` as value
pub fn by_name_with_n() -> MapFunction {
    MapFunction::new(BY_NAME_WITH_N, |doc, emit| {
        if let Some(name) = doc.get("name") {
            emit.emit(name.clone(), doc.get("n").cloned());
        }
        Ok(())
    })
}

/// Design doc `_design/idx` with one view `by_name`
pub fn idx_design(map: MapFunction) -> DesignDoc {
    DesignDoc::new("idx").with_view(ViewDefinition::new("by_name", map))
}

// ============================================================================
// Collections
// ============================================================================

/// Put `{name, n}` documents with ids `d0`, `d1`, ...
pub fn seed(db: &dyn DocumentStore, names: &[&str]) {
    for (i, name) in names.iter().enumerate() {
        let body = value!({ "name": *name, "n": i }).into_object().unwrap();
        db.put(Document::new(format!("d{}", i), body)).unwrap();
    }
}

/// In-memory collection `db` holding the foo/bar/baz documents
pub fn foo_bar_baz() -> Collection {
    let db = Collection::in_memory("db");
    seed(&db, &["foo", "bar", "baz"]);
    db
}

/// Handle on the index store `name` of `db`
pub fn index_store(db: &dyn DocumentStore, name: &str) -> Arc<dyn DocumentStore> {
    assert!(db.dependent_exists(name).unwrap(), "missing index store {}", name);
    db.register_dependent(name).unwrap()
}

/// Decoded `[key, doc_id, ...]` ids of every entry in an index store, in store order
pub fn index_entries(store: &dyn DocumentStore) -> Vec<Vec<Value>> {
    store
        .all_docs(&AllDocsOptions::default())
        .unwrap()
        .into_iter()
        .map(|row| match parse_indexable_string(&row.id).unwrap() {
            Value::Array(parts) => parts,
            other => panic!("entry id is not an array: {:?}", other),
        })
        .collect()
}

/// Emitted keys of every entry, in store order
pub fn index_keys(store: &dyn DocumentStore) -> Vec<Value> {
    index_entries(store)
        .into_iter()
        .map(|mut parts| parts.remove(0))
        .collect()
}

/// The `mrview` stores currently registered under `db`
pub fn view_stores(db: &dyn DocumentStore) -> Vec<String> {
    db.list_dependents(&viewbuild::store_prefix(db.name())).unwrap()
}

//! Index store lifecycle across successive runs

use crate::common::*;

#[test]
fn test_first_run_creates_store_and_orders_keys() {
    let db = foo_bar_baz();
    let report = ViewBuilder::new(&db)
        .rebuild(vec![idx_design(by_name())])
        .unwrap();

    let expected = store_name("db", &view_signature(BY_NAME, None));
    assert_eq!(report.stores_created, vec![expected.clone()]);
    assert_eq!(view_stores(&db), vec![expected.clone()]);
    assert_eq!(report.documents_scanned, 3);
    assert_eq!(report.entries_for("idx/by_name"), 3);

    let store = index_store(&db, &expected);
    assert_eq!(
        index_keys(store.as_ref()),
        vec![Value::from("bar"), Value::from("baz"), Value::from("foo")]
    );
}

#[test]
fn test_second_run_reuses_fresh_store() {
    let db = foo_bar_baz();
    let builder = ViewBuilder::new(&db);
    let first = builder.rebuild(vec![idx_design(by_name())]).unwrap();
    let second = builder.rebuild(vec![idx_design(by_name())]).unwrap();

    assert_eq!(second.map_evaluations, 0);
    assert_eq!(second.documents_scanned, 0);
    assert_eq!(second.views_skipped, vec!["idx/by_name"]);
    assert!(second.stores_created.is_empty());
    assert!(second.stores_removed.is_empty());
    assert_eq!(second.checkpoint, None);
    assert_eq!(view_stores(&db), first.stores_created);
}

#[test]
fn test_removed_design_doc_store_is_swept() {
    let db = foo_bar_baz();
    let builder = ViewBuilder::new(&db);
    let first = builder.rebuild(vec![idx_design(by_name())]).unwrap();

    let design = db.get("_design/idx").unwrap().unwrap();
    db.remove("_design/idx", design.rev.as_deref().unwrap())
        .unwrap();

    let report = builder.rebuild(Vec::new()).unwrap();
    assert_eq!(report.stores_removed, first.stores_created);
    assert!(view_stores(&db).is_empty());
}

#[test]
fn test_changed_map_gets_new_store_and_old_is_swept() {
    let db = foo_bar_baz();
    let builder = ViewBuilder::new(&db);
    let first = builder.rebuild(vec![idx_design(by_name())]).unwrap();
    let second = builder
        .rebuild(vec![idx_design(by_name_with_n())])
        .unwrap();

    let new_store = store_name("db", &view_signature(BY_NAME_WITH_N, None));
    assert_ne!(first.stores_created, second.stores_created);
    assert_eq!(second.stores_created, vec![new_store.clone()]);
    assert_eq!(second.stores_removed, first.stores_created);
    assert_eq!(view_stores(&db), vec![new_store]);

    let stored = db.get("_design/idx").unwrap().unwrap();
    let map = stored
        .get("views")
        .and_then(|v| v.get("by_name"))
        .and_then(|v| v.get("map"));
    assert_eq!(map, Some(&Value::from(BY_NAME_WITH_N)));
}

#[test]
fn test_reduce_changes_signature() {
    let db = foo_bar_baz();
    let plain = idx_design(by_name());
    let reduced = DesignDoc::new("idx")
        .with_view(ViewDefinition::new("by_name", by_name()).with_reduce("_count"));

    let builder = ViewBuilder::new(&db);
    let first = builder.rebuild(vec![plain]).unwrap();
    let second = builder.rebuild(vec![reduced]).unwrap();
    assert_ne!(first.stores_created, second.stores_created);
    assert_eq!(second.stores_removed, first.stores_created);
}

#[test]
fn test_store_without_checkpoint_is_recreated() {
    let db = foo_bar_baz();
    let name = store_name("db", &view_signature(BY_NAME, None));

    // leftover of an interrupted run: entries but no checkpoint
    let stale = db.register_dependent(&name).unwrap();
    stale
        .put(Document::new("stale", Default::default()))
        .unwrap();
    stale.close().unwrap();

    let report = ViewBuilder::new(&db)
        .rebuild(vec![idx_design(by_name())])
        .unwrap();
    assert_eq!(report.stores_removed, vec![name.clone()]);
    assert_eq!(report.stores_created, vec![name.clone()]);

    let store = index_store(&db, &name);
    assert!(store.get("stale").unwrap().is_none());
    assert!(store.get(LAST_SEQ_ID).unwrap().is_some());
    assert_eq!(index_keys(store.as_ref()).len(), 3);
}

#[test]
fn test_forced_rebuild_replaces_everything() {
    let db = foo_bar_baz();
    let first = ViewBuilder::new(&db)
        .rebuild(vec![idx_design(by_name())])
        .unwrap();

    let forced = ViewBuilder::with_config(&db, BuildConfig::forced()).unwrap();
    let report = forced.rebuild(vec![idx_design(by_name())]).unwrap();
    assert_eq!(report.stores_removed, first.stores_created);
    assert_eq!(report.stores_created, first.stores_created);
    assert_eq!(report.map_evaluations, 3);
    assert_eq!(view_stores(&db), first.stores_created);
}

#[test]
fn test_rebuild_stored_after_source_change() {
    let db = foo_bar_baz();
    ViewBuilder::new(&db)
        .rebuild(vec![idx_design(by_name())])
        .unwrap();
    db.put(Document::new(
        "d9",
        value!({"name": "aardvark"}).into_object().unwrap(),
    ))
    .unwrap();

    let registry = MapRegistry::new().with(by_name());
    let forced = ViewBuilder::with_config(&db, BuildConfig::forced()).unwrap();
    let report = forced.rebuild_stored(&registry).unwrap();
    assert_eq!(report.entries_for("idx/by_name"), 4);

    let store = index_store(&db, &report.stores_created[0]);
    assert_eq!(index_keys(store.as_ref())[0], Value::from("aardvark"));
}

#[test]
fn test_views_sharing_a_signature_share_a_store() {
    let db = foo_bar_baz();
    let design = DesignDoc::new("idx")
        .with_view(ViewDefinition::new("by_name", by_name()))
        .with_view(ViewDefinition::new("again", by_name()));

    let report = ViewBuilder::new(&db).rebuild(vec![design]).unwrap();
    assert_eq!(report.stores_created.len(), 1);
    assert_eq!(report.views_skipped, vec!["idx/again"]);
    assert_eq!(report.map_evaluations, 3);

    let record = db.get(DEPENDENT_VIEWS_ID).unwrap().unwrap();
    let views = record.get("views").and_then(Value::as_object).unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views.get("idx/by_name"), views.get("idx/again"));
}

#[test]
fn test_loopback_design_docs() {
    let db = foo_bar_baz();
    let designs = DesignDoc::loopback(vec![
        ("names", vec![ViewDefinition::new("by_name", by_name())]),
        ("numbers", vec![ViewDefinition::new("by_n", by_name_with_n())]),
    ]);
    let report = ViewBuilder::new(&db).rebuild(designs).unwrap();
    assert_eq!(report.entries_for("names/by_name"), 3);
    assert_eq!(report.entries_for("numbers/by_n"), 3);
    assert_eq!(view_stores(&db).len(), 2);
    assert!(db.get("_design/names").unwrap().is_some());
    assert!(db.get("_design/numbers").unwrap().is_some());
}

//! Map failures, cancellation and bad definitions

use crate::common::*;

/// Same source text as `by_name`, but fails on `d1`
fn by_name_failing_on_d1() -> MapFunction {
    MapFunction::new(BY_NAME, |doc, emit| {
        if doc.id == "d1" {
            return Err(MapError::new("doc.name is not a function"));
        }
        if let Some(name) = doc.get("name") {
            emit.emit_key(name.clone());
        }
        Ok(())
    })
}

#[test]
fn test_fail_fast_leaves_store_to_be_recreated() {
    let db = foo_bar_baz();
    let err = ViewBuilder::new(&db)
        .rebuild(vec![idx_design(by_name_failing_on_d1())])
        .unwrap_err();
    match &err {
        BuildError::MapEvaluation { view, doc_id, message } => {
            assert_eq!(view, "idx/by_name");
            assert_eq!(doc_id, "d1");
            assert_eq!(message, "doc.name is not a function");
        }
        other => panic!("unexpected error: {}", other),
    }

    let name = store_name("db", &view_signature(BY_NAME, None));
    let store = index_store(&db, &name);
    assert!(store.get(LAST_SEQ_ID).unwrap().is_none());

    let report = ViewBuilder::new(&db)
        .rebuild(vec![idx_design(by_name())])
        .unwrap();
    assert_eq!(report.stores_removed, vec![name.clone()]);
    assert_eq!(report.stores_created, vec![name]);
    assert_eq!(report.entries_for("idx/by_name"), 3);
}

#[test]
fn test_isolate_skips_failing_documents() {
    let db = foo_bar_baz();
    let config = BuildConfig {
        on_map_error: MapErrorPolicy::Isolate,
        ..BuildConfig::default()
    };
    let builder = ViewBuilder::with_config(&db, config).unwrap();
    let report = builder
        .rebuild(vec![idx_design(by_name_failing_on_d1())])
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].doc_id, "d1");
    assert_eq!(report.failures[0].view, "idx/by_name");
    assert_eq!(report.entries_for("idx/by_name"), 2);

    let store = index_store(&db, &report.stores_created[0]);
    assert_eq!(
        index_keys(store.as_ref()),
        vec![Value::from("baz"), Value::from("foo")]
    );
    assert!(store.get("_local/doc_d1").unwrap().is_none());
    assert!(store.get(LAST_SEQ_ID).unwrap().is_some());

    // checkpointed, so the next run leaves it alone
    let again = builder
        .rebuild(vec![idx_design(by_name_failing_on_d1())])
        .unwrap();
    assert!(again.failures.is_empty());
    assert_eq!(again.views_skipped, vec!["idx/by_name"]);
}

#[test]
fn test_cancelled_run_is_resumed_by_the_next() {
    let db = foo_bar_baz();
    let builder = ViewBuilder::new(&db);
    builder.cancel_token().cancel();
    let err = builder
        .rebuild(vec![idx_design(by_name())])
        .unwrap_err();
    assert!(err.is_cancelled());

    // definitions were recorded before the scan started
    assert!(db.get("_design/idx").unwrap().is_some());
    assert!(db.get(DEPENDENT_VIEWS_ID).unwrap().is_some());
    let name = store_name("db", &view_signature(BY_NAME, None));
    assert!(index_store(&db, &name).get(LAST_SEQ_ID).unwrap().is_none());

    let report = ViewBuilder::new(&db)
        .rebuild(vec![idx_design(by_name())])
        .unwrap();
    assert_eq!(report.stores_created, vec![name]);
    assert_eq!(report.entries_for("idx/by_name"), 3);
}

#[test]
fn test_unresolved_stored_map_fails_before_writing() {
    let db = foo_bar_baz();
    let first = ViewBuilder::new(&db)
        .rebuild(vec![idx_design(by_name())])
        .unwrap();

    let forced = ViewBuilder::with_config(&db, BuildConfig::forced()).unwrap();
    let err = forced.rebuild_stored(&MapRegistry::new()).unwrap_err();
    assert!(matches!(err, BuildError::UnresolvedMap { ref view } if view == "idx/by_name"));

    assert!(db.get("_design/idx").unwrap().is_some());
    assert_eq!(view_stores(&db), first.stores_created);
}

#[test]
fn test_malformed_design_doc_is_reported() {
    let db = foo_bar_baz();
    db.put(Document::new(
        "_design/broken",
        value!({"views": {"v": {"reduce": "_sum"}}})
            .into_object()
            .unwrap(),
    ))
    .unwrap();

    let err = ViewBuilder::new(&db).current_views().unwrap_err();
    assert!(matches!(err, BuildError::InvalidDesignDoc { ref id, .. } if id == "_design/broken"));

    // a forced run drops it along with everything else
    let forced = ViewBuilder::with_config(&db, BuildConfig::forced()).unwrap();
    forced.rebuild(vec![idx_design(by_name())]).unwrap();
    assert!(db.get("_design/broken").unwrap().is_none());
    assert_eq!(ViewBuilder::new(&db).current_views().unwrap().len(), 1);
}

//! What a rebuild writes into an index store

use std::sync::Arc;

use crate::common::*;

fn built_store(db: &Collection, design: DesignDoc) -> (RebuildReport, Arc<dyn DocumentStore>) {
    let report = ViewBuilder::new(db).rebuild(vec![design]).unwrap();
    let store = index_store(db, &report.stores_created[0]);
    (report, store)
}

#[test]
fn test_repeated_keys_get_unique_ids() {
    let db = Collection::in_memory("db");
    db.put(Document::new("doc", Default::default())).unwrap();
    let tags = MapFunction::new("tags", |_, emit| {
        for key in ["k", "k", "j", "k"] {
            emit.emit_key(key);
        }
        Ok(())
    });
    let design = DesignDoc::new("t").with_view(ViewDefinition::new("tags", tags));
    let (report, store) = built_store(&db, design);
    assert_eq!(report.entries_for("t/tags"), 4);

    let entries = index_entries(store.as_ref());
    assert_eq!(entries.len(), 4);
    let keys: Vec<&Value> = entries.iter().map(|parts| &parts[0]).collect();
    assert_eq!(
        keys,
        vec![&Value::from("j"), &Value::from("k"), &Value::from("k"), &Value::from("k")]
    );
    // first "k" keeps the plain [key, id] form, the repeats carry their index
    let plain = entries.iter().filter(|parts| parts.len() == 2).count();
    assert_eq!(plain, 2);
    assert!(entries.iter().all(|parts| parts[1] == Value::from("doc")));

    let record = store.get("_local/doc_doc").unwrap().unwrap();
    let ids = record.get("keys").and_then(Value::as_array).unwrap();
    assert_eq!(ids.len(), 4);
}

#[test]
fn test_keys_follow_collation_across_types() {
    let db = Collection::in_memory("db");
    let keys = vec![
        value!({"a": 1}),
        value!("b"),
        value!([1, 2]),
        value!(10),
        value!(-2.5),
        value!(true),
        value!(false),
        Value::Null,
        value!("a"),
    ];
    for (i, key) in keys.iter().enumerate() {
        let mut body = viewbuild::Object::new();
        body.insert("k", key.clone());
        db.put(Document::new(format!("d{}", i), body)).unwrap();
    }
    let by_k = MapFunction::new("by_k", |doc, emit| {
        if let Some(k) = doc.get("k") {
            emit.emit_key(k.clone());
        }
        Ok(())
    });
    let design = DesignDoc::new("c").with_view(ViewDefinition::new("by_k", by_k));
    let (_, store) = built_store(&db, design);

    assert_eq!(
        index_keys(store.as_ref()),
        vec![
            Value::Null,
            value!(false),
            value!(true),
            value!(-2.5),
            value!(10),
            value!("a"),
            value!("b"),
            value!([1, 2]),
            value!({"a": 1}),
        ]
    );
}

#[test]
fn test_values_and_key_records() {
    let db = foo_bar_baz();
    db.put(Document::new("nameless", Default::default())).unwrap();
    let (report, store) = built_store(&db, idx_design(by_name_with_n()));
    assert_eq!(report.documents_scanned, 4);
    assert_eq!(report.entries_for("idx/by_name"), 3);

    let rows = store.all_docs(&AllDocsOptions::with_docs()).unwrap();
    let values: Vec<Option<&Value>> = rows
        .iter()
        .map(|row| row.doc.as_ref().and_then(|d| d.get("value")))
        .collect();
    // bar (d1), baz (d2), foo (d0)
    assert_eq!(
        values,
        vec![Some(&Value::from(1)), Some(&Value::from(2)), Some(&Value::from(0))]
    );

    // a document that emitted nothing still gets an empty key record
    let record = store.get("_local/doc_nameless").unwrap().unwrap();
    assert_eq!(record.get("keys").and_then(Value::as_array), Some(&[][..]));
}

#[test]
fn test_null_values_not_stored() {
    let db = foo_bar_baz();
    let nulls = MapFunction::new("nulls", |doc, emit| {
        emit.emit(doc.id.as_str(), Some(Value::Null));
        Ok(())
    });
    let design = DesignDoc::new("n").with_view(ViewDefinition::new("nulls", nulls));
    let (_, store) = built_store(&db, design);
    for row in store.all_docs(&AllDocsOptions::with_docs()).unwrap() {
        assert!(row.doc.unwrap().get("value").is_none());
    }
}

#[test]
fn test_checkpoint_is_latest_source_sequence() {
    let db = foo_bar_baz();
    let rev = db.put(Document::new("tmp", Default::default())).unwrap();
    db.remove("tmp", &rev).unwrap();
    let latest = db.info().unwrap().update_seq;

    let (report, store) = built_store(&db, idx_design(by_name()));
    // the design doc upsert itself advances the source sequence
    assert!(report.checkpoint.unwrap() > latest);
    assert_eq!(report.checkpoint, Some(db.info().unwrap().update_seq));

    let checkpoint = store.get(LAST_SEQ_ID).unwrap().unwrap();
    assert_eq!(
        checkpoint.get("seq").and_then(Value::as_number),
        report.checkpoint.map(|s| s as f64)
    );
    assert!(store.get("_local/doc_tmp").unwrap().is_none());
}

#[test]
fn test_design_and_local_documents_not_indexed() {
    let db = foo_bar_baz();
    let everything = MapFunction::new("everything", |doc, emit| {
        emit.emit_key(doc.id.as_str());
        Ok(())
    });
    let design = DesignDoc::new("all").with_view(ViewDefinition::new("ids", everything));
    let (report, store) = built_store(&db, design);
    assert_eq!(report.documents_scanned, 3);
    let ids: Vec<Value> = index_entries(store.as_ref())
        .into_iter()
        .map(|parts| parts[1].clone())
        .collect();
    assert_eq!(ids, vec![Value::from("d0"), Value::from("d1"), Value::from("d2")]);
}

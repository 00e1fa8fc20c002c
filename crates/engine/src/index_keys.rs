//! Index entries built from a document's emissions
//!
//! Each emission becomes an entry whose id is the indexable string of
//! `[key, doc_id]`. When the key collates equal to the previous emission's
//! key, or the id was already produced for this document, the emission index
//! is appended as a third element so ids stay unique per document without
//! moving the entry out of its key's position.
//!
//! Every indexed document also gets a `_local/doc_<id>` record listing the
//! ids written for it, even when it emitted nothing.

use std::cmp::Ordering;
use std::collections::HashSet;

use viewbuild_core::{collate, to_indexable_string, Document, Object, Value, LOCAL_PREFIX};

use crate::evaluator::Emission;

/// Local document holding an index store's checkpoint
pub const LAST_SEQ_ID: &str = "_local/lastSeq";

/// Id of the key record of `doc_id`
pub fn doc_key_record_id(doc_id: &str) -> String {
    format!("{}doc_{}", LOCAL_PREFIX, doc_id)
}

/// Index ids for a document's emissions, in emission order
pub fn indexable_keys(doc_id: &str, emissions: &[Emission]) -> Vec<String> {
    let mut keys = Vec::with_capacity(emissions.len());
    let mut seen = HashSet::with_capacity(emissions.len());
    let mut last_key: Option<&Value> = None;

    for (i, emission) in emissions.iter().enumerate() {
        let mut composite = vec![emission.key.clone(), Value::from(doc_id)];
        let repeats_previous =
            last_key.map_or(false, |prev| collate(&emission.key, prev) == Ordering::Equal);
        let mut key = to_indexable_string(&Value::Array(composite.clone()));
        if repeats_previous || seen.contains(&key) {
            composite.push(Value::from(i));
            key = to_indexable_string(&Value::Array(composite));
        }
        seen.insert(key.clone());
        keys.push(key);
        last_key = Some(&emission.key);
    }

    keys
}

/// All writes for one document of one view: its entries, then its key record
pub fn index_writes(doc_id: &str, emissions: &[Emission]) -> Vec<Document> {
    let keys = indexable_keys(doc_id, emissions);
    let mut writes = Vec::with_capacity(keys.len() + 1);

    for (key, emission) in keys.iter().zip(emissions) {
        let mut body = Object::new();
        if let Some(value) = &emission.value {
            body.insert("value", value.clone());
        }
        writes.push(Document::new(key.clone(), body));
    }

    let mut record = Object::new();
    record.insert(
        "keys",
        keys.into_iter().map(Value::from).collect::<Vec<Value>>(),
    );
    writes.push(Document::new(doc_key_record_id(doc_id), record));
    writes
}

/// Checkpoint document recording `seq`
pub fn checkpoint_doc(seq: u64) -> Document {
    let mut body = Object::new();
    body.insert("seq", Value::Number(seq as f64));
    Document::new(LAST_SEQ_ID, body)
}

/// Sequence recorded in a checkpoint document
pub fn checkpoint_seq(doc: &Document) -> Option<u64> {
    doc.get("seq")
        .and_then(Value::as_number)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64)
}

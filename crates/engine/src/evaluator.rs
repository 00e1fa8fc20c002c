//! Map evaluation
//!
//! A map function receives the document and an [`Emitter`] that collects
//! its emissions. The emitter is created per call, so evaluations never share
//! mutable state.

use thiserror::Error;
use viewbuild_core::{Document, Value};

use crate::view::MapFunction;

/// Error returned by a map function
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MapError(String);

impl MapError {
    /// Create a map error with a message
    pub fn new(message: impl Into<String>) -> Self {
        MapError(message.into())
    }

    /// Error message
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MapError {
    fn from(message: &str) -> Self {
        MapError::new(message)
    }
}

impl From<String> for MapError {
    fn from(message: String) -> Self {
        MapError(message)
    }
}

/// One key/value pair emitted for a document
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    /// Normalized emitted key
    pub key: Value,
    /// Normalized emitted value; `None` when absent or null
    pub value: Option<Value>,
    /// Id of the source document
    pub doc_id: String,
}

/// Collects the emissions of one map call
#[derive(Debug)]
pub struct Emitter {
    doc_id: String,
    emissions: Vec<Emission>,
}

impl Emitter {
    fn new(doc_id: &str) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            emissions: Vec::new(),
        }
    }

    /// Emit a key and an optional value.
    ///
    /// Both are normalized. A value that is absent or normalizes to null is
    /// not stored.
    pub fn emit(&mut self, key: impl Into<Value>, value: Option<Value>) {
        let value = value.map(Value::normalize).filter(|v| !v.is_null());
        self.emissions.push(Emission {
            key: key.into().normalize(),
            value,
            doc_id: self.doc_id.clone(),
        });
    }

    /// Emit a key with no value
    pub fn emit_key(&mut self, key: impl Into<Value>) {
        self.emit(key, None);
    }

    /// Number of emissions so far
    pub fn len(&self) -> usize {
        self.emissions.len()
    }

    /// True before the first emission
    pub fn is_empty(&self) -> bool {
        self.emissions.is_empty()
    }
}

/// Run `map` over `doc`, returning its emissions in emission order
pub fn evaluate(doc: &Document, map: &MapFunction) -> Result<Vec<Emission>, MapError> {
    let mut emitter = Emitter::new(&doc.id);
    map.call(doc, &mut emitter)?;
    Ok(emitter.emissions)
}

//! Document type shared by the store and the view pipeline
//!
//! A document is an id, an optional revision, a deletion flag and an object
//! body. Reserved id prefixes:
//! - `_design/` design documents holding view definitions
//! - `_local/` local documents: unversioned, never listed, never in changes

use crate::error::{Error, Result};
use crate::value::{Object, Value};
use serde::{Deserialize, Serialize};

/// Id prefix of design documents
pub const DESIGN_PREFIX: &str = "_design/";
/// Id prefix of local documents
pub const LOCAL_PREFIX: &str = "_local/";

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id
    pub id: String,
    /// Revision (`<generation>-<hash>`), None before the first write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Tombstone flag
    #[serde(default)]
    pub deleted: bool,
    /// Document body
    pub body: Object,
}

impl Document {
    /// Create a new document with the given id and body
    pub fn new(id: impl Into<String>, body: Object) -> Self {
        Self {
            id: id.into(),
            rev: None,
            deleted: false,
            body,
        }
    }

    /// Create a tombstone for `id`
    pub fn tombstone(id: impl Into<String>, rev: Option<String>) -> Self {
        Self {
            id: id.into(),
            rev,
            deleted: true,
            body: Object::new(),
        }
    }

    /// Build a document from JSON with `_id`, `_rev`, `_deleted` members.
    ///
    /// Reserved members are lifted out of the body; everything else stays in
    /// the body in its original order.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        let mut body = match Value::from(json) {
            Value::Object(obj) => obj,
            other => {
                return Err(Error::InvalidDocument(format!(
                    "expected an object, got {}",
                    other.type_name()
                )))
            }
        };
        let id = match body.remove("_id") {
            Some(Value::String(id)) => id,
            _ => return Err(Error::InvalidDocument("missing string _id".to_string())),
        };
        let rev = match body.remove("_rev") {
            Some(Value::String(rev)) => Some(rev),
            _ => None,
        };
        let deleted = matches!(body.remove("_deleted"), Some(Value::Bool(true)));
        Ok(Self {
            id,
            rev,
            deleted,
            body,
        })
    }

    /// Render as JSON with `_id` (and `_rev`, `_deleted` when set) first.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = Object::new();
        obj.insert("_id", self.id.clone());
        if let Some(rev) = &self.rev {
            obj.insert("_rev", rev.clone());
        }
        if self.deleted {
            obj.insert("_deleted", true);
        }
        for (k, v) in self.body.iter() {
            obj.insert(k, v.clone());
        }
        Value::Object(obj).into()
    }

    /// Get a body member
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// True for `_design/` documents
    pub fn is_design(&self) -> bool {
        self.id.starts_with(DESIGN_PREFIX)
    }

    /// True for `_local/` documents
    pub fn is_local(&self) -> bool {
        self.id.starts_with(LOCAL_PREFIX)
    }

    /// True for any id in the reserved `_` namespace
    pub fn is_internal(&self) -> bool {
        self.id.starts_with('_')
    }

    /// Revision generation number, 0 before the first write
    pub fn generation(&self) -> u64 {
        self.rev
            .as_deref()
            .and_then(|r| r.split_once('-'))
            .and_then(|(g, _)| g.parse().ok())
            .unwrap_or(0)
    }
}

//! DocumentStore trait and its request/response types
//!
//! A document store is a named collection of revisioned documents with:
//! - point reads and revision-checked writes
//! - a key-ordered listing (`all_docs`)
//! - a sequence-ordered change feed (`changes`)
//! - a catalog of dependent stores derived from it
//!
//! Ids starting with `_local/` address local documents. They are read and
//! written through `get`/`put` like any other document but never appear in
//! `all_docs` or `changes`.

use std::sync::Arc;

use viewbuild_core::Document;

use crate::error::StoreResult;

/// Options for [`DocumentStore::all_docs`]
#[derive(Debug, Clone, Default)]
pub struct AllDocsOptions {
    /// Inclusive lower bound on id
    pub start_key: Option<String>,
    /// Inclusive upper bound on id
    pub end_key: Option<String>,
    /// Attach document bodies to rows
    pub include_docs: bool,
    /// Fetch exactly these ids, in this order. Overrides the key range.
    pub keys: Option<Vec<String>>,
}

impl AllDocsOptions {
    /// List everything with bodies attached
    pub fn with_docs() -> Self {
        Self {
            include_docs: true,
            ..Default::default()
        }
    }

    /// Fetch the given ids with bodies attached
    pub fn for_keys(keys: Vec<String>) -> Self {
        Self {
            include_docs: true,
            keys: Some(keys),
            ..Default::default()
        }
    }

    /// Restrict to ids in `[start, end]`
    pub fn range(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_key = Some(start.into());
        self.end_key = Some(end.into());
        self
    }
}

/// Row produced by [`DocumentStore::all_docs`]
///
/// Rows fetched by explicit key may describe a missing or deleted document;
/// those carry an `error` or `deleted` marker instead of a body.
#[derive(Debug, Clone, PartialEq)]
pub struct AllDocsRow {
    /// Requested or listed id
    pub id: String,
    /// Current revision, when the document exists
    pub rev: Option<String>,
    /// Document, when requested and live
    pub doc: Option<Document>,
    /// Tombstone marker for deleted documents
    pub deleted: bool,
    /// Error marker (`not_found`) for unknown ids
    pub error: Option<String>,
}

impl AllDocsRow {
    /// True when the row is an error row or a tombstone
    pub fn is_unusable(&self) -> bool {
        self.error.is_some() || self.deleted
    }
}

/// Options for [`DocumentStore::changes`]
#[derive(Debug, Clone, Default)]
pub struct ChangesOptions {
    /// Only changes with a sequence strictly greater than this
    pub since: u64,
    /// Maximum number of results
    pub limit: Option<usize>,
    /// Newest first
    pub descending: bool,
}

impl ChangesOptions {
    /// The single most recent change
    pub fn latest() -> Self {
        Self {
            since: 0,
            limit: Some(1),
            descending: true,
        }
    }
}

/// One entry of the change feed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRow {
    /// Sequence number of the change
    pub seq: u64,
    /// Changed document id
    pub id: String,
    /// Revision produced by the change
    pub rev: String,
    /// Whether the change was a deletion
    pub deleted: bool,
}

/// Response of [`DocumentStore::changes`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Changes {
    /// Matching changes in the requested order
    pub results: Vec<ChangeRow>,
    /// Sequence of the last returned change, or `since` when none matched
    pub last_seq: u64,
}

/// Per-document outcome of [`DocumentStore::bulk_docs`]
#[derive(Debug, Clone, PartialEq)]
pub struct BulkResult {
    /// Document id
    pub id: String,
    /// New revision on success
    pub rev: Option<String>,
    /// Error marker (`conflict`) on failure
    pub error: Option<String>,
}

impl BulkResult {
    /// True when the write was applied
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A named, revisioned document collection.
///
/// Implementations are shared across threads: all methods take `&self`.
pub trait DocumentStore: Send + Sync {
    /// Collection name; dependent stores are named after it
    fn name(&self) -> &str;

    /// Read a document. Deleted and missing documents read as `None`.
    fn get(&self, id: &str) -> StoreResult<Option<Document>>;

    /// Write a document and return its new revision.
    ///
    /// `doc.rev` must equal the current revision (or be `None` when the id
    /// is new or deleted); otherwise the write fails with `Conflict`.
    fn put(&self, doc: Document) -> StoreResult<String>;

    /// Delete a document at revision `rev`
    fn remove(&self, id: &str, rev: &str) -> StoreResult<String>;

    /// Write many documents; conflicts are reported per document
    fn bulk_docs(&self, docs: Vec<Document>) -> StoreResult<Vec<BulkResult>>;

    /// List documents in id order, or fetch specific ids
    fn all_docs(&self, opts: &AllDocsOptions) -> StoreResult<Vec<AllDocsRow>>;

    /// Read the change feed
    fn changes(&self, opts: &ChangesOptions) -> StoreResult<Changes>;

    /// Open (creating if needed) the dependent store `name`
    fn register_dependent(&self, name: &str) -> StoreResult<Arc<dyn DocumentStore>>;

    /// Whether the dependent store `name` exists
    fn dependent_exists(&self, name: &str) -> StoreResult<bool>;

    /// Destroy the dependent store `name`. Missing stores are not an error.
    fn remove_dependent(&self, name: &str) -> StoreResult<()>;

    /// Names of existing dependent stores starting with `prefix`, sorted
    fn list_dependents(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Enable or disable background space reclamation
    fn set_auto_compaction(&self, enabled: bool);

    /// Release the store. Later calls fail with `Closed`.
    fn close(&self) -> StoreResult<()>;
}

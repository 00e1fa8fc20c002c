//! viewbuild - bulk rebuild of map/reduce view indexes
//!
//! viewbuild rebuilds the secondary indexes ("views") of a document
//! collection in one pass: every live document is read in chunks, each
//! view's map function is evaluated over it, and the emitted keys are bulk
//! written into a per-view index store named by a content signature of the
//! view's source. Stores whose view changed or disappeared are swept.
//!
//! # Quick Start
//!
//! ```ignore
//! use viewbuild::{Collection, DesignDoc, MapFunction, ViewBuilder, ViewDefinition};
//!
//! let db = Collection::in_memory("db");
//! let by_name = MapFunction::new("function (doc) { emit(doc.name) }", |doc, emit| {
//!     if let Some(name) = doc.get("name") {
//!         emit.emit_key(name.clone());
//!     }
//!     Ok(())
//! });
//! let design = DesignDoc::new("idx").with_view(ViewDefinition::new("by_name", by_name));
//! let report = ViewBuilder::new(&db).rebuild(vec![design])?;
//! ```
//!
//! # Architecture
//!
//! - `viewbuild-core`: values, collation and indexable string encoding
//! - `viewbuild-storage`: the document store contract and its collection
//!   implementation (in-memory or a crc-framed record log on disk)
//! - `viewbuild-engine`: signatures, store lifecycle, the rebuild pipeline
//!   and the orphan sweeper

pub use viewbuild_engine::*;

pub use viewbuild_core::{
    collate, escape_indexable_str, number_to_indexable_string, parse_indexable_string,
    to_indexable_string, unescape_indexable_str, value, Collated, CollationRank, Document, Error,
    Object, ParseError, Result, Value, DESIGN_PREFIX, LOCAL_PREFIX,
};
pub use viewbuild_storage::{
    AllDocsOptions, AllDocsRow, BulkResult, ChangeRow, Changes, ChangesOptions, Collection,
    CollectionInfo, DocumentStore, LogRecord, RecordLog, StoreError, StoreResult, LOG_FILE_NAME,
};

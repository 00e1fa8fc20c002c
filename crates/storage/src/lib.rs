//! Storage layer for viewbuild
//!
//! This crate implements the document stores the view builder reads from
//! and writes index stores into:
//! - DocumentStore: the store contract (point reads, revisioned writes,
//!   id-ordered listing, change feed, dependent-store catalog)
//! - Collection: BTreeMap-based implementation with RwLock, in memory or
//!   backed by a directory on disk
//! - RecordLog: crc32-framed MessagePack record log used by disk collections

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collection;
pub mod error;
pub mod record_log;
pub mod store;

pub use collection::{Collection, CollectionInfo};
pub use error::{StoreError, StoreResult};
pub use record_log::{LogRecord, RecordLog, LOG_FILE_NAME};
pub use store::{
    AllDocsOptions, AllDocsRow, BulkResult, ChangeRow, Changes, ChangesOptions, DocumentStore,
};

//! View rebuild engine for viewbuild
//!
//! This crate rebuilds secondary indexes ("views") over a document store:
//! - Signature: content hash of a view's source text, naming its index store
//! - View definitions: design documents, injected map functions, resolvers
//! - Evaluator: runs a map function over one document
//! - Index keys: unique indexable ids per emission, per-document key records
//! - Lifecycle: create, reuse or re-create index stores by signature
//! - Pipeline: chunked scan, evaluation and parallel per-view bulk writes
//! - Sweeper: removes index stores no declared view resolves to
//! - ViewBuilder: the entry points tying these together

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod index_keys;
pub mod lifecycle;
pub mod pipeline;
pub mod signature;
pub mod sweeper;
pub mod view;

pub use builder::{ViewBuilder, DEPENDENT_VIEWS_ID};
pub use config::{BuildConfig, MapErrorPolicy, CONFIG_FILE_NAME};
pub use error::{BuildError, BuildPhase, BuildResult};
pub use evaluator::{evaluate, Emission, Emitter, MapError};
pub use index_keys::{doc_key_record_id, index_writes, indexable_keys, LAST_SEQ_ID};
pub use lifecycle::{Resolution, StoreLifecycle};
pub use pipeline::{CancelToken, PendingView, RebuildPipeline, RebuildReport, ViewFailure};
pub use signature::{store_name, store_prefix, view_signature, Signature, STORE_INFIX};
pub use sweeper::sweep_orphans;
pub use view::{
    DesignDoc, MapFunction, MapRegistry, MapResolver, StoredDesignDoc, StoredView, ViewDefinition,
};

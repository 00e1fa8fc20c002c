//! Error types for view rebuilds
//!
//! Every error names the phase of the run it failed in. Setup and resolve
//! errors abort before any document is processed; evaluate and write errors
//! abort the rest of the run without rolling back chunks already written.

use std::fmt;

use thiserror::Error;
use viewbuild_storage::StoreError;

/// Result type alias for build operations
pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Phase of a rebuild run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    /// Reading, dropping and upserting design documents
    Setup,
    /// Resolving index stores by signature
    Resolve,
    /// Reading source documents and running map functions
    Evaluate,
    /// Bulk-writing index entries
    Write,
    /// Recording `_local/lastSeq`
    Checkpoint,
    /// Removing orphaned index stores
    Sweep,
}

impl BuildPhase {
    /// Lowercase phase name
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPhase::Setup => "setup",
            BuildPhase::Resolve => "resolve",
            BuildPhase::Evaluate => "evaluate",
            BuildPhase::Write => "write",
            BuildPhase::Checkpoint => "checkpoint",
            BuildPhase::Sweep => "sweep",
        }
    }
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by [`ViewBuilder`](crate::ViewBuilder) runs
#[derive(Debug, Error)]
pub enum BuildError {
    /// A design document (or the `_local/mrviews` record) failed to write
    #[error("[setup] failed to upsert '{id}': {source}")]
    DefinitionUpsert {
        /// Document id being written
        id: String,
        /// Underlying store error
        #[source]
        source: StoreError,
    },

    /// A map function failed on a document
    #[error("[evaluate] map function of view '{view}' failed on document '{doc_id}': {message}")]
    MapEvaluation {
        /// Fully-qualified view name (`design/view`)
        view: String,
        /// Document being evaluated
        doc_id: String,
        /// Error reported by the map function
        message: String,
    },

    /// No callable is registered for a stored map source
    #[error("[setup] no map function registered for view '{view}'")]
    UnresolvedMap {
        /// Fully-qualified view name (`design/view`)
        view: String,
    },

    /// A stored design document does not have the expected shape
    #[error("[setup] invalid design document '{id}': {reason}")]
    InvalidDesignDoc {
        /// Design document id
        id: String,
        /// What is wrong with it
        reason: String,
    },

    /// Store operation failed
    #[error("[{phase}] store error: {source}")]
    StoreIo {
        /// Phase the operation belonged to
        phase: BuildPhase,
        /// Underlying store error
        #[source]
        source: StoreError,
    },

    /// Build configuration rejected
    #[error("[setup] invalid configuration: {0}")]
    InvalidConfig(String),

    /// Run stopped through its cancel token
    #[error("[evaluate] rebuild cancelled")]
    Cancelled,
}

impl BuildError {
    /// Wrap a store error with the phase it occurred in
    pub fn store(phase: BuildPhase, source: StoreError) -> Self {
        BuildError::StoreIo { phase, source }
    }

    /// Phase the error belongs to
    pub fn phase(&self) -> BuildPhase {
        match self {
            BuildError::DefinitionUpsert { .. }
            | BuildError::UnresolvedMap { .. }
            | BuildError::InvalidDesignDoc { .. }
            | BuildError::InvalidConfig(_) => BuildPhase::Setup,
            BuildError::MapEvaluation { .. } | BuildError::Cancelled => BuildPhase::Evaluate,
            BuildError::StoreIo { phase, .. } => *phase,
        }
    }

    /// True for cancelled runs
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildError::Cancelled)
    }
}

//! Error types for document stores

use std::io;
use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a [`DocumentStore`](crate::DocumentStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error from the disk backing
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Write carried a revision that does not match the current one
    #[error("Document update conflict: {id}")]
    Conflict {
        /// Conflicting document id
        id: String,
    },

    /// Document does not exist (or is deleted)
    #[error("Document not found: {id}")]
    NotFound {
        /// Missing document id
        id: String,
    },

    /// Stored data failed validation
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation on a closed store
    #[error("Store is closed: {0}")]
    Closed(String),

    /// Dependent store name is empty or escapes the catalog
    #[error("Invalid store name: {0}")]
    InvalidName(String),
}

impl StoreError {
    /// True for revision conflicts
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// True when the document was missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

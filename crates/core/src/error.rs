//! Error types for viewbuild-core
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the core value layer
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed indexable string
    #[error("Indexable string parse error: {0}")]
    Parse(#[from] ParseError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Document is missing required structure
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Decoding failures for indexable strings
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input ended in the middle of a component
    #[error("unexpected end of input")]
    UnexpectedEnd,

    /// Leading character is not a collation rank digit
    #[error("bad rank digit {found:?} at byte {at}")]
    BadRank {
        /// Byte offset of the component
        at: usize,
        /// Character found
        found: char,
    },

    /// Component is not closed by NUL
    #[error("missing terminator near byte {0}")]
    MissingTerminator(usize),

    /// Boolean payload is not `0` or `1`
    #[error("bad boolean payload at byte {0}")]
    BadBool(usize),

    /// Number payload does not follow the numeric encoding
    #[error("bad number payload {0:?}")]
    BadNumber(String),

    /// String payload contains an invalid escape sequence
    #[error("bad escape sequence")]
    BadEscape,

    /// Object member key is not a string
    #[error("object key at byte {0} is not a string")]
    NonStringKey(usize),

    /// Extra data after a complete value
    #[error("trailing input at byte {0}")]
    TrailingInput(usize),
}

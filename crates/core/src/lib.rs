//! Core types for viewbuild
//!
//! This crate defines the foundational types used throughout the system:
//! - Value / Object: the dynamic value model emitted by map functions
//! - Collation: total order over values (`collate`, `CollationRank`)
//! - Indexable strings: encoding whose lexicographic order matches collation
//! - Document: stored document with reserved `_design/` and `_local/` ids
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collate;
pub mod document;
pub mod error;
pub mod indexable;
pub mod value;

pub use collate::{collate, Collated, CollationRank};
pub use document::{Document, DESIGN_PREFIX, LOCAL_PREFIX};
pub use error::{Error, ParseError, Result};
pub use indexable::{
    escape_indexable_str, number_to_indexable_string, parse_indexable_string,
    to_indexable_string, unescape_indexable_str,
};
pub use value::{Object, Value};

#[doc(hidden)]
pub use serde_json as __serde_json;

//! View signatures and index store names
//!
//! A signature identifies a view by the text of its functions, not their
//! behavior: `XXH3-128(map + (reduce or "undefined") + "undefined")`, as 32
//! lowercase hex characters. Textually different but equivalent functions get
//! different signatures. Two different sources hashing to the same value
//! would share a store; that risk is accepted.

use std::fmt;

use xxhash_rust::xxh3::xxh3_128;

/// Literal used in place of a missing function
const MISSING_FUNCTION: &str = "undefined";

/// Infix between the collection name and the signature in store names
pub const STORE_INFIX: &str = "-mrview-";

/// Content hash of a view definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(String);

impl Signature {
    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the signature of a view from its map and reduce source text
pub fn view_signature(map_source: &str, reduce_source: Option<&str>) -> Signature {
    let mut text = String::with_capacity(map_source.len() + 32);
    text.push_str(map_source);
    text.push_str(reduce_source.unwrap_or(MISSING_FUNCTION));
    text.push_str(MISSING_FUNCTION);
    Signature(format!("{:032x}", xxh3_128(text.as_bytes())))
}

/// Prefix shared by every index store of `collection`
pub fn store_prefix(collection: &str) -> String {
    format!("{}{}", collection, STORE_INFIX)
}

/// Name of the index store holding the view with `signature`
pub fn store_name(collection: &str, signature: &Signature) -> String {
    format!("{}{}", store_prefix(collection), signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: &str = "function (doc) { emit(doc.name) }";

    #[test]
    fn test_signature_shape() {
        let sig = view_signature(MAP, None);
        assert_eq!(sig.as_str().len(), 32);
        assert!(sig
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(sig.to_string(), sig.as_str());
    }

    #[test]
    fn test_signature_is_stable() {
        assert_eq!(view_signature(MAP, None), view_signature(MAP, None));
    }

    #[test]
    fn test_missing_reduce_hashes_as_undefined() {
        assert_eq!(
            view_signature(MAP, None),
            view_signature(MAP, Some("undefined"))
        );
        assert_ne!(view_signature(MAP, None), view_signature(MAP, Some("_count")));
    }

    #[test]
    fn test_source_change_changes_signature() {
        let other = "function (doc) { emit(doc.name, 1) }";
        assert_ne!(view_signature(MAP, None), view_signature(other, None));
        // whitespace counts: the signature is over text, not behavior
        let spaced = "function (doc) {  emit(doc.name) }";
        assert_ne!(view_signature(MAP, None), view_signature(spaced, None));
    }

    #[test]
    fn test_store_name() {
        let sig = view_signature(MAP, None);
        let name = store_name("db", &sig);
        assert_eq!(name, format!("db-mrview-{}", sig));
        assert!(name.starts_with(&store_prefix("db")));
    }
}

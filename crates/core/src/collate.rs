//! View key collation
//!
//! Total order over [`Value`]:
//!
//! ```text
//! null < bool < number < string < array < object
//! ```
//!
//! Values of the same kind compare by content:
//! - numbers numerically (`-0 == 0`)
//! - `false < true`
//! - strings by Unicode code point (no locale tailoring)
//! - arrays element by element, then shorter first
//! - objects member by member in insertion order (key, then value), then
//!   fewer members first
//!
//! Non-finite numbers are treated as `null` before comparing.

use crate::value::{Object, Value};
use std::cmp::Ordering;

/// Type rank used as the primary collation criterion.
///
/// The numeric value is also the leading digit of an indexable string, so
/// the discriminants must stay fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum CollationRank {
    /// `null` (and non-finite numbers)
    Null = 1,
    /// `true` / `false`
    Bool = 2,
    /// finite numbers
    Number = 3,
    /// strings
    String = 4,
    /// arrays
    Array = 5,
    /// objects
    Object = 6,
}

impl CollationRank {
    /// Rank of a value after normalization
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => CollationRank::Null,
            Value::Number(n) if !n.is_finite() => CollationRank::Null,
            Value::Bool(_) => CollationRank::Bool,
            Value::Number(_) => CollationRank::Number,
            Value::String(_) => CollationRank::String,
            Value::Array(_) => CollationRank::Array,
            Value::Object(_) => CollationRank::Object,
        }
    }

    /// Leading character of the indexable encoding
    pub fn digit(self) -> char {
        char::from(b'0' + self as u8)
    }

    /// Inverse of [`CollationRank::digit`]
    pub fn from_digit(c: char) -> Option<Self> {
        match c {
            '1' => Some(CollationRank::Null),
            '2' => Some(CollationRank::Bool),
            '3' => Some(CollationRank::Number),
            '4' => Some(CollationRank::String),
            '5' => Some(CollationRank::Array),
            '6' => Some(CollationRank::Object),
            _ => None,
        }
    }
}

/// Compare two values under view collation.
pub fn collate(a: &Value, b: &Value) -> Ordering {
    let rank = CollationRank::of(a).cmp(&CollationRank::of(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) if !a.is_non_finite_number() => {
            // both finite here: equal ranks exclude a NaN/finite mix
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => collate_arrays(x, y),
        (Value::Object(x), Value::Object(y)) => collate_objects(x, y),
        // null rank
        _ => Ordering::Equal,
    }
}

fn collate_arrays(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = collate(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

fn collate_objects(a: &Object, b: &Object) -> Ordering {
    for ((ak, av), (bk, bv)) in a.iter().zip(b.iter()) {
        let ord = ak.cmp(bk);
        if ord != Ordering::Equal {
            return ord;
        }
        let ord = collate(av, bv);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// `Ord` wrapper so values can key ordered collections by collation.
#[derive(Debug, Clone)]
pub struct Collated(pub Value);

impl PartialEq for Collated {
    fn eq(&self, other: &Self) -> bool {
        collate(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for Collated {}

impl PartialOrd for Collated {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Collated {
    fn cmp(&self, other: &Self) -> Ordering {
        collate(&self.0, &other.0)
    }
}

//! Indexable string encoding
//!
//! Converts a [`Value`] into a string whose plain lexicographic order matches
//! [`collate`](crate::collate::collate) order exactly. Index stores use these
//! strings as record ids, so a range scan over ids is a range scan in
//! collation order.
//!
//! # Format
//!
//! ```text
//! indexable(v) = rank digit ('1'..='6') + payload(v) + '\0'
//!
//! payload(null)    = ""
//! payload(bool)    = "0" | "1"
//! payload(number)  = see below
//! payload(string)  = escaped string
//! payload(array)   = indexable(e0) + indexable(e1) + ...
//! payload(object)  = indexable(k0) + indexable(v0) + indexable(k1) + ...
//! ```
//!
//! Strings escape the three lowest code points so that the terminating NUL of
//! a component always sorts before any string content:
//!
//! ```text
//! \u0000 -> \u0001 \u0001
//! \u0001 -> \u0001 \u0002
//! \u0002 -> \u0002 \u0002
//! ```
//!
//! Numbers encode as `sign + exponent + mantissa`:
//! - zero is the single digit `1`
//! - sign is `0` for negatives, `2` for positives
//! - the decimal exponent is shifted by [`MIN_MAGNITUDE`] (and negated first
//!   for negatives) and printed with [`MAGNITUDE_DIGITS`] digits
//! - the mantissa `m` (`1 <= m < 10`) is printed as the shortest digits that
//!   round-trip the f64, trailing zeros stripped; negatives print the exact
//!   decimal `10 - m` instead, so larger magnitudes sort first

use crate::collate::CollationRank;
use crate::error::ParseError;
use crate::value::{Object, Value};

/// Smallest decimal exponent of a positive f64 (`5e-324`)
pub const MIN_MAGNITUDE: i32 = -324;
/// Width of the shifted exponent field
pub const MAGNITUDE_DIGITS: usize = 3;

const TERMINATOR: char = '\u{0}';
const MANTISSA_DIGITS: usize = 20;

/// Encode a value into its indexable string.
pub fn to_indexable_string(value: &Value) -> String {
    let mut out = String::new();
    write_indexable(value, &mut out);
    out
}

fn write_indexable(value: &Value, out: &mut String) {
    out.push(CollationRank::of(value).digit());
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push(if *b { '1' } else { '0' }),
        Value::Number(n) if n.is_finite() => out.push_str(&number_to_indexable_string(*n)),
        Value::Number(_) => {}
        Value::String(s) => escape_into(s, out),
        Value::Array(items) => {
            for item in items {
                write_indexable(item, out);
            }
        }
        Value::Object(obj) => {
            for (k, v) in obj.iter() {
                out.push(CollationRank::String.digit());
                escape_into(k, out);
                out.push(TERMINATOR);
                write_indexable(v, out);
            }
        }
    }
    out.push(TERMINATOR);
}

fn escape_into(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '\u{0}' => out.push_str("\u{1}\u{1}"),
            '\u{1}' => out.push_str("\u{1}\u{2}"),
            '\u{2}' => out.push_str("\u{2}\u{2}"),
            other => out.push(other),
        }
    }
}

/// Escape a string the way [`to_indexable_string`] does, without rank digit
/// or terminator.
pub fn escape_indexable_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_into(s, &mut out);
    out
}

/// Reverse of [`escape_indexable_str`].
pub fn unescape_indexable_str(s: &str) -> Result<String, ParseError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\u{1}' => match chars.next() {
                Some('\u{1}') => out.push('\u{0}'),
                Some('\u{2}') => out.push('\u{1}'),
                _ => return Err(ParseError::BadEscape),
            },
            '\u{2}' => match chars.next() {
                Some('\u{2}') => out.push('\u{2}'),
                _ => return Err(ParseError::BadEscape),
            },
            '\u{0}' => return Err(ParseError::BadEscape),
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Encode a finite number so that string order matches numeric order.
///
/// `-0.0` encodes like `0.0`. Non-finite input is a caller error; it encodes
/// as zero.
pub fn number_to_indexable_string(n: f64) -> String {
    if n == 0.0 || !n.is_finite() {
        return "1".to_string();
    }

    // Shortest round-trip exponential form, e.g. "-1.25e-7"
    let exp_form = format!("{:e}", n);
    let (mantissa, exponent) = exp_form.split_once('e').unwrap_or((exp_form.as_str(), "0"));
    let magnitude: i32 = exponent.parse().unwrap_or(0);
    let mantissa = mantissa.trim_start_matches('-');

    let neg = n < 0.0;
    let mut result = String::with_capacity(MAGNITUDE_DIGITS + MANTISSA_DIGITS + 4);
    result.push(if neg { '0' } else { '2' });

    let shifted = (if neg { -magnitude } else { magnitude }) - MIN_MAGNITUDE;
    result.push_str(&format!("{:0width$}", shifted, width = MAGNITUDE_DIGITS));

    if neg {
        // 10 - m in decimal: f64 subtraction would merge neighbouring mantissas
        match complement_from_ten(mantissa) {
            Some(factor) => result.push_str(&factor),
            None => result.push('9'),
        }
    } else {
        // exact shortest digits: reprinting through f64 at fixed width
        // would merge neighbouring mantissas
        result.push_str(strip_fraction_zeros(mantissa));
    }
    result
}

fn strip_fraction_zeros(fixed: &str) -> &str {
    if !fixed.contains('.') {
        return fixed;
    }
    fixed.trim_end_matches('0').trim_end_matches('.')
}

/// Exact decimal `10 - m` for a mantissa `0 < m < 10` written as `d` or
/// `d.ddd`. Self-inverse, so the decoder uses it too.
fn complement_from_ten(m: &str) -> Option<String> {
    let (int_part, frac_part) = m.split_once('.').unwrap_or((m, ""));
    if int_part.len() != 1 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let int_digit = int_part.bytes().next().filter(u8::is_ascii_digit)? - b'0';
    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        return match int_digit {
            0 => None,
            d => Some((10 - d).to_string()),
        };
    }
    if frac.len() > MANTISSA_DIGITS {
        return None;
    }

    // 1 - 0.f: nines' complement plus one ulp; the last digit of f is
    // non-zero so the increment never carries
    let mut digits: Vec<u8> = frac.bytes().map(|b| 9 - (b - b'0')).collect();
    *digits.last_mut()? += 1;

    let mut out = String::with_capacity(2 + digits.len());
    out.push(char::from(b'0' + (9 - int_digit)));
    out.push('.');
    out.extend(digits.iter().map(|d| char::from(b'0' + d)));
    Some(out)
}

/// Decode a number produced by [`number_to_indexable_string`].
pub fn number_from_indexable_string(s: &str) -> Result<f64, ParseError> {
    if s == "1" {
        return Ok(0.0);
    }
    let bad = || ParseError::BadNumber(s.to_string());
    let neg = match s.chars().next() {
        Some('0') => true,
        Some('2') => false,
        _ => return Err(bad()),
    };
    let shifted: i32 = s
        .get(1..1 + MAGNITUDE_DIGITS)
        .and_then(|d| d.parse().ok())
        .ok_or_else(bad)?;
    let factor = s.get(1 + MAGNITUDE_DIGITS..).ok_or_else(bad)?;

    let magnitude = shifted + MIN_MAGNITUDE;
    if neg {
        let mantissa = complement_from_ten(factor).ok_or_else(bad)?;
        let value: f64 = format!("{}e{}", mantissa, -magnitude)
            .parse()
            .map_err(|_| bad())?;
        Ok(-value)
    } else {
        format!("{}e{}", factor, magnitude)
            .parse()
            .map_err(|_| bad())
    }
}

/// Decode a full indexable string back into a value.
///
/// Numbers are stored as their shortest round-trip digits, so they decode
/// to exactly the encoded f64.
pub fn parse_indexable_string(s: &str) -> Result<Value, ParseError> {
    let mut parser = Parser { input: s, pos: 0 };
    let value = parser.value()?;
    if parser.pos != s.len() {
        return Err(ParseError::TrailingInput(parser.pos));
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn expect_terminator(&mut self) -> Result<(), ParseError> {
        match self.next() {
            Some(TERMINATOR) => Ok(()),
            _ => Err(ParseError::MissingTerminator(self.pos)),
        }
    }

    // Raw text up to (not including) the next NUL; consumes the NUL
    fn until_terminator(&mut self) -> Result<&'a str, ParseError> {
        let rest = &self.input[self.pos..];
        let end = rest
            .find(TERMINATOR)
            .ok_or(ParseError::MissingTerminator(self.input.len()))?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    fn value(&mut self) -> Result<Value, ParseError> {
        let at = self.pos;
        let digit = self.next().ok_or(ParseError::UnexpectedEnd)?;
        let rank = CollationRank::from_digit(digit).ok_or(ParseError::BadRank { at, found: digit })?;
        match rank {
            CollationRank::Null => {
                self.expect_terminator()?;
                Ok(Value::Null)
            }
            CollationRank::Bool => {
                let b = match self.next() {
                    Some('0') => false,
                    Some('1') => true,
                    _ => return Err(ParseError::BadBool(at)),
                };
                self.expect_terminator()?;
                Ok(Value::Bool(b))
            }
            CollationRank::Number => {
                let raw = self.until_terminator()?;
                Ok(Value::Number(number_from_indexable_string(raw)?))
            }
            CollationRank::String => {
                let raw = self.until_terminator()?;
                Ok(Value::String(unescape_indexable_str(raw)?))
            }
            CollationRank::Array => {
                let mut items = Vec::new();
                while self.peek().ok_or(ParseError::UnexpectedEnd)? != TERMINATOR {
                    items.push(self.value()?);
                }
                self.expect_terminator()?;
                Ok(Value::Array(items))
            }
            CollationRank::Object => {
                let mut obj = Object::new();
                while self.peek().ok_or(ParseError::UnexpectedEnd)? != TERMINATOR {
                    let key_at = self.pos;
                    let key = match self.value()? {
                        Value::String(k) => k,
                        _ => return Err(ParseError::NonStringKey(key_at)),
                    };
                    let value = self.value()?;
                    obj.insert(key, value);
                }
                self.expect_terminator()?;
                Ok(Value::Object(obj))
            }
        }
    }
}

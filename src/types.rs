//! Identity tokens shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of a frame in the scheduler's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub(crate) u32);

impl FrameId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a unit of work (future) within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FutureId(pub(crate) u64);

impl FutureId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

const SYMBOLS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Width of the digit part: enough base-62 digits to hold any i64.
const ORDINAL_DIGITS: usize = 11;

/// Encode an ordinal as a fixed-width string whose lexical order matches numeric order.
///
/// Non-negative values start with `f`, negative values with `e` so that they sort first.
pub fn ordinal_name(id: i64) -> String {
    let (prefix, mut rest) = if id < 0 {
        ('e', (i64::MAX as u64).wrapping_add(id as u64).wrapping_add(1))
    } else {
        ('f', id as u64)
    };
    let mut digits = [b'0'; ORDINAL_DIGITS];
    for slot in digits.iter_mut().rev() {
        *slot = SYMBOLS[(rest % 62) as usize];
        rest /= 62;
    }
    let mut out = String::with_capacity(ORDINAL_DIGITS + 1);
    out.push(prefix);
    out.extend(digits.iter().map(|&b| b as char));
    out
}

/// Check that `name` is a well-formed attribute name.
///
/// The first character must be a lowercase (or caseless) letter; the rest may be
/// letters, digits or `_`.
pub fn verify_symbol(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return Err("An attribute name cannot be empty.".to_string()),
    };
    if !(first.is_lowercase() || (first.is_alphabetic() && !first.is_uppercase())) {
        return Err(format!(
            "The name “{}” is unbecoming of an attribute; it cannot start with “{}”.",
            name, first
        ));
    }
    for c in chars {
        if c == '_' || c.is_alphanumeric() {
            continue;
        }
        return Err(format!(
            "The name “{}” is unbecoming of an attribute; it cannot contain “{}”.",
            name, c
        ));
    }
    Ok(())
}

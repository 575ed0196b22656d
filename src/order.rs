//! Byte Order
//!
//! Comparison policy over byte ranges, shared by every sorted structure.
//!
//! ## Rotation
//! An order may carry a "zero" point. Keys at or above the zero point sort
//! first (in natural order), followed by the keys below it:
//!
//! ```text
//!   natural:   00 .. 3f | 40 .. ff
//!   zero=40:   40 .. ff | 00 .. 3f
//! ```
//!
//! Two structures may only be merged when their orders are identical
//! (same direction, same zero point); see [`ByteOrder::same_order`].

use std::cmp::Ordering;

/// Natural (unsigned lexicographic) order over byte strings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByteOrder {
    ascending: bool,
    zero: Option<Vec<u8>>,
}

impl ByteOrder {
    /// Natural order without rotation
    pub fn natural(ascending: bool) -> Self {
        Self {
            ascending,
            zero: None,
        }
    }

    /// Natural order rotated to start at `zero`
    pub fn with_zero(ascending: bool, zero: impl Into<Vec<u8>>) -> Self {
        Self {
            ascending,
            zero: Some(zero.into()),
        }
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }

    pub fn zero(&self) -> Option<&[u8]> {
        self.zero.as_deref()
    }

    /// The same order, walked in the opposite direction
    pub fn reversed(&self) -> Self {
        Self {
            ascending: !self.ascending,
            zero: self.zero.clone(),
        }
    }

    /// True if both orders sort every pair of keys identically
    pub fn same_order(&self, other: &ByteOrder) -> bool {
        self == other
    }

    /// Compare two byte ranges under this order
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let ord = match &self.zero {
            None => natural(a, b),
            Some(z) => {
                let a_high = natural(a, z) != Ordering::Less;
                let b_high = natural(b, z) != Ordering::Less;
                match (a_high, b_high) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => natural(a, b),
                }
            }
        };
        if self.ascending {
            ord
        } else {
            ord.reverse()
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::natural(true)
    }
}

/// Unsigned byte-wise comparison; a proper prefix sorts first
#[inline]
fn natural(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

// =============================================================================
// Fixed-width big-endian integers
// =============================================================================

/// Encode `value` as a `width`-byte big-endian base-256 number
pub fn encode_long(value: u64, width: usize) -> Vec<u8> {
    let mut buf = vec![0u8; width];
    encode_long_into(&mut buf, value);
    buf
}

/// Encode `value` into `buf`, using all of its bytes
pub fn encode_long_into(buf: &mut [u8], value: u64) {
    debug_assert!(buf.len() <= 8, "numeric width {} exceeds 8", buf.len());
    debug_assert!(
        buf.len() == 8 || value >> (buf.len() * 8) == 0,
        "value {} does not fit in {} bytes",
        value,
        buf.len()
    );
    let mut v = value;
    for b in buf.iter_mut().rev() {
        *b = (v & 0xff) as u8;
        v >>= 8;
    }
}

/// Decode a big-endian base-256 number of up to 8 bytes
pub fn decode_long(bytes: &[u8]) -> u64 {
    debug_assert!(bytes.len() <= 8, "numeric width {} exceeds 8", bytes.len());
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

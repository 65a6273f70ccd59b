//! Time-sortable object identifiers.

use crate::error::{CodecError, CodecResult};
use crate::time::DateTime;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Bits kept of the millisecond timestamp (enough until the year 36812).
const MILLIS_MASK: u64 = (1 << 40) - 1;
/// Bits kept of the per-process counter.
const COUNTER_MASK: u32 = (1 << 24) - 1;

static COUNTER: AtomicU32 = AtomicU32::new(0);
static LAST_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a stored object.
///
/// An `ObjectId` packs a 40-bit millisecond timestamp, a 24-bit monotonic
/// per-process counter, and a 32-bit random generator tag. Identifiers
/// generated in causal order compare in that order, and collisions across
/// processes are astronomically unlikely.
///
/// The canonical encoded form is 24 lowercase hex characters
/// (10 timestamp + 6 counter + 8 tag). Because every component is
/// fixed-width, the encoded form sorts byte-wise exactly as the identifiers
/// sort, which lets key layouts embed it directly.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId {
    /// Milliseconds since the Unix epoch, truncated to 40 bits.
    millis: u64,
    /// Monotonic counter, truncated to 24 bits.
    counter: u32,
    /// Random generator tag distinguishing concurrent producers.
    random: u32,
}

impl ObjectId {
    /// Length of the canonical encoded form in bytes.
    pub const ENCODED_LEN: usize = 24;

    /// Generates a fresh identifier.
    ///
    /// The timestamp component never goes backwards within a process even
    /// if the system clock does; the counter increments on every call.
    #[must_use]
    pub fn new() -> Self {
        let now = DateTime::now().as_millis() & MILLIS_MASK;
        let prev = LAST_MILLIS.fetch_max(now, Ordering::SeqCst);
        let millis = now.max(prev);
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst) & COUNTER_MASK;
        Self {
            millis,
            counter,
            random: rand::random::<u32>(),
        }
    }

    /// Creates an identifier from its components.
    ///
    /// Components wider than their fields are truncated (40 bits of
    /// `millis`, 24 bits of `counter`).
    #[must_use]
    pub const fn from_parts(millis: u64, counter: u32, random: u32) -> Self {
        Self {
            millis: millis & MILLIS_MASK,
            counter: counter & COUNTER_MASK,
            random,
        }
    }

    /// The creation instant recorded in this identifier.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime {
        DateTime::from_millis(self.millis)
    }

    /// The monotonic counter component.
    #[must_use]
    pub const fn counter(&self) -> u32 {
        self.counter
    }

    /// The random generator-tag component.
    #[must_use]
    pub const fn random(&self) -> u32 {
        self.random
    }

    /// Returns the canonical 24-byte lowercase-hex form.
    #[must_use]
    pub fn encoded(&self) -> [u8; Self::ENCODED_LEN] {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let packed = self.packed();
        let mut out = [0u8; Self::ENCODED_LEN];
        for (i, byte) in out.iter_mut().enumerate() {
            let shift = 4 * (Self::ENCODED_LEN - 1 - i);
            *byte = HEX[((packed >> shift) & 0xF) as usize];
        }
        out
    }

    /// Parses the canonical encoded form.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidObjectId`] if the input is not exactly
    /// 24 hex characters.
    pub fn from_encoded(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(CodecError::InvalidObjectId);
        }
        let mut packed: u128 = 0;
        for &b in bytes {
            let digit = (b as char)
                .to_digit(16)
                .ok_or(CodecError::InvalidObjectId)?;
            packed = (packed << 4) | u128::from(digit);
        }
        Ok(Self::unpack(packed))
    }

    /// Packs the three components into 96 bits.
    const fn packed(&self) -> u128 {
        ((self.millis as u128) << 56)
            | ((self.counter as u128) << 32)
            | (self.random as u128)
    }

    const fn unpack(packed: u128) -> Self {
        Self {
            millis: ((packed >> 56) as u64) & MILLIS_MASK,
            counter: ((packed >> 32) as u32) & COUNTER_MASK,
            random: packed as u32,
        }
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:010x}{:06x}{:08x}",
            self.millis, self.counter, self.random
        )
    }
}

impl FromStr for ObjectId {
    type Err = CodecError;

    fn from_str(s: &str) -> CodecResult<Self> {
        Self::from_encoded(s.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_unique() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn causal_order() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert!(a < b);
    }

    #[test]
    fn encoded_form_is_fixed_width_hex() {
        let id = ObjectId::new();
        let encoded = id.encoded();
        assert_eq!(encoded.len(), ObjectId::ENCODED_LEN);
        assert!(encoded
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b)));
    }

    #[test]
    fn encoded_matches_display() {
        let id = ObjectId::from_parts(0x12_3456_789A, 0xBCDE, 0xF012_3456);
        assert_eq!(id.to_string().as_bytes(), &id.encoded());
        assert_eq!(id.to_string(), "123456789a00bcdef0123456");
    }

    #[test]
    fn encoded_roundtrip() {
        let id = ObjectId::new();
        let parsed = ObjectId::from_encoded(&id.encoded()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(ObjectId::from_encoded(b"short").is_err());
        assert!(ObjectId::from_encoded(&[b'z'; 24]).is_err());
        assert!("not-an-id".parse::<ObjectId>().is_err());
    }

    #[test]
    fn parse_accepts_uppercase() {
        let id = ObjectId::from_parts(0xABCDEF, 7, 0xDEAD_BEEF);
        let upper = id.to_string().to_uppercase();
        assert_eq!(upper.parse::<ObjectId>().unwrap(), id);
    }

    #[test]
    fn encoded_order_matches_id_order() {
        let a = ObjectId::from_parts(1_000, 5, u32::MAX);
        let b = ObjectId::from_parts(1_001, 0, 0);
        assert!(a < b);
        assert!(a.encoded() < b.encoded());

        let c = ObjectId::from_parts(1_000, 6, 0);
        assert!(a < c);
        assert!(a.encoded() < c.encoded());
    }

    #[test]
    fn components_are_truncated() {
        let id = ObjectId::from_parts(u64::MAX, u32::MAX, 9);
        assert_eq!(id.timestamp().as_millis(), MILLIS_MASK);
        assert_eq!(id.counter(), COUNTER_MASK);
        assert_eq!(id.random(), 9);
    }

    #[test]
    fn timestamp_is_creation_time() {
        let before = DateTime::now();
        let id = ObjectId::new();
        let after = DateTime::now();
        assert!(before.is_past(id.timestamp()));
        assert!(id.timestamp().is_past(after));
    }
}

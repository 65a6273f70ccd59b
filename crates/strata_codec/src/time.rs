//! Millisecond-precision timestamps.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A UTC timestamp with millisecond precision.
///
/// Stored as milliseconds since the Unix epoch. This is the datetime type
/// used by record fields, index keys, and TTL expirations; its big-endian
/// byte form sorts chronologically, which is what makes datetime index
/// ranges and expiry scans work.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DateTime(u64);

impl DateTime {
    /// The epoch itself (zero milliseconds).
    pub const EPOCH: Self = Self(0);

    /// Creates a timestamp from milliseconds since the Unix epoch.
    #[inline]
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the current time.
    ///
    /// Clocks before the Unix epoch saturate to [`DateTime::EPOCH`].
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Returns milliseconds since the Unix epoch.
    #[inline]
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Returns this timestamp advanced by `millis`, saturating on overflow.
    #[must_use]
    pub const fn plus_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Returns this timestamp advanced by `secs`, saturating on overflow.
    #[must_use]
    pub const fn plus_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs.saturating_mul(1000)))
    }

    /// Whether this timestamp is at or before `other`.
    #[inline]
    #[must_use]
    pub const fn is_past(self, other: Self) -> bool {
        self.0 <= other.0
    }
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DateTime({}ms)", self.0)
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DateTime {
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}

impl From<DateTime> for u64 {
    fn from(dt: DateTime) -> Self {
        dt.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_chronological() {
        let a = DateTime::from_millis(1_000);
        let b = DateTime::from_millis(2_000);
        assert!(a < b);
        assert!(a.is_past(b));
        assert!(!b.is_past(a));
    }

    #[test]
    fn now_is_after_epoch() {
        assert!(DateTime::EPOCH < DateTime::now());
    }

    #[test]
    fn plus_saturates() {
        let dt = DateTime::from_millis(u64::MAX - 10);
        assert_eq!(dt.plus_millis(100).as_millis(), u64::MAX);
        assert_eq!(dt.plus_secs(1).as_millis(), u64::MAX);
    }

    #[test]
    fn plus_secs_scales() {
        let dt = DateTime::from_millis(500);
        assert_eq!(dt.plus_secs(2).as_millis(), 2_500);
    }

    #[test]
    fn is_past_includes_equal() {
        let dt = DateTime::from_millis(42);
        assert!(dt.is_past(dt));
    }
}

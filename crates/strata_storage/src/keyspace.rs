//! Keyspace handles and scan ranges.
//!
//! A [`Keyspace`] names one ordered namespace on a backend. Backends keep
//! keyspaces fully disjoint: the same key bytes in two keyspaces are two
//! unrelated entries, and scans never cross from one keyspace into another.
//!
//! A [`ScanRange`] describes the half-open or closed interval of keys a scan
//! visits, in plain byte order. [`next_prefix`] computes the exclusive upper
//! bound that turns a key prefix into such an interval.

use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

/// A cheaply cloneable handle to a named keyspace.
///
/// The handle carries only the name. It does not create anything on the
/// backend; use [`Backend::create_keyspace`](crate::Backend::create_keyspace)
/// to materialize the keyspace before reading or writing through it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Keyspace {
    name: Arc<str>,
}

impl Keyspace {
    /// Creates a handle for the named keyspace.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the keyspace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Scan direction over the byte order of keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Forward,
    /// Descending key order.
    Reverse,
}

/// An interval of keys to scan, expressed as byte-order bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    lower: Bound<Vec<u8>>,
    upper: Bound<Vec<u8>>,
}

impl ScanRange {
    /// A range covering every key in the keyspace.
    #[must_use]
    pub fn all() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// The range of all keys that start with `prefix`.
    ///
    /// An empty prefix covers the whole keyspace.
    #[must_use]
    pub fn prefix(prefix: &[u8]) -> Self {
        let upper = match next_prefix(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        Self {
            lower: Bound::Included(prefix.to_vec()),
            upper,
        }
    }

    /// A range with explicit bounds.
    #[must_use]
    pub fn between(lower: Bound<Vec<u8>>, upper: Bound<Vec<u8>>) -> Self {
        Self { lower, upper }
    }

    /// Returns both bounds borrowed as byte slices.
    #[must_use]
    pub fn as_bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        (borrow_bound(&self.lower), borrow_bound(&self.upper))
    }

    /// Returns `true` if `key` lies inside the range.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let above_lower = match &self.lower {
            Bound::Included(b) => key >= b.as_slice(),
            Bound::Excluded(b) => key > b.as_slice(),
            Bound::Unbounded => true,
        };
        let below_upper = match &self.upper {
            Bound::Included(b) => key <= b.as_slice(),
            Bound::Excluded(b) => key < b.as_slice(),
            Bound::Unbounded => true,
        };
        above_lower && below_upper
    }

    /// Returns `true` if no key can satisfy both bounds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
            (Bound::Included(lo), Bound::Excluded(hi)) => lo >= hi,
            (Bound::Excluded(lo), Bound::Included(hi)) => hi <= lo,
            (Bound::Excluded(lo), Bound::Excluded(hi)) => {
                // The immediate successor of `lo` in byte order is `lo` with
                // 0x00 appended, so (lo, lo + 0x00) holds no key either.
                hi <= lo
                    || (hi.len() == lo.len() + 1
                        && hi.starts_with(lo)
                        && hi[lo.len()] == 0x00)
            }
            _ => false,
        }
    }
}

impl Default for ScanRange {
    fn default() -> Self {
        Self::all()
    }
}

fn borrow_bound(bound: &Bound<Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(b) => Bound::Included(b.as_slice()),
        Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Returns the smallest key that sorts after every key starting with
/// `prefix`, or `None` when no such key exists.
///
/// The successor is the prefix with its last non-`0xFF` byte incremented and
/// everything after it dropped. An empty or all-`0xFF` prefix has no
/// successor; callers should treat that as an unbounded upper end.
#[must_use]
pub fn next_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(&last) = end.last() {
        if last == 0xFF {
            end.pop();
        } else {
            let idx = end.len() - 1;
            end[idx] = last + 1;
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyspace_name_roundtrip() {
        let ks = Keyspace::new("m_widget");
        assert_eq!(ks.name(), "m_widget");
        assert_eq!(ks.to_string(), "m_widget");
        assert_eq!(ks.clone(), ks);
    }

    #[test]
    fn next_prefix_increments_last_byte() {
        assert_eq!(next_prefix(b"abc"), Some(b"abd".to_vec()));
        assert_eq!(next_prefix(&[0x00]), Some(vec![0x01]));
    }

    #[test]
    fn next_prefix_carries_past_max_bytes() {
        assert_eq!(next_prefix(&[0x61, 0xFF]), Some(vec![0x62]));
        assert_eq!(next_prefix(&[0x61, 0xFF, 0xFF]), Some(vec![0x62]));
    }

    #[test]
    fn next_prefix_has_no_successor_for_all_max() {
        assert_eq!(next_prefix(&[]), None);
        assert_eq!(next_prefix(&[0xFF]), None);
        assert_eq!(next_prefix(&[0xFF, 0xFF]), None);
    }

    #[test]
    fn prefix_range_contains_only_prefixed_keys() {
        let range = ScanRange::prefix(b"ab");
        assert!(range.contains(b"ab"));
        assert!(range.contains(b"ab\x00"));
        assert!(range.contains(b"abz"));
        assert!(!range.contains(b"aa"));
        assert!(!range.contains(b"ac"));
        assert!(!range.contains(b"b"));
    }

    #[test]
    fn empty_prefix_covers_everything() {
        let range = ScanRange::prefix(b"");
        assert!(range.contains(b""));
        assert!(range.contains(b"anything"));
        assert!(range.contains(&[0xFF, 0xFF]));
    }

    #[test]
    fn between_respects_bound_kinds() {
        let range = ScanRange::between(
            Bound::Excluded(b"a".to_vec()),
            Bound::Included(b"c".to_vec()),
        );
        assert!(!range.contains(b"a"));
        assert!(range.contains(b"b"));
        assert!(range.contains(b"c"));
        assert!(!range.contains(b"ca"));
    }

    #[test]
    fn degenerate_ranges_are_empty() {
        let inverted = ScanRange::between(
            Bound::Included(b"z".to_vec()),
            Bound::Excluded(b"a".to_vec()),
        );
        assert!(inverted.is_empty());

        let pinched = ScanRange::between(
            Bound::Included(b"a".to_vec()),
            Bound::Excluded(b"a".to_vec()),
        );
        assert!(pinched.is_empty());

        let adjacent = ScanRange::between(
            Bound::Excluded(b"a".to_vec()),
            Bound::Excluded(b"a\x00".to_vec()),
        );
        assert!(adjacent.is_empty());

        assert!(!ScanRange::all().is_empty());
        assert!(!ScanRange::prefix(b"a").is_empty());
    }
}

//! Expiration marks.
//!
//! Every primary record and index entry carries a fixed-position tail: the
//! object's expiration instants as 8-byte big-endian millis, then a count
//! byte. Objects without TTL indexes carry the single byte `0x00`, so a
//! reader can always split the mark off without consulting the model.

use std::collections::BTreeMap;

use strata_codec::{CodecError, CodecResult, DateTime};

pub(crate) fn append_mark(buf: &mut Vec<u8>, expirations: &[DateTime]) -> CodecResult<()> {
    let count = u8::try_from(expirations.len())
        .map_err(|_| CodecError::encoding_failed("more than 255 expiration instants"))?;
    for instant in expirations {
        buf.extend_from_slice(&instant.as_millis().to_be_bytes());
    }
    buf.push(count);
    Ok(())
}

/// Splits a stored value into its payload and expiration instants.
pub(crate) fn split_mark(bytes: &[u8]) -> CodecResult<(&[u8], Vec<DateTime>)> {
    let Some((&count, rest)) = bytes.split_last() else {
        return Err(CodecError::decoding_failed("missing expiration mark"));
    };
    let packed_len = usize::from(count) * 8;
    if rest.len() < packed_len {
        return Err(CodecError::decoding_failed("truncated expiration mark"));
    }
    let (payload, packed) = rest.split_at(rest.len() - packed_len);
    let expirations = packed
        .chunks_exact(8)
        .map(|chunk| {
            let mut millis = [0u8; 8];
            millis.copy_from_slice(chunk);
            DateTime::from_millis(u64::from_be_bytes(millis))
        })
        .collect();
    Ok((payload, expirations))
}

/// An object is expired once any of its instants has passed.
pub(crate) fn is_expired(expirations: &[DateTime], now: DateTime) -> bool {
    expirations.iter().any(|instant| instant.is_past(now))
}

/// Outcome of one [`Store::reap_expired`](crate::Store::reap_expired) run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapSummary {
    /// Objects deleted, per model.
    pub reaped: BTreeMap<String, usize>,
    /// Expiration entries whose object was already gone, removed directly.
    pub stale: usize,
}

impl ReapSummary {
    /// Total objects deleted across all models.
    #[must_use]
    pub fn total_reaped(&self) -> usize {
        self.reaped.values().sum()
    }

    pub(crate) fn note_reaped(&mut self, model: &str) {
        *self.reaped.entry(model.to_string()).or_default() += 1;
    }
}

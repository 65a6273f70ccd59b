//! Byte layouts for primary, index, and expiration keys.
//!
//! Primary: `topic 0x00 object-id`. Index: `topic 0x00 tag(4, BE)` followed
//! by the encoded field values, then the object id unless the index is
//! unique. Expiration: `expires-at(8, BE) topic 0x00 object-id`, ordered by
//! instant so reaping scans a prefix.

use strata_codec::{append_terminated, CodecError, CodecResult, DateTime, ObjectId};

use crate::error::{DbError, DbResult};

/// Checks a caller-supplied topic before it is embedded in keys.
pub(crate) fn check_topic(topic: &str) -> DbResult<()> {
    if topic.is_empty() {
        return Err(DbError::invalid_argument("topic must not be empty"));
    }
    if topic.contains('\0') {
        return Err(DbError::invalid_argument(
            "topic must not contain a NUL byte",
        ));
    }
    Ok(())
}

pub(crate) fn primary_key(topic: &str, id: &ObjectId) -> CodecResult<Vec<u8>> {
    let mut key = Vec::with_capacity(topic.len() + 1 + ObjectId::ENCODED_LEN);
    append_terminated(&mut key, topic.as_bytes())?;
    key.extend_from_slice(&id.encoded());
    Ok(key)
}

/// Shared prefix of every entry of one index within one topic.
pub(crate) fn index_prefix(topic: &str, tag: u32) -> CodecResult<Vec<u8>> {
    let mut key = Vec::with_capacity(topic.len() + 5);
    append_terminated(&mut key, topic.as_bytes())?;
    key.extend_from_slice(&tag.to_be_bytes());
    Ok(key)
}

pub(crate) fn ttl_key(expires_at: DateTime, topic: &str, id: &ObjectId) -> CodecResult<Vec<u8>> {
    let mut key = Vec::with_capacity(8 + topic.len() + 1 + ObjectId::ENCODED_LEN);
    key.extend_from_slice(&expires_at.as_millis().to_be_bytes());
    append_terminated(&mut key, topic.as_bytes())?;
    key.extend_from_slice(&id.encoded());
    Ok(key)
}

/// Parses an expiration key back into its instant, topic, and object id.
pub(crate) fn split_ttl_key(key: &[u8]) -> CodecResult<(DateTime, String, ObjectId)> {
    if key.len() < 8 + 1 + ObjectId::ENCODED_LEN {
        return Err(CodecError::decoding_failed("expiration key too short"));
    }
    let (instant, rest) = key.split_at(8);
    let mut millis = [0u8; 8];
    millis.copy_from_slice(instant);
    let expires_at = DateTime::from_millis(u64::from_be_bytes(millis));

    let id_start = rest.len() - ObjectId::ENCODED_LEN;
    let (topic_part, id_part) = rest.split_at(id_start);
    let Some((&0x00, topic_bytes)) = topic_part.split_last() else {
        return Err(CodecError::decoding_failed(
            "expiration key missing topic terminator",
        ));
    };
    let topic = std::str::from_utf8(topic_bytes)
        .map_err(|_| CodecError::decoding_failed("expiration key topic is not UTF-8"))?;
    if topic_bytes.contains(&0x00) {
        return Err(CodecError::decoding_failed(
            "expiration key topic contains a NUL byte",
        ));
    }
    let id = ObjectId::from_encoded(id_part)?;
    Ok((expires_at, topic.to_string(), id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_layout() {
        let id = ObjectId::from_parts(0x0102, 3, 4);
        let key = primary_key("orders", &id).unwrap();
        assert_eq!(&key[..7], b"orders\0".as_slice());
        assert_eq!(&key[7..], id.encoded().as_slice());
    }

    #[test]
    fn index_prefix_layout() {
        let prefix = index_prefix("orders", 0xAABB_CCDD).unwrap();
        assert_eq!(&prefix[..7], b"orders\0".as_slice());
        assert_eq!(&prefix[7..], [0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn ttl_key_round_trips() {
        let id = ObjectId::from_parts(7, 7, 7);
        let at = DateTime::from_millis(123_456);
        let key = ttl_key(at, "t-1", &id).unwrap();
        assert_eq!(&key[..8], 123_456u64.to_be_bytes().as_slice());

        let (expires_at, topic, parsed) = split_ttl_key(&key).unwrap();
        assert_eq!(expires_at, at);
        assert_eq!(topic, "t-1");
        assert_eq!(parsed, id);
    }

    #[test]
    fn ttl_keys_order_by_instant_first() {
        let id = ObjectId::from_parts(1, 1, 1);
        let early = ttl_key(DateTime::from_millis(5), "zzz", &id).unwrap();
        let late = ttl_key(DateTime::from_millis(6), "aaa", &id).unwrap();
        assert!(early < late);
    }

    #[test]
    fn rejects_nul_topics() {
        assert!(check_topic("ok").is_ok());
        assert!(check_topic("").is_err());
        assert!(check_topic("bad\0topic").is_err());

        let id = ObjectId::from_parts(1, 1, 1);
        assert!(primary_key("bad\0topic", &id).is_err());
    }

    #[test]
    fn split_rejects_truncated_keys() {
        assert!(split_ttl_key(b"short").is_err());
        let id = ObjectId::from_parts(1, 1, 1);
        let mut key = ttl_key(DateTime::from_millis(1), "t", &id).unwrap();
        key.truncate(key.len() - 1);
        assert!(split_ttl_key(&key).is_err());
    }
}

//! Order-preserving key encoding.
//!
//! Every encoding here has one defining property: unsigned byte-wise
//! comparison of two encoded values equals the natural comparison of the
//! values themselves. Range scans over encoded keys therefore see fields in
//! their natural order. The encodings are also self-delimiting (fixed width,
//! or NUL-terminated for variable-width types), so multiple fields
//! concatenate into one key without separators or length prefixes.
//!
//! Per type:
//!
//! - unsigned integers: fixed-width big-endian
//! - signed integers: fixed-width big-endian with the sign bit flipped
//! - floats: IEEE-754 total-order transform (sign bit set for non-negative,
//!   all bits flipped for negative); NaN is rejected
//! - datetime: epoch-milliseconds as u64 big-endian
//! - object id: the fixed-width 24-byte hex form
//! - text/bytes: raw bytes plus a 0x00 terminator; interior NULs rejected
//!
//! A descending field complements every encoded byte (terminator included),
//! which reverses the sort order of exactly that field.

use crate::error::{CodecError, CodecResult};
use crate::value::FieldValue;

/// Sort direction of one index field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    /// Smallest value first.
    #[default]
    Ascending,
    /// Largest value first.
    Descending,
}

/// Terminator byte closing variable-width key parts.
const TERMINATOR: u8 = 0x00;

/// Appends one field value in key encoding.
///
/// # Errors
///
/// Returns [`CodecError::NaNForbidden`] for NaN floats,
/// [`CodecError::NulForbidden`] for text or blobs containing NUL, and
/// [`CodecError::UnsupportedType`] for nested objects (only leaf fields may
/// be indexed). The buffer is unchanged on error.
pub fn append_key_field(
    buf: &mut Vec<u8>,
    value: &FieldValue,
    order: SortOrder,
) -> CodecResult<()> {
    let start = buf.len();
    let result = append_ascending(buf, value);
    if result.is_err() {
        buf.truncate(start);
        return result;
    }
    if order == SortOrder::Descending {
        for byte in &mut buf[start..] {
            *byte = !*byte;
        }
    }
    Ok(())
}

/// Encodes one field value to a fresh buffer.
///
/// # Errors
///
/// Same failure cases as [`append_key_field`].
pub fn encode_key_field(value: &FieldValue, order: SortOrder) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    append_key_field(&mut buf, value, order)?;
    Ok(buf)
}

/// Appends raw bytes plus the terminator, rejecting interior NULs.
///
/// This is the same rule key-position text obeys; key layouts use it for
/// their own variable-width parts (topics).
///
/// # Errors
///
/// Returns [`CodecError::NulForbidden`] if `bytes` contains 0x00.
pub fn append_terminated(buf: &mut Vec<u8>, bytes: &[u8]) -> CodecResult<()> {
    if bytes.contains(&TERMINATOR) {
        return Err(CodecError::NulForbidden);
    }
    buf.extend_from_slice(bytes);
    buf.push(TERMINATOR);
    Ok(())
}

fn append_ascending(buf: &mut Vec<u8>, value: &FieldValue) -> CodecResult<()> {
    match value {
        FieldValue::Bool(v) => buf.push(u8::from(*v)),
        FieldValue::UInt8(v) => buf.push(*v),
        FieldValue::UInt16(v) => buf.extend_from_slice(&v.to_be_bytes()),
        FieldValue::UInt32(v) => buf.extend_from_slice(&v.to_be_bytes()),
        FieldValue::UInt64(v) => buf.extend_from_slice(&v.to_be_bytes()),
        FieldValue::Int8(v) => buf.push((*v as u8) ^ 0x80),
        FieldValue::Int16(v) => {
            buf.extend_from_slice(&((*v as u16) ^ (1 << 15)).to_be_bytes());
        }
        FieldValue::Int32(v) => {
            buf.extend_from_slice(&((*v as u32) ^ (1 << 31)).to_be_bytes());
        }
        FieldValue::Int64(v) => {
            buf.extend_from_slice(&((*v as u64) ^ (1 << 63)).to_be_bytes());
        }
        FieldValue::Float(v) => {
            buf.extend_from_slice(&order_f32_bits(*v)?.to_be_bytes());
        }
        FieldValue::Double(v) => {
            buf.extend_from_slice(&order_f64_bits(*v)?.to_be_bytes());
        }
        FieldValue::DateTime(v) => buf.extend_from_slice(&v.as_millis().to_be_bytes()),
        FieldValue::Id(v) => buf.extend_from_slice(&v.encoded()),
        FieldValue::Text(v) => append_terminated(buf, v.as_bytes())?,
        FieldValue::Bytes(v) => append_terminated(buf, v)?,
        FieldValue::Nested(_) => {
            return Err(CodecError::unsupported_type("nested object in key position"));
        }
    }
    Ok(())
}

fn order_f32_bits(v: f32) -> CodecResult<u32> {
    if v.is_nan() {
        return Err(CodecError::NaNForbidden);
    }
    let bits = v.to_bits();
    Ok(if bits & (1 << 31) != 0 {
        !bits
    } else {
        bits | (1 << 31)
    })
}

fn order_f64_bits(v: f64) -> CodecResult<u64> {
    if v.is_nan() {
        return Err(CodecError::NaNForbidden);
    }
    let bits = v.to_bits();
    Ok(if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ObjectId;
    use crate::time::DateTime;
    use proptest::prelude::*;

    fn encode(value: &FieldValue) -> Vec<u8> {
        encode_key_field(value, SortOrder::Ascending).unwrap()
    }

    #[test]
    fn encode_bool() {
        assert_eq!(encode(&FieldValue::Bool(false)), vec![0x00]);
        assert_eq!(encode(&FieldValue::Bool(true)), vec![0x01]);
    }

    #[test]
    fn encode_unsigned() {
        assert_eq!(encode(&FieldValue::UInt8(7)), vec![0x07]);
        assert_eq!(encode(&FieldValue::UInt16(0x0102)), vec![0x01, 0x02]);
        assert_eq!(
            encode(&FieldValue::UInt32(0xDEAD_BEEF)),
            vec![0xDE, 0xAD, 0xBE, 0xEF]
        );
        assert_eq!(encode(&FieldValue::UInt64(1)), {
            let mut v = vec![0u8; 7];
            v.push(1);
            v
        });
    }

    #[test]
    fn encode_signed_flips_sign_bit() {
        assert_eq!(encode(&FieldValue::Int8(i8::MIN)), vec![0x00]);
        assert_eq!(encode(&FieldValue::Int8(-1)), vec![0x7F]);
        assert_eq!(encode(&FieldValue::Int8(0)), vec![0x80]);
        assert_eq!(encode(&FieldValue::Int8(i8::MAX)), vec![0xFF]);
        assert_eq!(
            encode(&FieldValue::Int64(0)),
            vec![0x80, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn encode_text_is_nul_terminated() {
        assert_eq!(encode(&FieldValue::Text("ab".into())), vec![0x61, 0x62, 0x00]);
        assert_eq!(encode(&FieldValue::Text(String::new())), vec![0x00]);
    }

    #[test]
    fn encode_datetime_is_millis_be() {
        let dt = DateTime::from_millis(0x0102_0304);
        assert_eq!(
            encode(&FieldValue::DateTime(dt)),
            vec![0, 0, 0, 0, 0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn encode_id_is_hex_form() {
        let id = ObjectId::from_parts(1, 2, 3);
        assert_eq!(encode(&FieldValue::Id(id)), id.encoded().to_vec());
    }

    #[test]
    fn descending_complements_bytes() {
        let asc = encode(&FieldValue::Text("ab".into()));
        let desc = encode_key_field(&FieldValue::Text("ab".into()), SortOrder::Descending).unwrap();
        let complemented: Vec<u8> = asc.iter().map(|b| !b).collect();
        assert_eq!(desc, complemented);
        assert_eq!(desc, vec![0x9E, 0x9D, 0xFF]);
    }

    #[test]
    fn descending_reverses_order() {
        let a = encode_key_field(&FieldValue::UInt32(5), SortOrder::Descending).unwrap();
        let b = encode_key_field(&FieldValue::UInt32(9), SortOrder::Descending).unwrap();
        assert!(a > b);
    }

    #[test]
    fn nan_is_rejected() {
        let mut buf = vec![0xAA];
        let err = append_key_field(&mut buf, &FieldValue::Double(f64::NAN), SortOrder::Ascending)
            .unwrap_err();
        assert_eq!(err, CodecError::NaNForbidden);
        assert_eq!(buf, vec![0xAA]);
    }

    #[test]
    fn interior_nul_is_rejected() {
        let err = encode_key_field(
            &FieldValue::Text("a\0b".into()),
            SortOrder::Ascending,
        )
        .unwrap_err();
        assert_eq!(err, CodecError::NulForbidden);

        let err = encode_key_field(
            &FieldValue::Bytes(vec![1, 0, 2]),
            SortOrder::Ascending,
        )
        .unwrap_err();
        assert_eq!(err, CodecError::NulForbidden);
    }

    #[test]
    fn nested_is_rejected() {
        let err =
            encode_key_field(&FieldValue::Nested(vec![]), SortOrder::Ascending).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedType { .. }));
    }

    #[test]
    fn buffer_unchanged_on_error() {
        let mut buf = vec![1, 2, 3];
        let _ = append_key_field(
            &mut buf,
            &FieldValue::Text("x\0".into()),
            SortOrder::Descending,
        );
        assert_eq!(buf, vec![1, 2, 3]);
    }

    #[test]
    fn composite_fields_concatenate() {
        let mut buf = Vec::new();
        append_key_field(&mut buf, &FieldValue::UInt8(9), SortOrder::Ascending).unwrap();
        append_key_field(
            &mut buf,
            &FieldValue::Text("hi".into()),
            SortOrder::Ascending,
        )
        .unwrap();
        assert_eq!(buf, vec![0x09, 0x68, 0x69, 0x00]);
    }

    #[test]
    fn float_extremes_order() {
        let values = [
            f64::NEG_INFINITY,
            f64::MIN,
            -1.5,
            -f64::MIN_POSITIVE,
            0.0,
            f64::MIN_POSITIVE,
            1.5,
            f64::MAX,
            f64::INFINITY,
        ];
        let encoded: Vec<Vec<u8>> = values
            .iter()
            .map(|v| encode(&FieldValue::Double(*v)))
            .collect();
        for window in encoded.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn prefix_strings_order() {
        // "a" sorts before "ab" and the terminator keeps that true byte-wise.
        let a = encode(&FieldValue::Text("a".into()));
        let ab = encode(&FieldValue::Text("ab".into()));
        assert!(a < ab);
    }

    proptest! {
        #[test]
        fn u64_order_preserved(a in any::<u64>(), b in any::<u64>()) {
            let ea = encode(&FieldValue::UInt64(a));
            let eb = encode(&FieldValue::UInt64(b));
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn i64_order_preserved(a in any::<i64>(), b in any::<i64>()) {
            let ea = encode(&FieldValue::Int64(a));
            let eb = encode(&FieldValue::Int64(b));
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn i16_order_preserved(a in any::<i16>(), b in any::<i16>()) {
            let ea = encode(&FieldValue::Int16(a));
            let eb = encode(&FieldValue::Int16(b));
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn f64_order_preserved(
            a in any::<f64>().prop_filter("no NaN", |v| !v.is_nan()),
            b in any::<f64>().prop_filter("no NaN", |v| !v.is_nan()),
        ) {
            let ea = encode(&FieldValue::Double(a));
            let eb = encode(&FieldValue::Double(b));
            if a < b {
                prop_assert!(ea < eb);
            }
            if a > b {
                prop_assert!(ea > eb);
            }
        }

        #[test]
        fn text_order_preserved(a in "[a-z]{0,8}", b in "[a-z]{0,8}") {
            let ea = encode(&FieldValue::Text(a.clone()));
            let eb = encode(&FieldValue::Text(b.clone()));
            prop_assert_eq!(a.as_bytes().cmp(b.as_bytes()), ea.cmp(&eb));
        }

        #[test]
        fn descending_inverts_order(a in any::<u32>(), b in any::<u32>()) {
            let ea = encode_key_field(&FieldValue::UInt32(a), SortOrder::Descending).unwrap();
            let eb = encode_key_field(&FieldValue::UInt32(b), SortOrder::Descending).unwrap();
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb).reverse());
        }

        #[test]
        fn datetime_order_preserved(a in any::<u64>(), b in any::<u64>()) {
            let ea = encode(&FieldValue::DateTime(DateTime::from_millis(a)));
            let eb = encode(&FieldValue::DateTime(DateTime::from_millis(b)));
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }
    }
}

//! # Strata Codec
//!
//! Typed field values and byte encodings for StrataDB.
//!
//! This crate is the leaf of the engine: it knows nothing about models,
//! keyspaces, or backends. It provides:
//!
//! - [`FieldValue`] / [`FieldType`]: the closed set of storable values
//! - [`ObjectId`]: time-sortable object identifiers
//! - [`DateTime`]: millisecond timestamps
//! - key encoding ([`append_key_field`]): order-preserving bytes for
//!   index-key positions
//! - record encoding ([`encode_record`] / [`decode_record`]): the tagged
//!   round-tripping format for primary-record values
//!
//! ## Ordering Guarantee
//!
//! For any two values `a < b` of the same orderable type, the key encoding
//! satisfies `encode(a) < encode(b)` under unsigned byte-wise comparison.
//! Everything the engine does with index ranges rests on this.
//!
//! ## Usage
//!
//! ```
//! use strata_codec::{encode_key_field, FieldValue, SortOrder};
//!
//! let a = encode_key_field(&FieldValue::Int32(-7), SortOrder::Ascending).unwrap();
//! let b = encode_key_field(&FieldValue::Int32(7), SortOrder::Ascending).unwrap();
//! assert!(a < b);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;
mod key;
mod record;
mod time;
mod value;

pub use error::{CodecError, CodecResult};
pub use id::ObjectId;
pub use key::{append_key_field, append_terminated, encode_key_field, SortOrder};
pub use record::{decode_record, encode_record, Record};
pub use time::DateTime;
pub use value::{FieldType, FieldValue};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_and_record_agree_on_values() {
        let id = ObjectId::new();
        let record = Record::new(
            1,
            DateTime::now(),
            vec![
                (1, FieldValue::Text("name".into())),
                (2, FieldValue::Id(id)),
            ],
        );
        let decoded = decode_record(&encode_record(&record).unwrap()).unwrap();
        let key_before = encode_key_field(&record.fields[1].1, SortOrder::Ascending).unwrap();
        let key_after = encode_key_field(&decoded.fields[1].1, SortOrder::Ascending).unwrap();
        assert_eq!(key_before, key_after);
    }

    #[test]
    fn id_timestamp_usable_as_datetime_field() {
        let id = ObjectId::new();
        let value = FieldValue::DateTime(id.timestamp());
        assert_eq!(value.as_datetime(), Some(id.timestamp()));
    }
}

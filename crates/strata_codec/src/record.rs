//! Record encoding for primary-record values.
//!
//! Unlike key encoding, record encoding lives in value positions: it does
//! not need to sort, it needs to round-trip. The format is a small tagged
//! binary layout: a header (revision, updated-at), then a count of fields,
//! then per field its tag, a type byte, and the payload (length-prefixed
//! for text and blobs, count-prefixed for nested objects).
//!
//! Field tags must be strictly ascending at every nesting level; both
//! encoder and decoder enforce this, so a record has exactly one encoded
//! form and corrupted input fails instead of reordering silently.

use crate::error::{CodecError, CodecResult};
use crate::id::ObjectId;
use crate::time::DateTime;
use crate::value::FieldValue;

/// Maximum nesting depth accepted by encoder and decoder.
const MAX_DEPTH: usize = 32;

const TYPE_BOOL: u8 = 0x01;
const TYPE_INT8: u8 = 0x02;
const TYPE_INT16: u8 = 0x03;
const TYPE_INT32: u8 = 0x04;
const TYPE_INT64: u8 = 0x05;
const TYPE_UINT8: u8 = 0x06;
const TYPE_UINT16: u8 = 0x07;
const TYPE_UINT32: u8 = 0x08;
const TYPE_UINT64: u8 = 0x09;
const TYPE_FLOAT: u8 = 0x0A;
const TYPE_DOUBLE: u8 = 0x0B;
const TYPE_TEXT: u8 = 0x0C;
const TYPE_BYTES: u8 = 0x0D;
const TYPE_DATETIME: u8 = 0x0E;
const TYPE_ID: u8 = 0x0F;
const TYPE_NESTED: u8 = 0x10;

/// A decoded primary record: the object header plus its tagged fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Update counter, starting at 1 on create.
    pub revision: u64,
    /// Instant of the last write.
    pub updated_at: DateTime,
    /// Tagged field values, strictly ascending by tag.
    pub fields: Vec<(u16, FieldValue)>,
}

impl Record {
    /// Creates a record.
    #[must_use]
    pub const fn new(revision: u64, updated_at: DateTime, fields: Vec<(u16, FieldValue)>) -> Self {
        Self {
            revision,
            updated_at,
            fields,
        }
    }
}

/// Encodes a record to bytes.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if field tags are not strictly
/// ascending, a field list exceeds `u16::MAX` entries, a text or blob
/// exceeds `u32::MAX` bytes, or nesting exceeds the depth limit.
pub fn encode_record(record: &Record) -> CodecResult<Vec<u8>> {
    let mut encoder = RecordEncoder::new();
    encoder.buf.extend_from_slice(&record.revision.to_be_bytes());
    encoder
        .buf
        .extend_from_slice(&record.updated_at.as_millis().to_be_bytes());
    encoder.write_fields(&record.fields, 0)?;
    Ok(encoder.buf)
}

/// Decodes a record from bytes, consuming all input.
///
/// # Errors
///
/// Returns a [`CodecError`] on truncated input, trailing bytes, unknown
/// type bytes, non-ascending tags, invalid UTF-8, or malformed object ids.
pub fn decode_record(bytes: &[u8]) -> CodecResult<Record> {
    let mut decoder = RecordDecoder::new(bytes);
    let revision = decoder.read_u64()?;
    let updated_at = DateTime::from_millis(decoder.read_u64()?);
    let fields = decoder.read_fields(0)?;
    if !decoder.is_empty() {
        return Err(CodecError::invalid_structure("trailing bytes after record"));
    }
    Ok(Record {
        revision,
        updated_at,
        fields,
    })
}

struct RecordEncoder {
    buf: Vec<u8>,
}

impl RecordEncoder {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn write_fields(&mut self, fields: &[(u16, FieldValue)], depth: usize) -> CodecResult<()> {
        if depth > MAX_DEPTH {
            return Err(CodecError::encoding_failed("nesting too deep"));
        }
        let count = u16::try_from(fields.len())
            .map_err(|_| CodecError::encoding_failed("too many fields in record"))?;
        self.buf.extend_from_slice(&count.to_be_bytes());
        let mut previous: Option<u16> = None;
        for (tag, value) in fields {
            if previous.is_some_and(|p| p >= *tag) {
                return Err(CodecError::encoding_failed(
                    "field tags not strictly ascending",
                ));
            }
            previous = Some(*tag);
            self.buf.extend_from_slice(&tag.to_be_bytes());
            self.write_value(value, depth)?;
        }
        Ok(())
    }

    fn write_value(&mut self, value: &FieldValue, depth: usize) -> CodecResult<()> {
        match value {
            FieldValue::Bool(v) => {
                self.buf.push(TYPE_BOOL);
                self.buf.push(u8::from(*v));
            }
            FieldValue::Int8(v) => {
                self.buf.push(TYPE_INT8);
                self.buf.push(*v as u8);
            }
            FieldValue::Int16(v) => {
                self.buf.push(TYPE_INT16);
                self.buf.extend_from_slice(&v.to_be_bytes());
            }
            FieldValue::Int32(v) => {
                self.buf.push(TYPE_INT32);
                self.buf.extend_from_slice(&v.to_be_bytes());
            }
            FieldValue::Int64(v) => {
                self.buf.push(TYPE_INT64);
                self.buf.extend_from_slice(&v.to_be_bytes());
            }
            FieldValue::UInt8(v) => {
                self.buf.push(TYPE_UINT8);
                self.buf.push(*v);
            }
            FieldValue::UInt16(v) => {
                self.buf.push(TYPE_UINT16);
                self.buf.extend_from_slice(&v.to_be_bytes());
            }
            FieldValue::UInt32(v) => {
                self.buf.push(TYPE_UINT32);
                self.buf.extend_from_slice(&v.to_be_bytes());
            }
            FieldValue::UInt64(v) => {
                self.buf.push(TYPE_UINT64);
                self.buf.extend_from_slice(&v.to_be_bytes());
            }
            FieldValue::Float(v) => {
                self.buf.push(TYPE_FLOAT);
                self.buf.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            FieldValue::Double(v) => {
                self.buf.push(TYPE_DOUBLE);
                self.buf.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            FieldValue::Text(v) => {
                self.buf.push(TYPE_TEXT);
                self.write_len_prefixed(v.as_bytes())?;
            }
            FieldValue::Bytes(v) => {
                self.buf.push(TYPE_BYTES);
                self.write_len_prefixed(v)?;
            }
            FieldValue::DateTime(v) => {
                self.buf.push(TYPE_DATETIME);
                self.buf.extend_from_slice(&v.as_millis().to_be_bytes());
            }
            FieldValue::Id(v) => {
                self.buf.push(TYPE_ID);
                self.buf.extend_from_slice(&v.encoded());
            }
            FieldValue::Nested(fields) => {
                self.buf.push(TYPE_NESTED);
                self.write_fields(fields, depth + 1)?;
            }
        }
        Ok(())
    }

    fn write_len_prefixed(&mut self, bytes: &[u8]) -> CodecResult<()> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| CodecError::encoding_failed("value longer than u32::MAX"))?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(bytes);
        Ok(())
    }
}

struct RecordDecoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> RecordDecoder<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos == self.input.len()
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .ok_or(CodecError::UnexpectedEof)?;
        if end > self.input.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.input[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> CodecResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> CodecResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> CodecResult<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buf))
    }

    fn read_fields(&mut self, depth: usize) -> CodecResult<Vec<(u16, FieldValue)>> {
        if depth > MAX_DEPTH {
            return Err(CodecError::invalid_structure("nesting too deep"));
        }
        let count = self.read_u16()?;
        let mut fields = Vec::with_capacity(usize::from(count).min(64));
        let mut previous: Option<u16> = None;
        for _ in 0..count {
            let tag = self.read_u16()?;
            if previous.is_some_and(|p| p >= tag) {
                return Err(CodecError::invalid_structure(
                    "field tags not strictly ascending",
                ));
            }
            previous = Some(tag);
            let value = self.read_value(depth)?;
            fields.push((tag, value));
        }
        Ok(fields)
    }

    fn read_value(&mut self, depth: usize) -> CodecResult<FieldValue> {
        let type_byte = self.read_u8()?;
        let value = match type_byte {
            TYPE_BOOL => match self.read_u8()? {
                0 => FieldValue::Bool(false),
                1 => FieldValue::Bool(true),
                other => {
                    return Err(CodecError::invalid_structure(format!(
                        "invalid bool byte: 0x{other:02x}"
                    )));
                }
            },
            TYPE_INT8 => FieldValue::Int8(self.read_u8()? as i8),
            TYPE_INT16 => FieldValue::Int16(self.read_u16()? as i16),
            TYPE_INT32 => FieldValue::Int32(self.read_u32()? as i32),
            TYPE_INT64 => FieldValue::Int64(self.read_u64()? as i64),
            TYPE_UINT8 => FieldValue::UInt8(self.read_u8()?),
            TYPE_UINT16 => FieldValue::UInt16(self.read_u16()?),
            TYPE_UINT32 => FieldValue::UInt32(self.read_u32()?),
            TYPE_UINT64 => FieldValue::UInt64(self.read_u64()?),
            TYPE_FLOAT => FieldValue::Float(f32::from_bits(self.read_u32()?)),
            TYPE_DOUBLE => FieldValue::Double(f64::from_bits(self.read_u64()?)),
            TYPE_TEXT => {
                let len = self.read_u32()? as usize;
                let bytes = self.take(len)?;
                let text =
                    std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                FieldValue::Text(text.to_string())
            }
            TYPE_BYTES => {
                let len = self.read_u32()? as usize;
                FieldValue::Bytes(self.take(len)?.to_vec())
            }
            TYPE_DATETIME => FieldValue::DateTime(DateTime::from_millis(self.read_u64()?)),
            TYPE_ID => {
                let bytes = self.take(ObjectId::ENCODED_LEN)?;
                FieldValue::Id(ObjectId::from_encoded(bytes)?)
            }
            TYPE_NESTED => FieldValue::Nested(self.read_fields(depth + 1)?),
            other => {
                return Err(CodecError::invalid_structure(format!(
                    "unknown type byte: 0x{other:02x}"
                )));
            }
        };
        Ok(value)
    }
}

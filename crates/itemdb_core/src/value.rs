//! Attribute values.

use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use crate::schema::AttributeKind;
use crate::types::{ItemId, UNASSIGNED_ID};
use chrono::NaiveDateTime;
use itemdb_codec::DataStream;

/// The value of a reference attribute.
///
/// Stored references are plain ids; reads through a container replace them
/// with the referenced record. Two references are equal when they point at
/// the same id, regardless of whether the target has been resolved.
#[derive(Debug, Clone)]
pub enum Reference {
    /// No target.
    Unset,
    /// A target identified by id.
    Id(ItemId),
    /// A target carried inline, either resolved on read or not yet saved.
    Record(Box<Record>),
}

impl Reference {
    /// Creates a reference from a stored id; the sentinel id maps to `Unset`.
    #[must_use]
    pub fn from_id(id: ItemId) -> Self {
        if id == UNASSIGNED_ID {
            Self::Unset
        } else {
            Self::Id(id)
        }
    }

    /// The referenced id, or the sentinel when unset or not yet saved.
    #[must_use]
    pub fn id(&self) -> ItemId {
        match self {
            Self::Unset => UNASSIGNED_ID,
            Self::Id(id) => *id,
            Self::Record(record) => record.id(),
        }
    }

    /// The inline record, if resolved.
    #[must_use]
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Returns true if the reference has no target.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl From<Record> for Reference {
    fn from(record: Record) -> Self {
        Self::Record(Box::new(record))
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed 8-bit integer.
    Int8(i8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 8-bit integer.
    UInt8(u8),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// Boolean.
    Bool(bool),
    /// Single precision float.
    Float32(f32),
    /// Double precision float.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Binary blob.
    Blob(Vec<u8>),
    /// Date-time with second precision.
    DateTime(NaiveDateTime),
    /// Reference to an item in another container.
    Reference(Reference),
}

impl Value {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int8(_) => "int8",
            Self::Int16(_) => "int16",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::UInt8(_) => "uint8",
            Self::UInt16(_) => "uint16",
            Self::UInt32(_) => "uint32",
            Self::UInt64(_) => "uint64",
            Self::Bool(_) => "bool",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::String(_) => "string",
            Self::Blob(_) => "blob",
            Self::DateTime(_) => "datetime",
            Self::Reference(_) => "reference",
        }
    }

    /// Widens any integer variant to `i64`. `UInt64` values above
    /// `i64::MAX` yield `None`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int8(v) => Some(i64::from(v)),
            Self::Int16(v) => Some(i64::from(v)),
            Self::Int32(v) => Some(i64::from(v)),
            Self::Int64(v) => Some(v),
            Self::UInt8(v) => Some(i64::from(v)),
            Self::UInt16(v) => Some(i64::from(v)),
            Self::UInt32(v) => Some(i64::from(v)),
            Self::UInt64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Returns the float value, widened to `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float32(v) => Some(f64::from(v)),
            Self::Float64(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the boolean value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the blob value.
    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the date-time value.
    #[must_use]
    pub fn as_date_time(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the reference value.
    #[must_use]
    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Reference(v) => Some(v),
            _ => None,
        }
    }

    /// Writes this value using the encoding of `kind`.
    ///
    /// # Errors
    ///
    /// Fails if the value does not match `kind` or does not fit its
    /// encoding (for example an oversized blob).
    pub fn encode(&self, kind: &AttributeKind, stream: &mut DataStream) -> CoreResult<()> {
        match (kind, self) {
            (AttributeKind::Int8, Self::Int8(v)) => stream.write_i8(*v),
            (AttributeKind::Int16, Self::Int16(v)) => stream.write_i16(*v),
            (AttributeKind::Int32, Self::Int32(v)) => stream.write_i32(*v),
            (AttributeKind::Int64, Self::Int64(v)) => stream.write_i64(*v),
            (AttributeKind::UInt8, Self::UInt8(v)) => stream.write_u8(*v),
            (AttributeKind::UInt16, Self::UInt16(v)) => stream.write_u16(*v),
            (AttributeKind::UInt32, Self::UInt32(v)) => stream.write_u32(*v),
            (AttributeKind::UInt64, Self::UInt64(v)) => stream.write_u64(*v),
            (AttributeKind::Bool, Self::Bool(v)) => stream.write_bool(*v),
            (AttributeKind::Float32, Self::Float32(v)) => stream.write_f32(*v),
            (AttributeKind::Float64, Self::Float64(v)) => stream.write_f64(*v),
            (AttributeKind::String, Self::String(v)) => stream.write_string(v)?,
            (AttributeKind::Blob, Self::Blob(v)) => stream.write_blob(v)?,
            (AttributeKind::DateTime, Self::DateTime(v)) => stream.write_date_time(v)?,
            (AttributeKind::Reference(_), Self::Reference(r)) => stream.write_i32(r.id()),
            (kind, value) => {
                return Err(CoreError::validation(format!(
                    "cannot encode {} value as {kind}",
                    value.type_name()
                )))
            }
        }
        Ok(())
    }

    /// Reads a value encoded as `kind`.
    ///
    /// References decode as bare ids; the sentinel id decodes as unset.
    pub fn decode(kind: &AttributeKind, stream: &mut DataStream) -> CoreResult<Self> {
        Ok(match kind {
            AttributeKind::Int8 => Self::Int8(stream.read_i8()?),
            AttributeKind::Int16 => Self::Int16(stream.read_i16()?),
            AttributeKind::Int32 => Self::Int32(stream.read_i32()?),
            AttributeKind::Int64 => Self::Int64(stream.read_i64()?),
            AttributeKind::UInt8 => Self::UInt8(stream.read_u8()?),
            AttributeKind::UInt16 => Self::UInt16(stream.read_u16()?),
            AttributeKind::UInt32 => Self::UInt32(stream.read_u32()?),
            AttributeKind::UInt64 => Self::UInt64(stream.read_u64()?),
            AttributeKind::Bool => Self::Bool(stream.read_bool()?),
            AttributeKind::Float32 => Self::Float32(stream.read_f32()?),
            AttributeKind::Float64 => Self::Float64(stream.read_f64()?),
            AttributeKind::String => Self::String(stream.read_string()?),
            AttributeKind::Blob => Self::Blob(stream.read_blob()?),
            AttributeKind::DateTime => Self::DateTime(stream.read_date_time()?),
            AttributeKind::Reference(_) => Self::Reference(Reference::from_id(stream.read_i32()?)),
        })
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    bool => Bool,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<u8> => Blob,
    NaiveDateTime => DateTime,
    Reference => Reference,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::Reference(Reference::from(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_sentinel_is_unset() {
        assert!(Reference::from_id(-1).is_unset());
        assert_eq!(Reference::from_id(3), Reference::Id(3));
        assert_eq!(Reference::Unset.id(), UNASSIGNED_ID);
    }

    #[test]
    fn reference_equality_by_id() {
        assert_eq!(Reference::Unset, Reference::from_id(UNASSIGNED_ID));
        assert_ne!(Reference::Id(1), Reference::Id(2));
    }

    #[test]
    fn integer_widening() {
        assert_eq!(Value::Int8(-3).as_i64(), Some(-3));
        assert_eq!(Value::UInt32(u32::MAX).as_i64(), Some(i64::from(u32::MAX)));
        assert_eq!(Value::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(Value::Bool(true).as_i64(), None);
    }

    #[test]
    fn mismatched_kind_refuses_to_encode() {
        let mut stream = DataStream::new();
        let err = Value::from("text")
            .encode(&AttributeKind::Int16, &mut stream)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        assert!(stream.is_empty());
    }

    #[test]
    fn reference_encodes_as_id() {
        let mut stream = DataStream::new();
        let kind = AttributeKind::Reference("participants".into());
        Value::Reference(Reference::Id(9)).encode(&kind, &mut stream).unwrap();
        Value::Reference(Reference::Unset).encode(&kind, &mut stream).unwrap();
        assert_eq!(stream.as_slice(), &[0, 0, 0, 9, 0xff, 0xff, 0xff, 0xff]);

        assert_eq!(Value::decode(&kind, &mut stream).unwrap(), Value::Reference(Reference::Id(9)));
        assert!(Value::decode(&kind, &mut stream)
            .unwrap()
            .as_reference()
            .unwrap()
            .is_unset());
    }
}

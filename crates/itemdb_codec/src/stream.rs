//! Growable byte stream with big-endian primitive encodings.

use crate::error::{CodecError, CodecResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Largest blob (or UTF-8 string) the 16-bit length prefix can describe.
pub const MAX_BLOB_LEN: usize = u16::MAX as usize;

/// Encoded size of a date-time: 16-bit year plus five 8-bit fields.
pub const DATE_TIME_LEN: usize = 7;

/// A byte stream where writes append to the back and reads consume from
/// the front.
///
/// The same stream can be fed incrementally (for example from a socket)
/// and drained as complete values become available. Reads that fail with
/// [`CodecError::UnexpectedEof`] leave the stream untouched.
///
/// # Example
///
/// ```
/// use itemdb_codec::DataStream;
///
/// let mut stream = DataStream::new();
/// stream.write_i16(-2);
/// stream.write_string("hello").unwrap();
///
/// assert_eq!(stream.read_i16().unwrap(), -2);
/// assert_eq!(stream.read_string().unwrap(), "hello");
/// assert!(stream.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataStream {
    buffer: BytesMut,
}

macro_rules! fixed_width {
    ($($write:ident, $read:ident, $put:ident, $get:ident, $ty:ty;)*) => {
        $(
            #[doc = concat!("Appends a big-endian `", stringify!($ty), "`.")]
            pub fn $write(&mut self, value: $ty) {
                self.buffer.$put(value);
            }

            #[doc = concat!("Consumes a big-endian `", stringify!($ty), "` from the front.")]
            pub fn $read(&mut self) -> CodecResult<$ty> {
                self.ensure(std::mem::size_of::<$ty>())?;
                Ok(self.buffer.$get())
            }
        )*
    };
}

impl DataStream {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty stream with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Creates a stream holding a copy of `data`, ready to be read.
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            buffer: BytesMut::from(data),
        }
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if there are no unread bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The unread bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Converts the stream into its unread bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }

    /// Appends raw bytes without a length prefix.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Consumes exactly `len` raw bytes from the front.
    pub fn read_bytes(&mut self, len: usize) -> CodecResult<Bytes> {
        self.ensure(len)?;
        Ok(self.buffer.split_to(len).freeze())
    }

    /// Consumes every unread byte.
    pub fn take_remaining(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Reads a big-endian `u16` without consuming it.
    #[must_use]
    pub fn peek_u16(&self) -> Option<u16> {
        match self.buffer.get(..2) {
            Some(&[hi, lo]) => Some(u16::from_be_bytes([hi, lo])),
            _ => None,
        }
    }

    fixed_width! {
        write_u8, read_u8, put_u8, get_u8, u8;
        write_i8, read_i8, put_i8, get_i8, i8;
        write_u16, read_u16, put_u16, get_u16, u16;
        write_i16, read_i16, put_i16, get_i16, i16;
        write_u32, read_u32, put_u32, get_u32, u32;
        write_i32, read_i32, put_i32, get_i32, i32;
        write_u64, read_u64, put_u64, get_u64, u64;
        write_i64, read_i64, put_i64, get_i64, i64;
        write_f32, read_f32, put_f32, get_f32, f32;
        write_f64, read_f64, put_f64, get_f64, f64;
    }

    /// Appends a boolean as a single byte.
    pub fn write_bool(&mut self, value: bool) {
        self.buffer.put_u8(u8::from(value));
    }

    /// Consumes a boolean byte.
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        self.ensure(1)?;
        match self.buffer[0] {
            0 => {
                self.buffer.advance(1);
                Ok(false)
            }
            1 => {
                self.buffer.advance(1);
                Ok(true)
            }
            other => Err(CodecError::InvalidBool(other)),
        }
    }

    /// Appends a blob with a 16-bit length prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::BlobTooLong`] if the blob exceeds [`MAX_BLOB_LEN`].
    pub fn write_blob(&mut self, data: &[u8]) -> CodecResult<()> {
        let len = u16::try_from(data.len()).map_err(|_| CodecError::BlobTooLong { len: data.len() })?;
        self.buffer.reserve(2 + data.len());
        self.buffer.put_u16(len);
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Consumes a length-prefixed blob.
    ///
    /// The prefix is only consumed once the whole blob is buffered.
    pub fn read_blob(&mut self) -> CodecResult<Vec<u8>> {
        let len = match self.peek_u16() {
            Some(len) => usize::from(len),
            None => {
                return Err(CodecError::UnexpectedEof {
                    needed: 2,
                    available: self.len(),
                })
            }
        };
        self.ensure(2 + len)?;
        self.buffer.advance(2);
        Ok(self.buffer.split_to(len).to_vec())
    }

    /// Appends a UTF-8 string as a blob.
    pub fn write_string(&mut self, value: &str) -> CodecResult<()> {
        self.write_blob(value.as_bytes())
    }

    /// Consumes a UTF-8 string blob.
    pub fn read_string(&mut self) -> CodecResult<String> {
        String::from_utf8(self.read_blob()?).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Appends a date-time as year, month, day, hour, minute, second.
    ///
    /// Sub-second precision is dropped.
    ///
    /// # Errors
    ///
    /// Fails if the year is outside `0..=65535`.
    pub fn write_date_time(&mut self, value: &NaiveDateTime) -> CodecResult<()> {
        let year = u16::try_from(value.year())
            .map_err(|_| CodecError::invalid_date_time(format!("year {} out of range", value.year())))?;
        self.buffer.reserve(DATE_TIME_LEN);
        self.buffer.put_u16(year);
        // chrono guarantees these fields fit in a byte
        for field in [value.month(), value.day(), value.hour(), value.minute(), value.second()] {
            self.buffer.put_u8(field as u8);
        }
        Ok(())
    }

    /// Consumes a date-time.
    pub fn read_date_time(&mut self) -> CodecResult<NaiveDateTime> {
        self.ensure(DATE_TIME_LEN)?;
        let year = self.buffer.get_u16();
        let month = self.buffer.get_u8();
        let day = self.buffer.get_u8();
        let hour = self.buffer.get_u8();
        let minute = self.buffer.get_u8();
        let second = self.buffer.get_u8();

        NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
            .and_then(|date| date.and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second)))
            .ok_or_else(|| {
                CodecError::invalid_date_time(format!(
                    "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
                ))
            })
    }

    fn ensure(&self, needed: usize) -> CodecResult<()> {
        if self.buffer.len() < needed {
            return Err(CodecError::UnexpectedEof {
                needed,
                available: self.buffer.len(),
            });
        }
        Ok(())
    }
}

impl From<&[u8]> for DataStream {
    fn from(data: &[u8]) -> Self {
        Self::from_slice(data)
    }
}

impl From<Bytes> for DataStream {
    fn from(data: Bytes) -> Self {
        Self {
            buffer: BytesMut::from(&data[..]),
        }
    }
}

impl AsRef<[u8]> for DataStream {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn integers_are_big_endian() {
        let mut stream = DataStream::new();
        stream.write_u16(0x0102);
        stream.write_i32(-2);
        assert_eq!(stream.as_slice(), &[0x01, 0x02, 0xff, 0xff, 0xff, 0xfe]);
    }

    #[test]
    fn reads_consume_from_front() {
        let mut stream = DataStream::new();
        stream.write_u8(7);
        stream.write_i64(i64::MIN);
        assert_eq!(stream.len(), 9);
        assert_eq!(stream.read_u8().unwrap(), 7);
        assert_eq!(stream.len(), 8);
        assert_eq!(stream.read_i64().unwrap(), i64::MIN);
        assert!(stream.is_empty());
    }

    #[test]
    fn short_read_leaves_stream_untouched() {
        let mut stream = DataStream::from_slice(&[0x00, 0x05, b'a', b'b']);
        let err = stream.read_blob().unwrap_err();
        assert!(err.is_incomplete());
        assert_eq!(stream.len(), 4);

        stream.write_bytes(b"cde");
        assert_eq!(stream.read_blob().unwrap(), b"abcde");
    }

    #[test]
    fn empty_string_encodes_as_zero_length() {
        let mut stream = DataStream::new();
        stream.write_string("").unwrap();
        assert_eq!(stream.as_slice(), &[0, 0]);
        assert_eq!(stream.read_string().unwrap(), "");
    }

    #[test]
    fn oversized_blob_rejected() {
        let mut stream = DataStream::new();
        let data = vec![0u8; MAX_BLOB_LEN + 1];
        assert_eq!(
            stream.write_blob(&data),
            Err(CodecError::BlobTooLong { len: MAX_BLOB_LEN + 1 })
        );
        assert!(stream.is_empty());

        stream.write_blob(&data[..MAX_BLOB_LEN]).unwrap();
        assert_eq!(stream.read_blob().unwrap().len(), MAX_BLOB_LEN);
    }

    #[test]
    fn invalid_utf8_rejected() {
        let mut stream = DataStream::new();
        stream.write_blob(&[0xff, 0xfe]).unwrap();
        assert_eq!(stream.read_string(), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn date_time_layout() {
        let mut stream = DataStream::new();
        stream.write_date_time(&at(2024, 2, 29, 23, 58, 59)).unwrap();
        assert_eq!(stream.as_slice(), &[0x07, 0xe8, 2, 29, 23, 58, 59]);
        assert_eq!(stream.read_date_time().unwrap(), at(2024, 2, 29, 23, 58, 59));
    }

    #[test]
    fn date_time_drops_subseconds() {
        let precise = at(2020, 1, 1, 0, 0, 59)
            .with_nanosecond(123_000_000)
            .unwrap();
        let mut stream = DataStream::new();
        stream.write_date_time(&precise).unwrap();
        assert_eq!(stream.read_date_time().unwrap(), at(2020, 1, 1, 0, 0, 59));
    }

    #[test]
    fn impossible_date_rejected() {
        let mut stream = DataStream::from_slice(&[0x07, 0xe7, 2, 30, 0, 0, 0]);
        assert!(matches!(
            stream.read_date_time(),
            Err(CodecError::InvalidDateTime { .. })
        ));
    }

    #[test]
    fn negative_year_rejected() {
        let mut stream = DataStream::new();
        assert!(stream.write_date_time(&at(-1, 1, 1, 0, 0, 0)).is_err());
    }

    #[test]
    fn bool_bytes() {
        let mut stream = DataStream::from_slice(&[1, 0, 2]);
        assert!(stream.read_bool().unwrap());
        assert!(!stream.read_bool().unwrap());
        assert_eq!(stream.read_bool(), Err(CodecError::InvalidBool(2)));
    }

    #[test]
    fn peek_does_not_consume() {
        let stream = DataStream::from_slice(&[0x12, 0x34, 0x56]);
        assert_eq!(stream.peek_u16(), Some(0x1234));
        assert_eq!(stream.len(), 3);
        assert_eq!(DataStream::from_slice(&[1]).peek_u16(), None);
    }

    #[test]
    fn floats_roundtrip_bit_exact() {
        let mut stream = DataStream::new();
        stream.write_f32(f32::MIN_POSITIVE);
        stream.write_f64(-0.0);
        assert_eq!(stream.read_f32().unwrap().to_bits(), f32::MIN_POSITIVE.to_bits());
        assert_eq!(stream.read_f64().unwrap().to_bits(), (-0.0f64).to_bits());
    }
}

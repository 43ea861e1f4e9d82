//! Bounds-checked little-endian reader and writer.
//!
//! Every container and packet parser in the crate goes through these two
//! types. Reads never return partial data: running past the end of the
//! buffer yields [`TrccError::OutOfData`].

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{Result, TrccError};

// =============================================================================
// Reader
// =============================================================================

/// Sequential reader over a borrowed byte buffer.
#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// True if at least `n` more bytes can be read.
    pub fn has_bytes(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if !self.has_bytes(n) {
            return Err(TrccError::OutOfData {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Read a string prefixed by a single length byte.
    ///
    /// A declared length running past the buffer end yields an empty string
    /// and leaves the cursor just after the length byte.
    pub fn read_length_prefixed_string(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        if !self.has_bytes(len) {
            return Ok(String::new());
        }
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a 7-bit variable-length integer (low 7 bits first, bit 7 = continuation).
    pub fn read_7bit_len(&mut self) -> Result<usize> {
        let mut value: usize = 0;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as usize) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 28 {
                return Err(TrccError::CorruptContainer(
                    "7-bit length prefix longer than 5 bytes".into(),
                ));
            }
        }
    }

    /// Read a string with a 7-bit variable-length prefix.
    pub fn read_7bit_string(&mut self) -> Result<String> {
        let len = self.read_7bit_len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| TrccError::CorruptContainer(format!("invalid UTF-8 string: {}", e)))
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Little-endian writer building an owned buffer.
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    // Writes into a Vec cannot fail, so the io::Result from byteorder is dropped.

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    pub fn write_i32(&mut self, value: i32) {
        let _ = self.buf.write_i32::<LittleEndian>(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        let _ = self.buf.write_u32::<LittleEndian>(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        let _ = self.buf.write_f32::<LittleEndian>(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append `count` copies of `byte`.
    pub fn write_fill(&mut self, byte: u8, count: usize) {
        self.buf.resize(self.buf.len() + count, byte);
    }

    /// Write a string with a single length byte. Longer strings are rejected.
    pub fn write_length_prefixed_string(&mut self, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        let len = u8::try_from(bytes.len()).map_err(|_| {
            TrccError::InvalidInput(format!(
                "string of {} bytes does not fit a 1-byte length",
                bytes.len()
            ))
        })?;
        self.write_u8(len);
        self.write_bytes(bytes);
        Ok(())
    }

    pub fn write_7bit_len(&mut self, mut value: usize) {
        while value >= 0x80 {
            self.write_u8((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        self.write_u8(value as u8);
    }

    pub fn write_7bit_string(&mut self, value: &str) {
        self.write_7bit_len(value.len());
        self.write_bytes(value.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_little_endian() {
        let mut w = BinaryWriter::new();
        w.write_i32(-2);
        w.write_u8(7);
        w.write_bool(true);
        w.write_f32(12.5);
        let buf = w.into_inner();
        assert_eq!(&buf[..4], &[0xFE, 0xFF, 0xFF, 0xFF]);

        let mut c = BinaryCursor::new(&buf);
        assert_eq!(c.read_i32().unwrap(), -2);
        assert_eq!(c.read_u8().unwrap(), 7);
        assert!(c.read_bool().unwrap());
        assert_eq!(c.read_f32().unwrap(), 12.5);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn test_read_past_end_is_out_of_data() {
        let buf = [1u8, 2, 3];
        let mut c = BinaryCursor::new(&buf);
        match c.read_i32() {
            Err(TrccError::OutOfData { needed, remaining }) => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 3);
            }
            other => panic!("unexpected: {:?}", other),
        }
        // A failed read does not advance.
        assert_eq!(c.position(), 0);
        assert!(c.skip(3).is_ok());
        assert!(c.read_u8().is_err());
    }

    #[test]
    fn test_short_string_declared_too_long_is_empty() {
        let buf = [10u8, b'a', b'b'];
        let mut c = BinaryCursor::new(&buf);
        assert_eq!(c.read_length_prefixed_string().unwrap(), "");
        assert_eq!(c.position(), 1);
    }

    #[test]
    fn test_length_prefixed_string() {
        let mut w = BinaryWriter::new();
        w.write_length_prefixed_string("Arial").unwrap();
        let buf = w.into_inner();
        assert_eq!(buf[0], 5);
        assert_eq!(BinaryCursor::new(&buf).read_length_prefixed_string().unwrap(), "Arial");

        let long = "x".repeat(256);
        assert!(BinaryWriter::new().write_length_prefixed_string(&long).is_err());
    }

    #[test]
    fn test_7bit_string_lengths() {
        for len in [0usize, 2, 200, 20_000] {
            let s: String = (0..len).map(|i| (b'a' + (i % 26) as u8) as char).collect();
            let mut w = BinaryWriter::new();
            w.write_7bit_string(&s);
            let buf = w.into_inner();

            let expected_prefix = match len {
                0..=127 => 1,
                128..=16_383 => 2,
                _ => 3,
            };
            assert_eq!(buf.len(), len + expected_prefix, "length {}", len);

            let mut c = BinaryCursor::new(&buf);
            assert_eq!(c.read_7bit_string().unwrap(), s);
            assert_eq!(c.remaining(), 0);
        }
    }

    #[test]
    fn test_7bit_prefix_bytes() {
        let mut w = BinaryWriter::new();
        w.write_7bit_len(200);
        assert_eq!(w.into_inner(), vec![0xC8, 0x01]);
    }

    #[test]
    fn test_7bit_string_truncated() {
        let buf = [5u8, b'a'];
        assert!(matches!(
            BinaryCursor::new(&buf).read_7bit_string(),
            Err(TrccError::OutOfData { .. })
        ));
    }
}

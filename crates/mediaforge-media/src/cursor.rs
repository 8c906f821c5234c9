//! Streaming byte cursor.
//!
//! Input arrives in arbitrary chunks through [`ByteCursor::feed`]. Every read
//! is atomic: it either consumes exactly the requested bytes or fails without
//! moving the cursor. While more input may still arrive, a short read is
//! [`Error::InsufficientData`]; after [`ByteCursor::finish`] it becomes
//! [`Error::UnexpectedEof`].
//!
//! Consumed bytes are dropped on the next `feed`, so the buffer only ever
//! holds the element currently being parsed plus whatever the producer has
//! delivered ahead of it.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Decoded EBML variable-length integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vint {
    pub value: u64,
    /// Encoded length in bytes (1..=8)
    pub length: u8,
}

impl Vint {
    /// All value bits set: the reserved "unknown size" marker.
    pub fn is_unknown_size(&self) -> bool {
        self.value == (1u64 << (7 * self.length as u32)) - 1
    }
}

/// Offset-tracked reader over an append-only byte window.
#[derive(Debug, Default)]
pub struct ByteCursor {
    buf: BytesMut,
    /// Read position within `buf`
    pos: usize,
    /// Absolute offset of `buf[0]`
    base: u64,
    finished: bool,
}

impl ByteCursor {
    /// Empty cursor awaiting input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cursor over a complete, in-memory input.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::from_bytes_at(data, 0)
    }

    /// Cursor over a complete input whose first byte sits at `offset` in some
    /// larger stream, so offsets in errors stay absolute.
    pub fn from_bytes_at(data: &[u8], offset: u64) -> Self {
        Self {
            buf: BytesMut::from(data),
            pos: 0,
            base: offset,
            finished: true,
        }
    }

    /// Append input.
    pub fn feed(&mut self, data: &[u8]) {
        if self.pos > 0 {
            self.buf.advance(self.pos);
            self.base += self.pos as u64;
            self.pos = 0;
        }
        self.buf.extend_from_slice(data);
    }

    /// Mark the end of input.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// No more input will arrive and everything buffered has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.finished && self.bytes_remaining() == 0
    }

    /// Absolute number of bytes consumed since the start of the session.
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Buffered, unconsumed bytes.
    pub fn bytes_remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// All buffered, unconsumed bytes.
    pub fn available(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Fail unless `n` bytes are buffered.
    pub fn ensure(&self, n: usize) -> Result<()> {
        let available = self.bytes_remaining();
        if available >= n {
            Ok(())
        } else if self.finished {
            Err(Error::UnexpectedEof {
                offset: self.offset(),
                needed: n - available,
            })
        } else {
            Err(Error::InsufficientData {
                needed: n,
                available,
            })
        }
    }

    /// Run a multi-read operation. If it runs out of buffered input, the
    /// cursor is rewound to where the operation started.
    pub fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let start = self.pos;
        let result = f(self);
        if matches!(&result, Err(e) if e.is_suspension()) {
            self.pos = start;
        }
        result
    }

    /// Run a multi-read operation and rewind afterwards, whatever the outcome.
    pub fn peek<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let start = self.pos;
        let result = f(self);
        self.pos = start;
        result
    }

    pub fn peek_slice(&self, n: usize) -> Result<&[u8]> {
        self.ensure(n)?;
        Ok(&self.buf[self.pos..self.pos + n])
    }

    pub fn peek_u8(&self) -> Result<u8> {
        Ok(self.peek_slice(1)?[0])
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    pub fn get_u24(&mut self) -> Result<u32> {
        let [a, b, c] = self.take()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take()?))
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take()?))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    pub fn get_u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub fn get_u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    /// Four-character code.
    pub fn get_fourcc(&mut self) -> Result<[u8; 4]> {
        self.take()
    }

    /// Unsigned big-endian integer of `n` bytes (0..=8).
    pub fn get_uint_n(&mut self, n: usize) -> Result<u64> {
        debug_assert!(n <= 8);
        let bytes = self.peek_slice(n)?;
        let value = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        self.pos += n;
        Ok(value)
    }

    /// Copy out the next `n` bytes.
    pub fn get_slice(&mut self, n: usize) -> Result<Bytes> {
        let slice = Bytes::copy_from_slice(self.peek_slice(n)?);
        self.pos += n;
        Ok(slice)
    }

    /// Next `n` bytes as text (lossy UTF-8).
    pub fn get_byte_string(&mut self, n: usize) -> Result<String> {
        let text = String::from_utf8_lossy(self.peek_slice(n)?).into_owned();
        self.pos += n;
        Ok(text)
    }

    /// Skip exactly `n` bytes.
    pub fn discard(&mut self, n: u64) -> Result<()> {
        let n = usize::try_from(n).map_err(|_| Error::UnexpectedEof {
            offset: self.offset(),
            needed: usize::MAX,
        })?;
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// Skip up to `n` bytes of what is buffered; returns how many were skipped.
    pub fn discard_available(&mut self, n: u64) -> u64 {
        let skipped = (self.bytes_remaining() as u64).min(n);
        self.pos += skipped as usize;
        skipped
    }

    /// Length of a variable-length code from its leading byte.
    fn vint_length(&self, first: u8) -> Result<usize> {
        if first == 0 {
            return Err(Error::MalformedVarint {
                offset: self.offset(),
            });
        }
        Ok(first.leading_zeros() as usize + 1)
    }

    /// EBML variable-length integer: the count of leading zero bits gives the
    /// length, the marker bit is dropped from the value.
    pub fn get_vint(&mut self) -> Result<Vint> {
        let length = self.vint_length(self.peek_u8()?)?;
        let bytes = self.peek_slice(length)?;

        let mut value = (bytes[0] as u64) & (0xFF >> length);
        for &b in &bytes[1..] {
            value = (value << 8) | b as u64;
        }

        self.pos += length;
        Ok(Vint {
            value,
            length: length as u8,
        })
    }

    /// Matroska element id: same length scheme as a vint, but the marker bit
    /// is part of the id.
    pub fn get_matroska_id(&mut self) -> Result<u64> {
        let length = self.vint_length(self.peek_u8()?)?;
        self.get_uint_n(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_width_reads() {
        let mut cursor = ByteCursor::from_bytes(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        assert_eq!(cursor.get_u8().unwrap(), 0x01);
        assert_eq!(cursor.get_u16().unwrap(), 0x0203);
        assert_eq!(cursor.get_u24().unwrap(), 0x040506);
        assert_eq!(cursor.offset(), 6);
        assert_eq!(cursor.bytes_remaining(), 1);
    }

    #[test]
    fn test_short_read_does_not_move_offset() {
        let mut cursor = ByteCursor::new();
        cursor.feed(&[0x00, 0x01]);

        match cursor.get_u32() {
            Err(Error::InsufficientData { needed, available }) => {
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(cursor.offset(), 0);

        cursor.feed(&[0x02, 0x03]);
        assert_eq!(cursor.get_u32().unwrap(), 0x00010203);
    }

    #[test]
    fn test_short_read_after_finish_is_eof() {
        let mut cursor = ByteCursor::new();
        cursor.feed(&[0xAA]);
        cursor.finish();
        assert!(matches!(
            cursor.get_u16(),
            Err(Error::UnexpectedEof { offset: 0, needed: 1 })
        ));
    }

    #[test]
    fn test_vint_zero_is_single_byte() {
        let mut cursor = ByteCursor::from_bytes(&[0x80]);
        let vint = cursor.get_vint().unwrap();
        assert_eq!(vint.value, 0);
        assert_eq!(vint.length, 1);
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn test_vint_multi_byte() {
        let mut cursor = ByteCursor::from_bytes(&[0x40, 0x02, 0x20, 0x00, 0x00, 0x05]);
        assert_eq!(cursor.get_vint().unwrap().value, 2);
        assert_eq!(cursor.get_vint().unwrap().value, 5);
    }

    #[test]
    fn test_vint_unknown_size() {
        let mut cursor = ByteCursor::from_bytes(&[0xFF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(cursor.get_vint().unwrap().is_unknown_size());
        assert!(cursor.get_vint().unwrap().is_unknown_size());
    }

    #[test]
    fn test_zero_leading_byte_is_malformed() {
        let mut cursor = ByteCursor::from_bytes(&[0x00, 0x81]);
        assert!(matches!(
            cursor.get_vint(),
            Err(Error::MalformedVarint { offset: 0 })
        ));
        assert!(matches!(
            cursor.get_matroska_id(),
            Err(Error::MalformedVarint { .. })
        ));
    }

    #[test]
    fn test_five_byte_id_keeps_marker() {
        let bytes = [0x08, 0x12, 0x34, 0x56, 0x78];

        let mut cursor = ByteCursor::from_bytes(&bytes);
        assert_eq!(cursor.get_matroska_id().unwrap(), 0x08_1234_5678);

        let mut cursor = ByteCursor::from_bytes(&bytes);
        let vint = cursor.get_vint().unwrap();
        assert_eq!(vint.value, 0x1234_5678);
        assert_eq!(vint.length, 5);
    }

    #[test]
    fn test_segment_id() {
        let mut cursor = ByteCursor::from_bytes(&[0x18, 0x53, 0x80, 0x67]);
        assert_eq!(cursor.get_matroska_id().unwrap(), 0x18538067);
    }

    #[test]
    fn test_attempt_rewinds_on_suspension() {
        let mut cursor = ByteCursor::new();
        cursor.feed(&[0x01, 0x02, 0x03]);

        let result = cursor.attempt(|c| {
            c.get_u16()?;
            c.get_u16()
        });
        assert!(result.unwrap_err().is_suspension());
        assert_eq!(cursor.offset(), 0);

        cursor.feed(&[0x04]);
        let value = cursor.attempt(|c| {
            c.get_u16()?;
            c.get_u16()
        });
        assert_eq!(value.unwrap(), 0x0304);
        assert_eq!(cursor.offset(), 4);
    }

    #[test]
    fn test_peek_never_consumes() {
        let mut cursor = ByteCursor::from_bytes(&[0x00, 0x00, 0x00, 0x08]);
        assert_eq!(cursor.peek(|c| c.get_u32()).unwrap(), 8);
        assert_eq!(cursor.offset(), 0);
    }

    #[test]
    fn test_feed_compacts_but_keeps_absolute_offset() {
        let mut cursor = ByteCursor::new();
        cursor.feed(&[1, 2, 3, 4]);
        cursor.discard(3).unwrap();
        cursor.feed(&[5, 6]);
        assert_eq!(cursor.offset(), 3);
        assert_eq!(cursor.available(), &[4, 5, 6]);
    }

    #[test]
    fn test_discard_available() {
        let mut cursor = ByteCursor::new();
        cursor.feed(&[0; 10]);
        assert_eq!(cursor.discard_available(100), 10);
        assert_eq!(cursor.offset(), 10);
        assert!(cursor.discard(1).unwrap_err().is_suspension());
    }
}

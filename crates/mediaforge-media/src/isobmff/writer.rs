//! Box serialization primitives.
//!
//! Boxes are written into one `BytesMut`: `begin_box` emits a zero size
//! placeholder and `end_box` patches it once the content length is known.

use bytes::{BufMut, Bytes, BytesMut};

use super::atoms::BoxType;
use crate::error::{Error, Result};

/// 16.16 fixed point 1.0 and -1.0
pub(crate) const FIXED_ONE: u32 = 0x0001_0000;
pub(crate) const FIXED_MINUS_ONE: u32 = 0xFFFF_0000;
/// 2.30 fixed point 1.0
const FIXED_W: u32 = 0x4000_0000;

/// Identity transformation matrix (16.16 / 2.30 fixed point).
pub const IDENTITY_MATRIX: [u32; 9] = [FIXED_ONE, 0, 0, 0, FIXED_ONE, 0, 0, 0, FIXED_W];

/// Track matrix for a clockwise rotation; anything other than a quarter turn
/// gives the identity.
pub fn rotation_matrix(rotation: u32) -> [u32; 9] {
    match rotation {
        90 => [0, FIXED_ONE, 0, FIXED_MINUS_ONE, 0, 0, 0, 0, FIXED_W],
        180 => [FIXED_MINUS_ONE, 0, 0, 0, FIXED_MINUS_ONE, 0, 0, 0, FIXED_W],
        270 => [0, FIXED_MINUS_ONE, 0, FIXED_ONE, 0, 0, 0, 0, FIXED_W],
        _ => IDENTITY_MATRIX,
    }
}

#[derive(Debug, Default)]
pub struct BoxWriter {
    buf: BytesMut,
    /// Start offsets of boxes not yet closed
    open: Vec<usize>,
}

impl BoxWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            open: Vec::new(),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn begin_box(&mut self, box_type: BoxType) {
        self.open.push(self.buf.len());
        self.buf.put_u32(0); // placeholder size
        self.buf.put_slice(&box_type.0);
    }

    /// Box with a version/flags word.
    pub fn begin_full_box(&mut self, box_type: BoxType, version: u8, flags: u32) {
        self.begin_box(box_type);
        self.buf.put_u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
    }

    pub fn end_box(&mut self) -> Result<()> {
        let start = self
            .open
            .pop()
            .ok_or_else(|| Error::invalid_mp4("end_box without an open box"))?;
        let size = u32::try_from(self.buf.len() - start)
            .map_err(|_| Error::invalid_mp4("box larger than 4 GiB"))?;
        self.buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
        Ok(())
    }

    /// A leaf box in one call.
    pub fn write_box(&mut self, box_type: BoxType, content: &[u8]) -> Result<()> {
        self.begin_box(box_type);
        self.buf.put_slice(content);
        self.end_box()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.put_u64(v);
    }

    pub fn put_slice(&mut self, v: &[u8]) {
        self.buf.put_slice(v);
    }

    pub fn put_zeros(&mut self, n: usize) {
        self.buf.put_bytes(0, n);
    }

    pub fn put_matrix(&mut self, matrix: &[u32; 9]) {
        for v in matrix {
            self.buf.put_u32(*v);
        }
    }

    pub fn finish(self) -> Result<Bytes> {
        if !self.open.is_empty() {
            return Err(Error::invalid_mp4(format!(
                "{} boxes left open",
                self.open.len()
            )));
        }
        Ok(self.buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_are_patched() {
        let mut w = BoxWriter::new();
        w.begin_box(BoxType::MOOV);
        w.write_box(BoxType::FREE, &[1, 2, 3]).unwrap();
        w.end_box().unwrap();
        let data = w.finish().unwrap();

        assert_eq!(&data[0..8], &[0, 0, 0, 19, b'm', b'o', b'o', b'v']);
        assert_eq!(&data[8..16], &[0, 0, 0, 11, b'f', b'r', b'e', b'e']);
    }

    #[test]
    fn test_full_box_header() {
        let mut w = BoxWriter::new();
        w.begin_full_box(BoxType::TKHD, 1, 7);
        w.end_box().unwrap();
        assert_eq!(&w.finish().unwrap()[8..12], &[1, 0, 0, 7]);
    }

    #[test]
    fn test_unbalanced_boxes_rejected() {
        let mut w = BoxWriter::new();
        assert!(w.end_box().is_err());
        w.begin_box(BoxType::TRAK);
        assert!(w.finish().is_err());
    }
}

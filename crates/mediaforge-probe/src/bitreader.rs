//! Bit-level reader for codec parameter sets.
//!
//! Wraps `bitstream_io`'s big-endian reader with the Exp-Golomb codes used by
//! H.264/HEVC (`ue(v)`, `se(v)`) and attaches the field name and bit offset to
//! every truncation error, so a malformed SPS reports what was missing.

use bitstream_io::{BigEndian, BitRead, BitReader as IoBitReader};
use std::io::Cursor;

use crate::error::{ProbeError, Result};

/// MSB-first bit reader over an RBSP byte slice.
pub struct BitReader<'a> {
    inner: IoBitReader<Cursor<&'a [u8]>, BigEndian>,
    position: u64,
    len_bits: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: IoBitReader::endian(Cursor::new(data), BigEndian),
            position: 0,
            len_bits: data.len() as u64 * 8,
        }
    }

    /// Bits consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn bits_remaining(&self) -> u64 {
        self.len_bits.saturating_sub(self.position)
    }

    fn truncated(&self, field: &'static str) -> ProbeError {
        ProbeError::Truncated {
            field,
            bit_offset: self.position,
        }
    }

    /// Read `n` bits (0..=32) as an unsigned value.
    pub fn read_bits(&mut self, n: u32, field: &'static str) -> Result<u32> {
        debug_assert!(n <= 32);
        if n == 0 {
            return Ok(0);
        }
        if self.bits_remaining() < n as u64 {
            return Err(self.truncated(field));
        }
        let value = self
            .inner
            .read::<u32>(n)
            .map_err(|_| self.truncated(field))?;
        self.position += n as u64;
        Ok(value)
    }

    /// Read a single-bit flag.
    pub fn read_flag(&mut self, field: &'static str) -> Result<bool> {
        if self.bits_remaining() == 0 {
            return Err(self.truncated(field));
        }
        let bit = self.inner.read_bit().map_err(|_| self.truncated(field))?;
        self.position += 1;
        Ok(bit)
    }

    /// Read an 8-bit field.
    pub fn read_u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.read_bits(8, field)? as u8)
    }

    /// Skip `n` bits.
    pub fn skip_bits(&mut self, n: u32, field: &'static str) -> Result<()> {
        if self.bits_remaining() < n as u64 {
            return Err(self.truncated(field));
        }
        self.inner.skip(n).map_err(|_| self.truncated(field))?;
        self.position += n as u64;
        Ok(())
    }

    /// Read an unsigned Exp-Golomb coded value, `ue(v)`.
    pub fn read_ue(&mut self, field: &'static str) -> Result<u32> {
        let mut leading_zeros = 0u32;
        while !self.read_flag(field)? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(ProbeError::invalid(format!(
                    "Exp-Golomb prefix too long for {}",
                    field
                )));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let suffix = self.read_bits(leading_zeros, field)?;
        Ok(((1u64 << leading_zeros) - 1 + suffix as u64) as u32)
    }

    /// Read a signed Exp-Golomb coded value, `se(v)`.
    pub fn read_se(&mut self, field: &'static str) -> Result<i32> {
        let code = self.read_ue(field)? as i64;
        let value = if code % 2 == 1 {
            (code + 1) / 2
        } else {
            -(code / 2)
        };
        Ok(value as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_reader_read_bits() {
        let data = [0b10110100, 0b01010101];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read_bits(4, "a").unwrap(), 0b1011);
        assert_eq!(reader.read_bits(4, "b").unwrap(), 0b0100);
        assert_eq!(reader.read_bits(8, "c").unwrap(), 0b01010101);
        assert_eq!(reader.position(), 16);
    }

    #[test]
    fn test_bit_reader_read_ue() {
        // 1 -> 0, 010 -> 1, 011 -> 2, 00100 -> 3
        let data = [0b10100110, 0b01000000];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read_ue("x").unwrap(), 0);
        assert_eq!(reader.read_ue("x").unwrap(), 1);
        assert_eq!(reader.read_ue("x").unwrap(), 2);
        assert_eq!(reader.read_ue("x").unwrap(), 3);
    }

    #[test]
    fn test_bit_reader_read_se() {
        // codes 1, 2, 3, 4 -> +1, -1, +2, -2
        // 010 011 00100 00101
        let data = [0b01001100, 0b10000101];
        let mut reader = BitReader::new(&data);

        assert_eq!(reader.read_se("x").unwrap(), 1);
        assert_eq!(reader.read_se("x").unwrap(), -1);
        assert_eq!(reader.read_se("x").unwrap(), 2);
        assert_eq!(reader.read_se("x").unwrap(), -2);
    }

    #[test]
    fn test_truncation_reports_field_and_offset() {
        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        reader.skip_bits(6, "skip").unwrap();

        match reader.read_bits(4, "level_idc") {
            Err(ProbeError::Truncated { field, bit_offset }) => {
                assert_eq!(field, "level_idc");
                assert_eq!(bit_offset, 6);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_all_zero_prefix_is_rejected() {
        let data = [0u8; 8];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_ue("x").is_err());
    }
}

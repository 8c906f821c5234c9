//! Opus identification header
//!
//! Matroska stores the Ogg `OpusHead` packet (little-endian) as CodecPrivate;
//! ISO-BMFF stores the same fields big-endian and without the magic in `dOps`.

use crate::error::{ProbeError, Result};

/// Opus always decodes at 48 kHz regardless of the input rate.
pub const OPUS_SAMPLE_RATE: u32 = 48000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusHead {
    pub version: u8,
    pub channel_count: u8,
    pub pre_skip: u16,
    /// Sample rate of the original input, informational only
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub channel_mapping_family: u8,
}

/// Parse an `OpusHead` packet.
pub fn parse_opus_head(data: &[u8]) -> Result<OpusHead> {
    if data.len() < 19 || &data[..8] != b"OpusHead" {
        return Err(ProbeError::invalid("not an OpusHead packet"));
    }

    Ok(OpusHead {
        version: data[8],
        channel_count: data[9],
        pre_skip: u16::from_le_bytes([data[10], data[11]]),
        input_sample_rate: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
        output_gain: i16::from_le_bytes([data[16], data[17]]),
        channel_mapping_family: data[18],
    })
}

/// Parse a `dOps` box payload.
pub fn parse_dops(data: &[u8]) -> Result<OpusHead> {
    if data.len() < 11 {
        return Err(ProbeError::invalid("dOps shorter than 11 bytes"));
    }

    Ok(OpusHead {
        version: data[0],
        channel_count: data[1],
        pre_skip: u16::from_be_bytes([data[2], data[3]]),
        input_sample_rate: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        output_gain: i16::from_be_bytes([data[8], data[9]]),
        channel_mapping_family: data[10],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_opus_head() {
        let mut head = b"OpusHead".to_vec();
        head.extend_from_slice(&[1, 2, 0x38, 0x01, 0x80, 0xBB, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let parsed = parse_opus_head(&head).unwrap();
        assert_eq!(parsed.channel_count, 2);
        assert_eq!(parsed.pre_skip, 312);
        assert_eq!(parsed.input_sample_rate, 48000);
    }

    #[test]
    fn test_parse_dops() {
        let dops = [0, 1, 0x01, 0x38, 0x00, 0x00, 0xAC, 0x44, 0x00, 0x00, 0x00];
        let parsed = parse_dops(&dops).unwrap();
        assert_eq!(parsed.channel_count, 1);
        assert_eq!(parsed.pre_skip, 312);
        assert_eq!(parsed.input_sample_rate, 44100);
    }

    #[test]
    fn test_rejects_bad_magic() {
        assert!(parse_opus_head(b"OpusTags___________").is_err());
    }
}

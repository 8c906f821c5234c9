//! RIFF chunk headers and the WAVE `fmt ` chunk.

use crate::cursor::ByteCursor;
use crate::error::{Error, Result};

/// Chunk id plus little-endian size.
pub const CHUNK_HEADER_SIZE: u64 = 8;

/// `WAVE_FORMAT_PCM`
pub const FORMAT_PCM: u16 = 0x0001;
/// `WAVE_FORMAT_EXTENSIBLE`; the real format is in the sub-format GUID.
pub const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Smallest `fmt ` payload (`WAVEFORMAT` plus bits per sample).
const FMT_MIN_SIZE: u32 = 16;
/// `WAVEFORMATEXTENSIBLE` payload, including `cbSize`.
const FMT_EXTENSIBLE_SIZE: u32 = 40;

/// The `RIFF` file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiffHeader {
    /// Bytes following the size field, as declared.
    pub file_size: u32,
    pub form_type: [u8; 4],
}

/// Read the 12-byte `RIFF` header. Only the `WAVE` form is accepted.
pub fn read_riff_header(cursor: &mut ByteCursor) -> Result<RiffHeader> {
    cursor.attempt(|c| {
        let magic = c.get_fourcc()?;
        if &magic != b"RIFF" {
            return Err(Error::invalid_riff(format!(
                "expected RIFF, found {}",
                String::from_utf8_lossy(&magic)
            )));
        }
        let file_size = c.get_u32_le()?;
        let form_type = c.get_fourcc()?;
        if &form_type != b"WAVE" {
            return Err(Error::unsupported(format!(
                "RIFF form type {}",
                String::from_utf8_lossy(&form_type)
            )));
        }
        Ok(RiffHeader {
            file_size,
            form_type,
        })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: [u8; 4],
    /// Payload size, excluding the pad byte
    pub size: u32,
    /// Absolute offset of the chunk id
    pub offset: u64,
}

impl ChunkHeader {
    pub fn id_str(&self) -> String {
        String::from_utf8_lossy(&self.id).into_owned()
    }

    /// Payload plus the pad byte that keeps chunks on even offsets.
    pub fn padded_size(&self) -> u64 {
        self.size as u64 + (self.size & 1) as u64
    }

    /// Offset just past the padded payload.
    pub fn end(&self) -> u64 {
        self.offset + CHUNK_HEADER_SIZE + self.padded_size()
    }
}

pub fn read_chunk_header(cursor: &mut ByteCursor) -> Result<ChunkHeader> {
    cursor.attempt(|c| {
        let offset = c.offset();
        let id = c.get_fourcc()?;
        let size = c.get_u32_le()?;
        Ok(ChunkHeader { id, size, offset })
    })
}

/// Decoded `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    /// Effective format tag; `WAVE_FORMAT_EXTENSIBLE` is resolved to its
    /// sub-format.
    pub format_tag: u16,
    pub number_of_channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    /// Bytes per frame (one sample for every channel)
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl WaveFormat {
    /// WebCodecs-style codec string for integer PCM.
    pub fn codec(&self) -> Result<&'static str> {
        if self.format_tag != FORMAT_PCM {
            return Err(Error::unsupported(format!(
                "WAVE format tag {:#06x}",
                self.format_tag
            )));
        }
        match self.bits_per_sample {
            8 => Ok("pcm-u8"),
            16 => Ok("pcm-s16"),
            24 => Ok("pcm-s24"),
            32 => Ok("pcm-s32"),
            bits => Err(Error::unsupported(format!("{}-bit PCM", bits))),
        }
    }
}

/// Parse a `fmt ` payload of `size` bytes, consuming all of it.
pub fn read_wave_format(cursor: &mut ByteCursor, size: u32) -> Result<WaveFormat> {
    if size < FMT_MIN_SIZE {
        return Err(Error::invalid_riff(format!("fmt chunk of {} bytes", size)));
    }
    let start = cursor.offset();
    let mut format_tag = cursor.get_u16_le()?;
    let number_of_channels = cursor.get_u16_le()?;
    let sample_rate = cursor.get_u32_le()?;
    let byte_rate = cursor.get_u32_le()?;
    let block_align = cursor.get_u16_le()?;
    let bits_per_sample = cursor.get_u16_le()?;

    if format_tag == FORMAT_EXTENSIBLE {
        if size < FMT_EXTENSIBLE_SIZE {
            return Err(Error::invalid_riff(format!(
                "WAVE_FORMAT_EXTENSIBLE fmt chunk of {} bytes",
                size
            )));
        }
        cursor.discard(8)?; // cbSize, valid bits, channel mask
        format_tag = cursor.get_u16_le()?; // first two bytes of the GUID
    }
    cursor.discard(size as u64 - (cursor.offset() - start))?;

    if number_of_channels == 0 || sample_rate == 0 {
        return Err(Error::invalid_riff(format!(
            "{} channels at {} Hz",
            number_of_channels, sample_rate
        )));
    }
    let frame_size = (bits_per_sample as u32).div_ceil(8) * number_of_channels as u32;
    if block_align as u32 != frame_size {
        return Err(Error::invalid_riff(format!(
            "block align {} for {} channels of {} bits",
            block_align, number_of_channels, bits_per_sample
        )));
    }

    Ok(WaveFormat {
        format_tag,
        number_of_channels,
        sample_rate,
        byte_rate,
        block_align,
        bits_per_sample,
    })
}

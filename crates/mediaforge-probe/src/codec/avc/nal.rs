//! H.264 NAL unit parsing

use bytes::Bytes;

/// H.264 NAL unit types (Table 7-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture
    NonIdrSlice,
    /// Coded slice data partition A
    SliceDataA,
    /// Coded slice data partition B
    SliceDataB,
    /// Coded slice data partition C
    SliceDataC,
    /// Coded slice of an IDR picture
    IdrSlice,
    /// Supplemental enhancement information
    Sei,
    /// Sequence parameter set
    Sps,
    /// Picture parameter set
    Pps,
    /// Access unit delimiter
    Aud,
    /// End of sequence
    EndOfSequence,
    /// End of stream
    EndOfStream,
    /// Filler data
    Filler,
    /// Sequence parameter set extension
    SpsExtension,
    /// Unknown/other
    Other(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            1 => NalUnitType::NonIdrSlice,
            2 => NalUnitType::SliceDataA,
            3 => NalUnitType::SliceDataB,
            4 => NalUnitType::SliceDataC,
            5 => NalUnitType::IdrSlice,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::Aud,
            10 => NalUnitType::EndOfSequence,
            11 => NalUnitType::EndOfStream,
            12 => NalUnitType::Filler,
            13 => NalUnitType::SpsExtension,
            v => NalUnitType::Other(v),
        }
    }
}

/// A parsed NAL unit
#[derive(Debug, Clone)]
pub struct NalUnit {
    /// NAL unit type
    pub nal_type: NalUnitType,
    /// nal_ref_idc (0 = not used for reference)
    pub nal_ref_idc: u8,
    /// Raw NAL unit data (without start code, includes the 1-byte header)
    pub data: Bytes,
}

impl NalUnit {
    /// NAL unit payload (data after the header), still with emulation prevention
    pub fn payload(&self) -> &[u8] {
        if self.data.len() > 1 {
            &self.data[1..]
        } else {
            &[]
        }
    }

    /// Whether this NAL carries slice data of a coded picture
    pub fn is_slice(&self) -> bool {
        matches!(
            self.nal_type,
            NalUnitType::NonIdrSlice
                | NalUnitType::SliceDataA
                | NalUnitType::SliceDataB
                | NalUnitType::SliceDataC
                | NalUnitType::IdrSlice
        )
    }
}

/// Extract NAL units from an Annex B byte stream (start code delimited).
///
/// Bytes before the first start code are ignored. Trailing zero bytes of a
/// NAL (the leading zero of a 4-byte start code) are not part of the unit.
pub fn extract_annex_b(data: &Bytes) -> Vec<NalUnit> {
    let mut nal_starts = Vec::new();
    let mut i = 0;

    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            nal_starts.push((i, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut units = Vec::with_capacity(nal_starts.len());
    for (idx, &(_, start)) in nal_starts.iter().enumerate() {
        let mut end = match nal_starts.get(idx + 1) {
            Some(&(next_code, _)) => next_code,
            None => data.len(),
        };
        while end > start && data[end - 1] == 0 {
            end -= 1;
        }

        if start < end {
            if let Some(unit) = parse_nal_header(data.slice(start..end)) {
                units.push(unit);
            }
        }
    }

    units
}

/// Extract NAL units from length-prefixed format (AVCC), as stored in MP4 and
/// Matroska samples.
pub fn extract_length_prefixed(data: &Bytes, length_size: usize) -> Vec<NalUnit> {
    let mut units = Vec::new();
    let mut i = 0;

    while i + length_size <= data.len() {
        let length = match length_size {
            4 => u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]) as usize,
            2 => u16::from_be_bytes([data[i], data[i + 1]]) as usize,
            1 => data[i] as usize,
            _ => break,
        };

        i += length_size;

        if length == 0 || i + length > data.len() {
            break;
        }

        if let Some(unit) = parse_nal_header(data.slice(i..i + length)) {
            units.push(unit);
        }

        i += length;
    }

    units
}

/// Parse the 1-byte NAL header:
/// forbidden_zero_bit (1), nal_ref_idc (2), nal_unit_type (5)
fn parse_nal_header(data: Bytes) -> Option<NalUnit> {
    let header = *data.first()?;
    if header & 0x80 != 0 {
        return None;
    }

    Some(NalUnit {
        nal_type: NalUnitType::from(header & 0x1F),
        nal_ref_idc: (header >> 5) & 0x03,
        data,
    })
}

/// Remove emulation prevention bytes (0x03) from a NAL unit
///
/// The byte sequence 0x00 0x00 0x03 is used to prevent start code emulation;
/// this returns the raw byte sequence payload (RBSP).
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut zeros = 0usize;

    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        result.push(byte);
    }

    result
}

/// Insert emulation prevention bytes into an RBSP
pub fn add_emulation_prevention(rbsp: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(rbsp.len() + rbsp.len() / 64);
    let mut zeros = 0usize;

    for &byte in rbsp {
        if zeros >= 2 && byte <= 0x03 {
            result.push(0x03);
            zeros = 0;
        }
        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        result.push(byte);
    }

    result
}

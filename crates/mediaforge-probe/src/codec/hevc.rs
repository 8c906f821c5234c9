//! HEVC (H.265) decoder configuration record (`hvcC`)
//!
//! Only the general profile/tier/level header is decoded; it is all the
//! RFC 6381 codec string needs.

use crate::error::{ProbeError, Result};

/// General profile, tier and level fields of an HEVCDecoderConfigurationRecord
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HevcConfig {
    pub general_profile_space: u8,
    pub general_tier_flag: bool,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    /// 48-bit constraint indicator flags, most significant byte first
    pub general_constraint_indicator_flags: [u8; 6],
    pub general_level_idc: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    /// Size of the NAL length prefix in samples
    pub nal_length_size: u8,
}

pub fn parse_hvcc(data: &[u8]) -> Result<HevcConfig> {
    if data.len() < 23 {
        return Err(ProbeError::invalid(format!(
            "hvcC of {} bytes is shorter than its 23-byte header",
            data.len()
        )));
    }

    let mut constraints = [0u8; 6];
    constraints.copy_from_slice(&data[6..12]);

    Ok(HevcConfig {
        general_profile_space: data[1] >> 6,
        general_tier_flag: data[1] & 0x20 != 0,
        general_profile_idc: data[1] & 0x1F,
        general_profile_compatibility_flags: u32::from_be_bytes([
            data[2], data[3], data[4], data[5],
        ]),
        general_constraint_indicator_flags: constraints,
        general_level_idc: data[12],
        chroma_format_idc: data[16] & 0x03,
        bit_depth_luma: (data[17] & 0x07) + 8,
        bit_depth_chroma: (data[18] & 0x07) + 8,
        nal_length_size: (data[21] & 0x03) + 1,
    })
}

/// `hvc1.<space><profile>.<compat>.<tier><level>[.<constraints>]`
///
/// Compatibility flags are written bit-reversed in hex; trailing zero
/// constraint bytes are omitted.
pub fn get_hevc_codec_string(fourcc: &str, config: &HevcConfig) -> String {
    let space = match config.general_profile_space {
        1 => "A",
        2 => "B",
        3 => "C",
        _ => "",
    };
    let tier = if config.general_tier_flag { 'H' } else { 'L' };

    let mut codec = format!(
        "{}.{}{}.{:X}.{}{}",
        fourcc,
        space,
        config.general_profile_idc,
        config.general_profile_compatibility_flags.reverse_bits(),
        tier,
        config.general_level_idc
    );

    let constraints = &config.general_constraint_indicator_flags;
    let used = constraints
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    for byte in &constraints[..used] {
        codec.push_str(&format!(".{:X}", byte));
    }

    codec
}

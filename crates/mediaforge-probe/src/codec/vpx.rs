//! VP8/VP9 codec strings

use crate::error::{ProbeError, Result};

/// Codec string used when a VP9 track carries no `vpcC` record.
pub const DEFAULT_VP9_CODEC_STRING: &str = "vp09.00.10.08";

/// Fields of a VP codec configuration record (`vpcC`, version 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VpcConfig {
    pub profile: u8,
    pub level: u8,
    pub bit_depth: u8,
    pub chroma_subsampling: u8,
    pub video_full_range: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
}

/// Parse a `vpcC` full-box payload (version/flags included).
pub fn parse_vpcc(data: &[u8]) -> Result<VpcConfig> {
    if data.len() < 12 {
        return Err(ProbeError::invalid("vpcC shorter than 12 bytes"));
    }
    if data[0] != 1 {
        return Err(ProbeError::Unsupported(format!("vpcC version {}", data[0])));
    }

    Ok(VpcConfig {
        profile: data[4],
        level: data[5],
        bit_depth: data[6] >> 4,
        chroma_subsampling: (data[6] >> 1) & 0x07,
        video_full_range: data[6] & 0x01 != 0,
        colour_primaries: data[7],
        transfer_characteristics: data[8],
        matrix_coefficients: data[9],
    })
}

/// `vp09.PP.LL.DD`
pub fn get_vp9_codec_string(config: &VpcConfig) -> String {
    format!(
        "vp09.{:02}.{:02}.{:02}",
        config.profile, config.level, config.bit_depth
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vp9_codec_string() {
        let vpcc = [0x01, 0, 0, 0, 0x02, 0x1F, 0xA2, 0x09, 0x10, 0x09, 0x00, 0x00];
        let config = parse_vpcc(&vpcc).unwrap();
        assert_eq!(config.bit_depth, 10);
        assert_eq!(config.chroma_subsampling, 1);
        assert_eq!(get_vp9_codec_string(&config), "vp09.02.31.10");
    }

    #[test]
    fn test_rejects_version_zero() {
        assert!(parse_vpcc(&[0u8; 12]).is_err());
    }
}

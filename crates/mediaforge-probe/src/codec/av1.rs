//! AV1 codec configuration record (`av1C`)

use crate::error::{ProbeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Av1Config {
    pub seq_profile: u8,
    pub seq_level_idx_0: u8,
    pub seq_tier_0: bool,
    pub high_bitdepth: bool,
    pub twelve_bit: bool,
    pub monochrome: bool,
}

impl Av1Config {
    pub fn bit_depth(&self) -> u8 {
        match (self.high_bitdepth, self.twelve_bit) {
            (true, true) => 12,
            (true, false) => 10,
            _ => 8,
        }
    }
}

pub fn parse_av1c(data: &[u8]) -> Result<Av1Config> {
    if data.len() < 4 {
        return Err(ProbeError::invalid("av1C shorter than 4 bytes"));
    }
    if data[0] & 0x80 == 0 {
        return Err(ProbeError::invalid("av1C marker bit not set"));
    }

    Ok(Av1Config {
        seq_profile: data[1] >> 5,
        seq_level_idx_0: data[1] & 0x1F,
        seq_tier_0: data[2] & 0x80 != 0,
        high_bitdepth: data[2] & 0x40 != 0,
        twelve_bit: data[2] & 0x20 != 0,
        monochrome: data[2] & 0x10 != 0,
    })
}

/// `av01.<profile>.<level><tier>.<bit depth>`
pub fn get_av1_codec_string(config: &Av1Config) -> String {
    format!(
        "av01.{}.{:02}{}.{:02}",
        config.seq_profile,
        config.seq_level_idx_0,
        if config.seq_tier_0 { 'H' } else { 'M' },
        config.bit_depth()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_string() {
        let config = parse_av1c(&[0x81, 0x08, 0x0C, 0x00]).unwrap();
        assert_eq!(config.seq_level_idx_0, 8);
        assert_eq!(get_av1_codec_string(&config), "av01.0.08M.08");

        let hdr = parse_av1c(&[0x81, 0x2D, 0x40, 0x00]).unwrap();
        assert_eq!(get_av1_codec_string(&hdr), "av01.1.13M.10");
    }

    #[test]
    fn test_rejects_missing_marker() {
        assert!(parse_av1c(&[0x01, 0x08, 0x0C, 0x00]).is_err());
    }
}

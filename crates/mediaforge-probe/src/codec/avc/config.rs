//! AVCDecoderConfigurationRecord (`avcC`) and RFC 6381 codec strings.

use bytes::{BufMut, Bytes, BytesMut};

use super::sps::{parse_sps, Sps};
use crate::error::{ProbeError, Result};

/// Decoded AVCDecoderConfigurationRecord (ISO/IEC 14496-15 5.3.3.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcDecoderConfig {
    pub profile_indication: u8,
    pub profile_compatibility: u8,
    pub level_indication: u8,
    /// Size of the NAL length prefix in samples (1, 2 or 4)
    pub nal_length_size: u8,
    /// SPS NAL units, including their headers
    pub sps: Vec<Bytes>,
    /// PPS NAL units, including their headers
    pub pps: Vec<Bytes>,
}

impl AvcDecoderConfig {
    /// Parse the first SPS of the record.
    pub fn first_sps(&self) -> Result<Sps> {
        let nal = self
            .sps
            .first()
            .ok_or(ProbeError::MissingParameterSet("SPS"))?;
        parse_sps(nal)
    }
}

/// `avc1.PPCCLL`: profile, constraint flags and level as lowercase hex.
pub fn get_codec_string_from_sps(sps: &Sps) -> String {
    format!(
        "avc1.{:02x}{:02x}{:02x}",
        sps.profile_idc, sps.constraint_flags, sps.level_idc
    )
}

/// Codec string straight from an `avcC` payload, without parsing the SPS.
pub fn get_codec_string_from_avcc(avcc: &[u8]) -> Option<String> {
    if avcc.len() < 4 || avcc[0] != 1 {
        return None;
    }
    Some(format!("avc1.{:02x}{:02x}{:02x}", avcc[1], avcc[2], avcc[3]))
}

/// Build an `avcC` payload from one SPS and one PPS NAL unit.
///
/// NAL length prefixes are 4 bytes. High profiles carry the chroma format
/// and bit depth extension after the PPS list.
pub fn get_avcc_box_content(sps_nal: &[u8], pps_nal: &[u8], sps: &Sps) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 + sps_nal.len() + pps_nal.len());

    buf.put_u8(1); // configurationVersion
    buf.put_u8(sps.profile_idc);
    buf.put_u8(sps.constraint_flags);
    buf.put_u8(sps.level_idc);
    buf.put_u8(0xFC | 3); // lengthSizeMinusOne
    buf.put_u8(0xE0 | 1); // numOfSequenceParameterSets
    buf.put_u16(sps_nal.len() as u16);
    buf.put_slice(sps_nal);
    buf.put_u8(1); // numOfPictureParameterSets
    buf.put_u16(pps_nal.len() as u16);
    buf.put_slice(pps_nal);

    if matches!(sps.profile_idc, 100 | 110 | 122 | 144) {
        buf.put_u8(0xFC | (sps.chroma_format_idc as u8 & 0x03));
        buf.put_u8(0xF8 | (sps.bit_depth_luma.saturating_sub(8) & 0x07));
        buf.put_u8(0xF8 | (sps.bit_depth_chroma.saturating_sub(8) & 0x07));
        buf.put_u8(0); // numOfSequenceParameterSetExt
    }

    buf.freeze()
}

/// Parse an `avcC` payload.
pub fn parse_avcc(data: &[u8]) -> Result<AvcDecoderConfig> {
    if data.len() < 7 {
        return Err(ProbeError::invalid("avcC shorter than 7 bytes"));
    }
    if data[0] != 1 {
        return Err(ProbeError::Unsupported(format!(
            "avcC configuration version {}",
            data[0]
        )));
    }

    let nal_length_size = (data[4] & 0x03) + 1;
    let mut pos = 5;

    let sps_count = (data[pos] & 0x1F) as usize;
    pos += 1;
    let sps = read_parameter_sets(data, &mut pos, sps_count)?;

    let pps_count = *data
        .get(pos)
        .ok_or_else(|| ProbeError::invalid("avcC truncated before PPS count"))?
        as usize;
    pos += 1;
    let pps = read_parameter_sets(data, &mut pos, pps_count)?;

    Ok(AvcDecoderConfig {
        profile_indication: data[1],
        profile_compatibility: data[2],
        level_indication: data[3],
        nal_length_size,
        sps,
        pps,
    })
}

fn read_parameter_sets(data: &[u8], pos: &mut usize, count: usize) -> Result<Vec<Bytes>> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if *pos + 2 > data.len() {
            return Err(ProbeError::invalid("avcC truncated in parameter set length"));
        }
        let len = u16::from_be_bytes([data[*pos], data[*pos + 1]]) as usize;
        *pos += 2;
        if *pos + len > data.len() {
            return Err(ProbeError::invalid("avcC parameter set exceeds record"));
        }
        sets.push(Bytes::copy_from_slice(&data[*pos..*pos + len]));
        *pos += len;
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pps_nal, SpsBuilder};

    #[test]
    fn test_codec_string() {
        let sps = parse_sps(&SpsBuilder::new(1920, 1080).build()).unwrap();
        assert_eq!(get_codec_string_from_sps(&sps), "avc1.640028");

        let baseline = SpsBuilder::new(640, 480).profile(66, 0xE0, 0x1E).build();
        let sps = parse_sps(&baseline).unwrap();
        assert_eq!(get_codec_string_from_sps(&sps), "avc1.42e01e");
    }

    #[test]
    fn test_avcc_roundtrip() {
        let sps_nal = SpsBuilder::new(1920, 1080).build();
        let pps_nal = pps_nal(0, 0, true);
        let sps = parse_sps(&sps_nal).unwrap();

        let avcc = get_avcc_box_content(&sps_nal, &pps_nal, &sps);
        assert_eq!(&avcc[..6], &[0x01, 0x64, 0x00, 0x28, 0xFF, 0xE1]);
        assert_eq!(get_codec_string_from_avcc(&avcc).as_deref(), Some("avc1.640028"));

        let config = parse_avcc(&avcc).unwrap();
        assert_eq!(config.nal_length_size, 4);
        assert_eq!(config.sps.len(), 1);
        assert_eq!(&config.sps[0][..], &sps_nal[..]);
        assert_eq!(&config.pps[0][..], &pps_nal[..]);
        assert_eq!(config.first_sps().unwrap(), sps);
    }

    #[test]
    fn test_baseline_avcc_has_no_extension() {
        let sps_nal = SpsBuilder::new(320, 240).profile(66, 0xC0, 13).build();
        let pps_nal = pps_nal(0, 0, false);
        let sps = parse_sps(&sps_nal).unwrap();

        let avcc = get_avcc_box_content(&sps_nal, &pps_nal, &sps);
        assert_eq!(avcc.len(), 6 + 2 + sps_nal.len() + 1 + 2 + pps_nal.len());
    }

    #[test]
    fn test_parse_avcc_truncated() {
        let data = [0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x10, 0x67];
        assert!(matches!(parse_avcc(&data), Err(ProbeError::InvalidData(_))));
        assert!(parse_avcc(&[0x02, 0, 0, 0, 0, 0, 0]).is_err());
    }
}

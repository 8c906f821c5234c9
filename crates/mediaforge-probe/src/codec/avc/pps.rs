//! H.264 Picture Parameter Set (PPS) parsing

use super::nal::remove_emulation_prevention;
use crate::bitreader::BitReader;
use crate::error::{ProbeError, Result};

/// Leading fields of a Picture Parameter Set.
///
/// Slice group maps and everything after them are not parsed; the track model
/// only needs the ids and the entropy coder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pps {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    /// CABAC when set, CAVLC otherwise
    pub entropy_coding_mode: bool,
    pub bottom_field_pic_order_in_frame_present: bool,
    pub num_slice_groups: u32,
}

/// Parse a PPS NAL unit (including its 1-byte header)
pub fn parse_pps(nal: &[u8]) -> Result<Pps> {
    let header = *nal
        .first()
        .ok_or(ProbeError::MissingParameterSet("PPS"))?;
    if header & 0x1F != 8 {
        return Err(ProbeError::invalid(format!(
            "NAL type {} is not a PPS",
            header & 0x1F
        )));
    }

    let rbsp = remove_emulation_prevention(&nal[1..]);
    let mut r = BitReader::new(&rbsp);

    Ok(Pps {
        pic_parameter_set_id: r.read_ue("pic_parameter_set_id")?,
        seq_parameter_set_id: r.read_ue("seq_parameter_set_id")?,
        entropy_coding_mode: r.read_flag("entropy_coding_mode_flag")?,
        bottom_field_pic_order_in_frame_present: r
            .read_flag("bottom_field_pic_order_in_frame_present_flag")?,
        num_slice_groups: r.read_ue("num_slice_groups_minus1")? + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pps_nal;

    #[test]
    fn test_parse_pps() {
        let pps = parse_pps(&pps_nal(0, 0, true)).unwrap();
        assert_eq!(pps.pic_parameter_set_id, 0);
        assert_eq!(pps.seq_parameter_set_id, 0);
        assert!(pps.entropy_coding_mode);
        assert_eq!(pps.num_slice_groups, 1);
    }

    #[test]
    fn test_parse_pps_ids() {
        let pps = parse_pps(&pps_nal(3, 1, false)).unwrap();
        assert_eq!(pps.pic_parameter_set_id, 3);
        assert_eq!(pps.seq_parameter_set_id, 1);
        assert!(!pps.entropy_coding_mode);
    }

    #[test]
    fn test_rejects_sps() {
        assert!(parse_pps(&[0x67, 0x42]).is_err());
    }
}

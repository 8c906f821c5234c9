//! Builders for synthetic H.264 parameter sets and access units.
//!
//! Only compiled for tests and with the `test-util` feature, so downstream
//! crates can build transport streams and containers around real SPS bytes.

use bitstream_io::{BigEndian, BitWrite, BitWriter};
use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::avc::add_emulation_prevention;

/// MSB-first writer producing an RBSP, with Exp-Golomb helpers.
pub struct RbspWriter {
    inner: BitWriter<Vec<u8>, BigEndian>,
}

impl Default for RbspWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RbspWriter {
    pub fn new() -> Self {
        Self {
            inner: BitWriter::endian(Vec::new(), BigEndian),
        }
    }

    pub fn bits(&mut self, n: u32, value: u32) -> &mut Self {
        self.inner
            .write(n, value)
            .expect("writing to a Vec cannot fail");
        self
    }

    pub fn flag(&mut self, value: bool) -> &mut Self {
        self.inner
            .write_bit(value)
            .expect("writing to a Vec cannot fail");
        self
    }

    pub fn ue(&mut self, value: u32) -> &mut Self {
        let code = value as u64 + 1;
        let len = 64 - code.leading_zeros();
        for _ in 0..len - 1 {
            self.flag(false);
        }
        for i in (0..len).rev() {
            self.flag((code >> i) & 1 == 1);
        }
        self
    }

    pub fn se(&mut self, value: i32) -> &mut Self {
        let code = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs() * 2
        };
        self.ue(code)
    }

    /// Append rbsp_trailing_bits() and return the bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.flag(true);
        self.inner
            .byte_align()
            .expect("writing to a Vec cannot fail");
        self.inner.into_writer()
    }
}

/// Builder for an SPS NAL unit describing a progressive 4:2:0 stream.
#[derive(Debug, Clone)]
pub struct SpsBuilder {
    width: u32,
    height: u32,
    profile_idc: u8,
    constraint_flags: u8,
    level_idc: u8,
    sar: Option<(u16, u16)>,
    colour: Option<(u8, u8, u8, bool)>,
    timing: Option<(u32, u32)>,
}

impl SpsBuilder {
    /// High profile, level 4.0, no VUI.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            profile_idc: 100,
            constraint_flags: 0,
            level_idc: 40,
            sar: None,
            colour: None,
            timing: None,
        }
    }

    pub fn profile(mut self, profile_idc: u8, constraint_flags: u8, level_idc: u8) -> Self {
        self.profile_idc = profile_idc;
        self.constraint_flags = constraint_flags;
        self.level_idc = level_idc;
        self
    }

    pub fn sample_aspect_ratio(mut self, width: u16, height: u16) -> Self {
        self.sar = Some((width, height));
        self
    }

    pub fn colour(mut self, primaries: u8, transfer: u8, matrix: u8, full_range: bool) -> Self {
        self.colour = Some((primaries, transfer, matrix, full_range));
        self
    }

    pub fn timing(mut self, num_units_in_tick: u32, time_scale: u32) -> Self {
        self.timing = Some((num_units_in_tick, time_scale));
        self
    }

    /// SPS NAL unit, header byte included, with emulation prevention applied.
    pub fn build(&self) -> Vec<u8> {
        let mut w = RbspWriter::new();
        w.bits(8, self.profile_idc as u32)
            .bits(8, self.constraint_flags as u32)
            .bits(8, self.level_idc as u32)
            .ue(0); // seq_parameter_set_id

        if matches!(self.profile_idc, 100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128) {
            w.ue(1) // chroma_format_idc
                .ue(0)
                .ue(0)
                .flag(false)
                .flag(false); // no scaling matrix
        }

        let width_mbs = self.width.div_ceil(16);
        let height_mbs = self.height.div_ceil(16);

        w.ue(0) // log2_max_frame_num_minus4
            .ue(0) // pic_order_cnt_type
            .ue(2)
            .ue(4) // max_num_ref_frames
            .flag(false)
            .ue(width_mbs - 1)
            .ue(height_mbs - 1)
            .flag(true) // frame_mbs_only_flag
            .flag(true); // direct_8x8_inference_flag

        let crop_right = (width_mbs * 16 - self.width) / 2;
        let crop_bottom = (height_mbs * 16 - self.height) / 2;
        if crop_right > 0 || crop_bottom > 0 {
            w.flag(true).ue(0).ue(crop_right).ue(0).ue(crop_bottom);
        } else {
            w.flag(false);
        }

        let has_vui = self.sar.is_some() || self.colour.is_some() || self.timing.is_some();
        w.flag(has_vui);
        if has_vui {
            self.write_vui(&mut w);
        }

        let mut nal = vec![0x67];
        nal.extend(add_emulation_prevention(&w.finish()));
        nal
    }

    fn write_vui(&self, w: &mut RbspWriter) {
        match self.sar {
            Some((1, 1)) => {
                w.flag(true).bits(8, 1);
            }
            Some((sar_w, sar_h)) => {
                w.flag(true)
                    .bits(8, 255)
                    .bits(16, sar_w as u32)
                    .bits(16, sar_h as u32);
            }
            None => {
                w.flag(false);
            }
        }

        w.flag(false); // overscan_info_present_flag

        match self.colour {
            Some((primaries, transfer, matrix, full_range)) => {
                w.flag(true)
                    .bits(3, 5) // video_format: unspecified
                    .flag(full_range)
                    .flag(true)
                    .bits(8, primaries as u32)
                    .bits(8, transfer as u32)
                    .bits(8, matrix as u32);
            }
            None => {
                w.flag(false);
            }
        }

        w.flag(false); // chroma_loc_info_present_flag

        match self.timing {
            Some((num_units_in_tick, time_scale)) => {
                w.flag(true)
                    .bits(32, num_units_in_tick)
                    .bits(32, time_scale)
                    .flag(true);
            }
            None => {
                w.flag(false);
            }
        }

        // no HRD, no pic_struct, no bitstream restriction
        w.flag(false).flag(false).flag(false).flag(false);
    }
}

/// PPS NAL unit with default slice parameters.
pub fn pps_nal(pps_id: u32, sps_id: u32, cabac: bool) -> Vec<u8> {
    let mut w = RbspWriter::new();
    w.ue(pps_id)
        .ue(sps_id)
        .flag(cabac)
        .flag(false)
        .ue(0) // num_slice_groups_minus1
        .ue(0)
        .ue(0)
        .flag(false) // weighted_pred_flag
        .bits(2, 0)
        .se(0)
        .se(0)
        .se(0)
        .flag(true) // deblocking_filter_control_present_flag
        .flag(false)
        .flag(false);

    let mut nal = vec![0x68];
    nal.extend(add_emulation_prevention(&w.finish()));
    nal
}

/// Join NAL units into an Annex B byte stream with 4-byte start codes.
pub fn annex_b(units: &[&[u8]]) -> Bytes {
    let mut buf = BytesMut::new();
    for unit in units {
        buf.put_slice(&[0, 0, 0, 1]);
        buf.put_slice(unit);
    }
    buf.freeze()
}

/// A complete key frame access unit: AUD, SPS, PPS and a stub IDR slice.
pub fn h264_key_frame(width: u32, height: u32) -> Bytes {
    let sps = SpsBuilder::new(width, height).build();
    let pps = pps_nal(0, 0, true);
    annex_b(&[&[0x09, 0xF0], &sps, &pps, &[0x65, 0x88, 0x84, 0x00, 0x33]])
}

/// A non-IDR access unit.
pub fn h264_delta_frame() -> Bytes {
    annex_b(&[&[0x09, 0x30], &[0x41, 0x9A, 0x02, 0x04]])
}

/// Length-prefixed (4-byte) rendition of Annex B data, as stored in MP4
/// and Matroska samples.
pub fn to_length_prefixed(annex_b: &Bytes) -> Bytes {
    let mut buf = BytesMut::new();
    for unit in crate::codec::avc::extract_annex_b(annex_b) {
        buf.put_u32(unit.data.len() as u32);
        buf.put_slice(&unit.data);
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;

    #[test]
    fn test_exp_golomb_writer_matches_reader() {
        let mut w = RbspWriter::new();
        w.ue(0).ue(1).ue(7).ue(255).se(-3).se(4);
        let data = w.finish();

        let mut r = BitReader::new(&data);
        assert_eq!(r.read_ue("a").unwrap(), 0);
        assert_eq!(r.read_ue("b").unwrap(), 1);
        assert_eq!(r.read_ue("c").unwrap(), 7);
        assert_eq!(r.read_ue("d").unwrap(), 255);
        assert_eq!(r.read_se("e").unwrap(), -3);
        assert_eq!(r.read_se("f").unwrap(), 4);
        assert!(r.read_flag("stop").unwrap());
    }
}

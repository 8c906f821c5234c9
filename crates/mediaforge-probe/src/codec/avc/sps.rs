//! H.264 Sequence Parameter Set (SPS) parsing

use mediaforge_common::{AspectRatio, Rational, VideoColor};

use super::nal::remove_emulation_prevention;
use crate::bitreader::BitReader;
use crate::error::{ProbeError, Result};

/// Sequence Parameter Set
#[derive(Debug, Clone, PartialEq)]
pub struct Sps {
    pub profile_idc: u8,
    /// constraint_set0..5 flags and reserved bits, as one byte
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub seq_parameter_set_id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane: bool,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
    pub log2_max_frame_num: u32,
    pub pic_order_cnt_type: u32,
    pub max_num_ref_frames: u32,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only: bool,
    pub frame_crop: Option<FrameCrop>,
    /// Video Usability Information
    pub vui: Option<Vui>,
}

/// Frame cropping offsets, in crop units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCrop {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// Video Usability Information
#[derive(Debug, Clone, PartialEq)]
pub struct Vui {
    /// Sample aspect ratio, if signalled
    pub aspect_ratio: Option<AspectRatio>,
    pub video_signal_type_present: bool,
    /// Video is full range (0-255) vs limited range (16-235)
    pub video_full_range: bool,
    /// (colour_primaries, transfer_characteristics, matrix_coefficients)
    pub colour_description: Option<(u8, u8, u8)>,
    pub timing: Option<TimingInfo>,
}

/// VUI timing information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingInfo {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate: bool,
}

/// Picture dimensions in luma samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Sample aspect ratios for aspect_ratio_idc 1..=16 (Table E-1)
const SAR_TABLE: [(u32, u32); 16] = [
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

const EXTENDED_SAR: u8 = 255;

/// Profiles whose SPS carries chroma format and bit depth fields
fn has_chroma_info(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    )
}

/// Parse an SPS NAL unit (including its 1-byte header)
pub fn parse_sps(nal: &[u8]) -> Result<Sps> {
    let header = *nal
        .first()
        .ok_or(ProbeError::MissingParameterSet("SPS"))?;
    if header & 0x1F != 7 {
        return Err(ProbeError::invalid(format!(
            "NAL type {} is not an SPS",
            header & 0x1F
        )));
    }

    let rbsp = remove_emulation_prevention(&nal[1..]);
    let mut r = BitReader::new(&rbsp);

    let profile_idc = r.read_u8("profile_idc")?;
    let constraint_flags = r.read_u8("constraint_set_flags")?;
    let level_idc = r.read_u8("level_idc")?;
    let seq_parameter_set_id = r.read_ue("seq_parameter_set_id")?;

    let mut chroma_format_idc = 1;
    let mut separate_colour_plane = false;
    let mut bit_depth_luma = 8;
    let mut bit_depth_chroma = 8;

    if has_chroma_info(profile_idc) {
        chroma_format_idc = r.read_ue("chroma_format_idc")?;
        if chroma_format_idc == 3 {
            separate_colour_plane = r.read_flag("separate_colour_plane_flag")?;
        }
        bit_depth_luma = read_bit_depth(&mut r, "bit_depth_luma_minus8")?;
        bit_depth_chroma = read_bit_depth(&mut r, "bit_depth_chroma_minus8")?;
        r.read_flag("qpprime_y_zero_transform_bypass_flag")?;

        if r.read_flag("seq_scaling_matrix_present_flag")? {
            let lists = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..lists {
                if r.read_flag("seq_scaling_list_present_flag")? {
                    skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    let log2_max_frame_num_minus4 = r.read_ue("log2_max_frame_num_minus4")?;
    if log2_max_frame_num_minus4 > 12 {
        return Err(ProbeError::invalid(format!(
            "log2_max_frame_num_minus4 of {} is out of range",
            log2_max_frame_num_minus4
        )));
    }
    let log2_max_frame_num = log2_max_frame_num_minus4 + 4;
    let pic_order_cnt_type = r.read_ue("pic_order_cnt_type")?;

    match pic_order_cnt_type {
        0 => {
            r.read_ue("log2_max_pic_order_cnt_lsb_minus4")?;
        }
        1 => {
            r.read_flag("delta_pic_order_always_zero_flag")?;
            r.read_se("offset_for_non_ref_pic")?;
            r.read_se("offset_for_top_to_bottom_field")?;
            let cycle = r.read_ue("num_ref_frames_in_pic_order_cnt_cycle")?;
            for _ in 0..cycle {
                r.read_se("offset_for_ref_frame")?;
            }
        }
        _ => {}
    }

    let max_num_ref_frames = r.read_ue("max_num_ref_frames")?;
    r.read_flag("gaps_in_frame_num_value_allowed_flag")?;

    let pic_width_in_mbs_minus1 = r.read_ue("pic_width_in_mbs_minus1")?;
    let pic_height_in_map_units_minus1 = r.read_ue("pic_height_in_map_units_minus1")?;

    let frame_mbs_only = r.read_flag("frame_mbs_only_flag")?;
    if !frame_mbs_only {
        r.read_flag("mb_adaptive_frame_field_flag")?;
    }
    r.read_flag("direct_8x8_inference_flag")?;

    let frame_crop = if r.read_flag("frame_cropping_flag")? {
        Some(FrameCrop {
            left: r.read_ue("frame_crop_left_offset")?,
            right: r.read_ue("frame_crop_right_offset")?,
            top: r.read_ue("frame_crop_top_offset")?,
            bottom: r.read_ue("frame_crop_bottom_offset")?,
        })
    } else {
        None
    };

    let vui = if r.read_flag("vui_parameters_present_flag")? {
        Some(parse_vui(&mut r)?)
    } else {
        None
    };

    let sps = Sps {
        profile_idc,
        constraint_flags,
        level_idc,
        seq_parameter_set_id,
        chroma_format_idc,
        separate_colour_plane,
        bit_depth_luma,
        bit_depth_chroma,
        log2_max_frame_num,
        pic_order_cnt_type,
        max_num_ref_frames,
        pic_width_in_mbs_minus1,
        pic_height_in_map_units_minus1,
        frame_mbs_only,
        frame_crop,
        vui,
    };
    check_frame_size(&sps)?;
    Ok(sps)
}

fn read_bit_depth(r: &mut BitReader, field: &'static str) -> Result<u8> {
    let minus8 = r.read_ue(field)?;
    if minus8 > 6 {
        return Err(ProbeError::invalid(format!("{} of {} is out of range", field, minus8)));
    }
    Ok(minus8 as u8 + 8)
}

/// Coded size must fit in 32 bits and the cropping window inside it.
fn check_frame_size(sps: &Sps) -> Result<()> {
    let width = sps.coded_width_u64();
    let height = sps.coded_height_u64();
    if width > u32::MAX as u64 || height > u32::MAX as u64 {
        return Err(ProbeError::invalid(format!(
            "coded size {}x{} is out of range",
            width, height
        )));
    }

    let (crop_x, crop_y) = sps.crop_window();
    if crop_x >= width || crop_y >= height {
        return Err(ProbeError::invalid(format!(
            "cropping window {}x{} covers the {}x{} frame",
            crop_x, crop_y, width, height
        )));
    }
    Ok(())
}

/// Skip a scaling_list() structure (7.3.2.1.1.1)
fn skip_scaling_list(r: &mut BitReader, size: usize) -> Result<()> {
    let mut last_scale: i32 = 8;
    let mut next_scale: i32 = 8;

    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = r.read_se("delta_scale")?;
            if !(-128..=127).contains(&delta_scale) {
                return Err(ProbeError::invalid(format!(
                    "delta_scale of {} is out of range",
                    delta_scale
                )));
            }
            next_scale = (last_scale + delta_scale).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }

    Ok(())
}

/// Parse vui_parameters() up to and including the timing info.
///
/// HRD parameters and bitstream restrictions follow but describe nothing the
/// track model needs.
fn parse_vui(r: &mut BitReader) -> Result<Vui> {
    let mut aspect_ratio = None;

    if r.read_flag("aspect_ratio_info_present_flag")? {
        let idc = r.read_u8("aspect_ratio_idc")?;
        if idc == EXTENDED_SAR {
            let width = r.read_bits(16, "sar_width")?;
            let height = r.read_bits(16, "sar_height")?;
            aspect_ratio = Some(AspectRatio::new(width, height));
        } else if (1..=16).contains(&idc) {
            let (width, height) = SAR_TABLE[idc as usize - 1];
            aspect_ratio = Some(AspectRatio::new(width, height));
        }
    }

    if r.read_flag("overscan_info_present_flag")? {
        r.read_flag("overscan_appropriate_flag")?;
    }

    let video_signal_type_present = r.read_flag("video_signal_type_present_flag")?;
    let mut video_full_range = false;
    let mut colour_description = None;

    if video_signal_type_present {
        r.read_bits(3, "video_format")?;
        video_full_range = r.read_flag("video_full_range_flag")?;

        if r.read_flag("colour_description_present_flag")? {
            colour_description = Some((
                r.read_u8("colour_primaries")?,
                r.read_u8("transfer_characteristics")?,
                r.read_u8("matrix_coefficients")?,
            ));
        }
    }

    if r.read_flag("chroma_loc_info_present_flag")? {
        r.read_ue("chroma_sample_loc_type_top_field")?;
        r.read_ue("chroma_sample_loc_type_bottom_field")?;
    }

    let timing = if r.read_flag("timing_info_present_flag")? {
        Some(TimingInfo {
            num_units_in_tick: r.read_bits(32, "num_units_in_tick")?,
            time_scale: r.read_bits(32, "time_scale")?,
            fixed_frame_rate: r.read_flag("fixed_frame_rate_flag")?,
        })
    } else {
        None
    };

    Ok(Vui {
        aspect_ratio,
        video_signal_type_present,
        video_full_range,
        colour_description,
        timing,
    })
}

impl Sps {
    /// Width in luma samples before cropping.
    pub fn coded_width(&self) -> u32 {
        u32::try_from(self.coded_width_u64()).unwrap_or(u32::MAX)
    }

    /// Height in luma samples before cropping.
    pub fn coded_height(&self) -> u32 {
        u32::try_from(self.coded_height_u64()).unwrap_or(u32::MAX)
    }

    fn coded_width_u64(&self) -> u64 {
        (self.pic_width_in_mbs_minus1 as u64 + 1) * 16
    }

    fn coded_height_u64(&self) -> u64 {
        let field_factor = if self.frame_mbs_only { 1 } else { 2 };
        field_factor * (self.pic_height_in_map_units_minus1 as u64 + 1) * 16
    }

    /// Horizontal and vertical luma samples removed by cropping.
    fn crop_window(&self) -> (u64, u64) {
        let crop = self.frame_crop.unwrap_or_default();
        let (unit_x, unit_y) = self.crop_units();
        (
            (crop.left as u64 + crop.right as u64) * unit_x as u64,
            (crop.top as u64 + crop.bottom as u64) * unit_y as u64,
        )
    }

    /// Crop unit sizes in luma samples (7-19 .. 7-22)
    fn crop_units(&self) -> (u32, u32) {
        let field_factor = if self.frame_mbs_only { 1 } else { 2 };
        let chroma_array_type = if self.separate_colour_plane {
            0
        } else {
            self.chroma_format_idc
        };

        if chroma_array_type == 0 {
            return (1, field_factor);
        }

        let sub_width_c = if self.chroma_format_idc == 3 { 1 } else { 2 };
        let sub_height_c = if self.chroma_format_idc == 1 { 2 } else { 1 };
        (sub_width_c, sub_height_c * field_factor)
    }
}

/// Display dimensions: coded size minus the frame cropping window.
pub fn get_dimensions_from_sps(sps: &Sps) -> Dimensions {
    let (crop_x, crop_y) = sps.crop_window();
    let clamp = |v: u64| u32::try_from(v).unwrap_or(u32::MAX);

    Dimensions {
        width: clamp(sps.coded_width_u64().saturating_sub(crop_x)),
        height: clamp(sps.coded_height_u64().saturating_sub(crop_y)),
    }
}

/// Sample aspect ratio from the VUI, 1:1 when not signalled.
pub fn get_sample_aspect_ratio_from_sps(sps: &Sps) -> AspectRatio {
    sps.vui
        .as_ref()
        .and_then(|vui| vui.aspect_ratio)
        .filter(|sar| sar.numerator > 0 && sar.denominator > 0)
        .unwrap_or(AspectRatio::SQUARE)
}

/// Colour description from the VUI, `None` when the SPS carries none.
pub fn get_video_color_from_sps(sps: &Sps) -> Option<VideoColor> {
    let vui = sps.vui.as_ref()?;
    let (primaries, transfer, matrix) = vui.colour_description?;
    Some(VideoColor::from_codes(
        primaries,
        transfer,
        matrix,
        vui.video_full_range,
    ))
}

/// Frame rate from the VUI timing info (two ticks per frame).
///
/// `None` when the timing info is absent or the rate cannot be expressed
/// with 32-bit terms.
pub fn get_fps_from_sps(sps: &Sps) -> Option<Rational> {
    let timing = sps.vui.as_ref()?.timing?;
    if timing.num_units_in_tick == 0 || timing.time_scale == 0 {
        return None;
    }
    if timing.time_scale % 2 == 0 {
        return Some(Rational::new(timing.time_scale / 2, timing.num_units_in_tick));
    }
    let denominator = timing.num_units_in_tick.checked_mul(2)?;
    Some(Rational::new(timing.time_scale, denominator))
}

//! H.264 (AVC) codec parsing
//!
//! This module turns the parameter sets found in an H.264 elementary stream
//! into everything a track needs before its first sample can be decoded:
//! - Display and coded dimensions, sample aspect ratio, colour, frame rate
//! - RFC 6381 codec string (`avc1.PPCCLL`)
//! - AVCDecoderConfigurationRecord (`avcC`) for out-of-band configuration
//!
//! Frame typing (key vs delta) is derived from the NAL unit types of an
//! access unit.

mod config;
mod nal;
mod pps;
mod sps;

pub use config::{
    get_avcc_box_content, get_codec_string_from_avcc, get_codec_string_from_sps, parse_avcc,
    AvcDecoderConfig,
};
pub use nal::{
    add_emulation_prevention, extract_annex_b, extract_length_prefixed,
    remove_emulation_prevention, NalUnit, NalUnitType,
};
pub use pps::{parse_pps, Pps};
pub use sps::{
    get_dimensions_from_sps, get_fps_from_sps, get_sample_aspect_ratio_from_sps,
    get_video_color_from_sps, parse_sps, Dimensions, FrameCrop, Sps, TimingInfo, Vui,
};

use bytes::Bytes;
use mediaforge_common::{SampleKind, VideoTrackInfo};

use crate::error::{ProbeError, Result};

/// The first SPS and PPS NAL units of an access unit.
#[derive(Debug, Clone)]
pub struct SpsAndPps {
    pub sps: NalUnit,
    pub pps: NalUnit,
}

/// Find the parameter sets among the NAL units of one access unit.
///
/// Both are required to describe the stream; a missing one is an error rather
/// than a default, since the decoder could not be configured without it.
pub fn get_sps_and_pps(units: &[NalUnit]) -> Result<SpsAndPps> {
    let sps = units
        .iter()
        .find(|u| u.nal_type == NalUnitType::Sps)
        .ok_or(ProbeError::MissingParameterSet("SPS"))?;
    let pps = units
        .iter()
        .find(|u| u.nal_type == NalUnitType::Pps)
        .ok_or(ProbeError::MissingParameterSet("PPS"))?;

    Ok(SpsAndPps {
        sps: sps.clone(),
        pps: pps.clone(),
    })
}

/// Key when the access unit contains an IDR slice.
pub fn get_key_frame_or_delta(units: &[NalUnit]) -> SampleKind {
    if units.iter().any(|u| u.nal_type == NalUnitType::IdrSlice) {
        SampleKind::Key
    } else {
        SampleKind::Delta
    }
}

/// Track attributes derived from an SPS/PPS pair.
#[derive(Debug, Clone, PartialEq)]
pub struct AvcTrackParameters {
    pub codec: String,
    /// `avcC` payload
    pub codec_private: Bytes,
    pub video: VideoTrackInfo,
    pub sps: Sps,
}

impl AvcTrackParameters {
    pub fn from_parameter_sets(parameter_sets: &SpsAndPps) -> Result<Self> {
        let sps = parse_sps(&parameter_sets.sps.data)?;
        // Validates the PPS even though only its bytes end up in avcC.
        parse_pps(&parameter_sets.pps.data)?;

        Ok(Self {
            codec: get_codec_string_from_sps(&sps),
            codec_private: get_avcc_box_content(
                &parameter_sets.sps.data,
                &parameter_sets.pps.data,
                &sps,
            ),
            video: video_info_from_sps(&sps),
            sps,
        })
    }
}

/// Video attributes of a track described by `sps`.
pub fn video_info_from_sps(sps: &Sps) -> VideoTrackInfo {
    let Dimensions { width, height } = get_dimensions_from_sps(sps);
    let sample_aspect_ratio = get_sample_aspect_ratio_from_sps(sps);

    let display_aspect_width = if sample_aspect_ratio.denominator == 0 {
        width
    } else {
        (width as u64 * sample_aspect_ratio.numerator as u64
            / sample_aspect_ratio.denominator as u64) as u32
    };

    VideoTrackInfo {
        width,
        height,
        coded_width: sps.coded_width(),
        coded_height: sps.coded_height(),
        rotation: 0,
        sample_aspect_ratio,
        display_aspect_width,
        display_aspect_height: height,
        color: get_video_color_from_sps(sps),
        fps: get_fps_from_sps(sps),
    }
}

//! Codec-level parsing
//!
//! - `avc`: H.264 NAL units, SPS/PPS, codec string and `avcC`
//! - `aac`: ADTS framing, AudioSpecificConfig, `esds`
//! - `hevc`, `av1`, `vpx`, `opus`: decoder configuration records and codec
//!   strings for the remaining codecs a container may declare

pub mod aac;
pub mod av1;
pub mod avc;
pub mod hevc;
pub mod opus;
pub mod vpx;

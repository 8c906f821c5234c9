//! # mediaforge-probe
//!
//! Pure Rust codec parameter parsing for the mediaforge demuxers.
//!
//! Containers declare *that* a track is H.264 or AAC; this crate reads the
//! codec's own headers to learn what the track actually looks like.
//!
//! ## Features
//!
//! - H.264: Annex B / length-prefixed NAL extraction, SPS (including VUI) and
//!   PPS parsing, `avc1.PPCCLL` codec strings, `avcC` records, key frame
//!   detection
//! - AAC: ADTS headers, AudioSpecificConfig, `esds` descriptors
//! - HEVC / AV1 / VP9 / Opus: configuration records and codec strings
//!
//! ## Example
//!
//! ```
//! use mediaforge_probe::codec::avc::{get_codec_string_from_sps, parse_sps};
//!
//! // High profile, level 3.1, 1280x720, no VUI
//! let sps = [0x67, 0x64, 0x00, 0x1F, 0xAC, 0xD9, 0x40, 0x50, 0x05, 0xB9];
//! let parsed = parse_sps(&sps).unwrap();
//! assert_eq!(parsed.coded_width(), 1280);
//! assert_eq!(parsed.coded_height(), 720);
//! assert_eq!(get_codec_string_from_sps(&parsed), "avc1.64001f");
//! ```

pub mod bitreader;
pub mod codec;
pub mod error;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use bitreader::BitReader;
pub use error::{ProbeError, Result};

//! Mediaforge-Common: the container-independent media model.
//!
//! Every demuxer in mediaforge (ISO-BMFF, Matroska/WebM, MPEG-TS) reports what
//! it finds through the types in this crate:
//!
//! - **Tracks**: one per elementary stream, registered once per parse session
//! - **Samples**: one decodable unit of a track, handed to the consumer by value
//! - **Colour**: ITU-T H.273 colour description shared by codecs and containers
//!
//! # Examples
//!
//! ```
//! use mediaforge_common::{Sample, SampleKind, TrackId};
//!
//! let sample = Sample::new(TrackId::new(256), 1000, 1000, vec![0u8; 4].into(), SampleKind::Key);
//! assert_eq!(sample.timestamp, 1000);
//! assert!(sample.is_key());
//! ```

pub mod color;
pub mod ids;
pub mod types;

pub use color::{ColorPrimaries, MatrixCoefficients, TransferCharacteristics, VideoColor};
pub use ids::TrackId;
pub use types::{
    AspectRatio, AudioTrackInfo, CodecTag, Rational, Sample, SampleKind, Track, TrackKind,
    VideoTrackInfo,
};

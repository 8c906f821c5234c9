//! Track and sample model shared by all demuxers and the muxer.

use bytes::Bytes;
use serde::Serialize;
use std::fmt;

use crate::color::VideoColor;
use crate::ids::TrackId;

/// A rational number, used for frame rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Rational {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Floating point value, `0.0` for a zero denominator.
    pub fn as_f64(&self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }
}

/// Shape of a single sample (pixel) relative to a square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AspectRatio {
    pub numerator: u32,
    pub denominator: u32,
}

impl AspectRatio {
    /// Square pixels.
    pub const SQUARE: Self = Self {
        numerator: 1,
        denominator: 1,
    };

    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::SQUARE
    }
}

/// Codec family, independent of any decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecTag {
    H264,
    H265,
    Vp8,
    Vp9,
    Av1,
    Aac,
    Opus,
    Vorbis,
    Mp3,
    Pcm,
    /// Anything else, carrying the container's own codec identifier.
    Other(String),
}

impl fmt::Display for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "h264"),
            Self::H265 => write!(f, "h265"),
            Self::Vp8 => write!(f, "vp8"),
            Self::Vp9 => write!(f, "vp9"),
            Self::Av1 => write!(f, "av1"),
            Self::Aac => write!(f, "aac"),
            Self::Opus => write!(f, "opus"),
            Self::Vorbis => write!(f, "vorbis"),
            Self::Mp3 => write!(f, "mp3"),
            Self::Pcm => write!(f, "pcm"),
            Self::Other(id) => write!(f, "{}", id),
        }
    }
}

/// Video-specific track attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoTrackInfo {
    /// Display width after rotation.
    pub width: u32,
    /// Display height after rotation.
    pub height: u32,
    /// Width as coded in the bitstream, before cropping.
    pub coded_width: u32,
    /// Height as coded in the bitstream, before cropping.
    pub coded_height: u32,
    /// Clockwise rotation in degrees (0, 90, 180 or 270).
    pub rotation: u32,
    pub sample_aspect_ratio: AspectRatio,
    pub display_aspect_width: u32,
    pub display_aspect_height: u32,
    pub color: Option<VideoColor>,
    pub fps: Option<Rational>,
}

impl VideoTrackInfo {
    /// Attributes for a track whose display size equals its coded size.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            coded_width: width,
            coded_height: height,
            rotation: 0,
            sample_aspect_ratio: AspectRatio::SQUARE,
            display_aspect_width: width,
            display_aspect_height: height,
            color: None,
            fps: None,
        }
    }
}

/// Audio-specific track attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioTrackInfo {
    pub sample_rate: u32,
    pub number_of_channels: u16,
}

/// Media type of a track with its type-specific attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TrackKind {
    Video(VideoTrackInfo),
    Audio(AudioTrackInfo),
}

/// One elementary stream discovered in a container.
///
/// Tracks are created once, when the first packet for their id is seen, and
/// are not modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub track_id: TrackId,
    #[serde(flatten)]
    pub kind: TrackKind,
    /// RFC 6381 codec string, e.g. `avc1.640028` or `mp4a.40.2`.
    pub codec: String,
    pub codec_without_config: CodecTag,
    /// Out-of-band decoder configuration (avcC, AudioSpecificConfig, ...).
    #[serde(serialize_with = "serialize_hex")]
    pub codec_private: Option<Bytes>,
    /// Ticks per second for all timestamps of this track.
    pub timescale: u32,
    /// Original `trak` box, kept only so the track can be re-muxed.
    #[serde(skip)]
    pub raw_box: Option<Bytes>,
}

impl Track {
    pub fn is_video(&self) -> bool {
        matches!(self.kind, TrackKind::Video(_))
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.kind, TrackKind::Audio(_))
    }

    pub fn video(&self) -> Option<&VideoTrackInfo> {
        match &self.kind {
            TrackKind::Video(v) => Some(v),
            TrackKind::Audio(_) => None,
        }
    }

    pub fn audio(&self) -> Option<&AudioTrackInfo> {
        match &self.kind {
            TrackKind::Audio(a) => Some(a),
            TrackKind::Video(_) => None,
        }
    }
}

fn serialize_hex<S: serde::Serializer>(value: &Option<Bytes>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(bytes) => s.serialize_str(&hex::encode(bytes)),
        None => s.serialize_none(),
    }
}

/// Whether a sample can be decoded on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Key,
    Delta,
}

/// One decodable unit of a track.
///
/// All times are in the owning track's timescale. The parser does not keep a
/// sample after dispatching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub track_id: TrackId,
    /// Decode time.
    pub dts: i64,
    /// Composition time.
    pub cts: i64,
    /// Presentation time.
    pub timestamp: i64,
    pub duration: Option<u32>,
    pub data: Bytes,
    pub kind: SampleKind,
}

impl Sample {
    /// A sample presented at its composition time with no known duration.
    pub fn new(track_id: TrackId, dts: i64, cts: i64, data: Bytes, kind: SampleKind) -> Self {
        Self {
            track_id,
            dts,
            cts,
            timestamp: cts,
            duration: None,
            data,
            kind,
        }
    }

    pub fn is_key(&self) -> bool {
        self.kind == SampleKind::Key
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_zero_denominator() {
        assert_eq!(Rational::new(30, 0).as_f64(), 0.0);
        assert!((Rational::new(30000, 1001).as_f64() - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_track_serializes_flat_type_tag() {
        let track = Track {
            track_id: TrackId::new(1),
            kind: TrackKind::Video(VideoTrackInfo::with_dimensions(1920, 1080)),
            codec: "avc1.640028".to_string(),
            codec_without_config: CodecTag::H264,
            codec_private: Some(Bytes::from_static(&[0x01, 0x64])),
            timescale: 90000,
            raw_box: Some(Bytes::from_static(b"trak")),
        };

        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["type"], "video");
        assert_eq!(json["width"], 1920);
        assert_eq!(json["codec_without_config"], "h264");
        assert_eq!(json["codec_private"], "0164");
        assert!(json.get("raw_box").is_none());
    }

    #[test]
    fn test_track_accessors() {
        let track = Track {
            track_id: TrackId::new(2),
            kind: TrackKind::Audio(AudioTrackInfo {
                sample_rate: 48000,
                number_of_channels: 2,
            }),
            codec: "opus".to_string(),
            codec_without_config: CodecTag::Opus,
            codec_private: None,
            timescale: 48000,
            raw_box: None,
        };
        assert!(track.is_audio());
        assert!(track.video().is_none());
        assert_eq!(track.audio().map(|a| a.sample_rate), Some(48000));
    }

    #[test]
    fn test_sample_new_uses_cts_as_timestamp() {
        let sample = Sample::new(TrackId::new(1), 10, 20, Bytes::from_static(b"abc"), SampleKind::Delta);
        assert_eq!(sample.timestamp, 20);
        assert_eq!(sample.size(), 3);
        assert!(!sample.is_key());
    }
}

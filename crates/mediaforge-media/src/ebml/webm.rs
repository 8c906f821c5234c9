//! WebM / Matroska demuxer.
//!
//! Top-level Segment children are parsed one at a time with [`parse_ebml`],
//! so a Cluster is dispatched as soon as it is fully buffered.

use std::collections::HashMap;

use bytes::Bytes;
use mediaforge_common::{
    AudioTrackInfo, CodecTag, Sample, SampleKind, Track, TrackId, TrackKind, VideoColor,
    VideoTrackInfo,
};
use mediaforge_probe::codec::{aac, av1, avc, hevc, opus, vpx};
use tracing::{debug, trace};

use super::ids::EbmlId;
use super::parser::{parse_ebml, read_element_header, ElementNode};
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::registry::ParserState;
use crate::Demuxer;

/// Matroska default: one tick per millisecond
const DEFAULT_TIMESTAMP_SCALE: u64 = 1_000_000;
const NANOS_PER_SECOND: u64 = 1_000_000_000;

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;

/// SimpleBlock flags
const FLAG_KEYFRAME: u8 = 0x80;
const FLAG_LACING: u8 = 0x06;

/// Matroska "unspecified" colour code point
const COLOUR_UNSPECIFIED: u64 = 2;
const RANGE_FULL: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    SegmentHeader,
    /// `end` is `None` for an unknown-size Segment, which runs to end of input
    SegmentChildren { end: Option<u64> },
    Done,
}

/// Streaming Matroska demuxer.
#[derive(Debug)]
pub struct WebmDemuxer {
    state: State,
    timestamp_scale: u64,
    /// DefaultDuration per track number, in track ticks
    default_durations: HashMap<u64, u32>,
}

impl Default for WebmDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl WebmDemuxer {
    pub fn new() -> Self {
        Self {
            state: State::Header,
            timestamp_scale: DEFAULT_TIMESTAMP_SCALE,
            default_durations: HashMap::new(),
        }
    }

    /// Track timescale implied by the segment's TimestampScale.
    fn timescale(&self) -> u32 {
        (NANOS_PER_SECOND / self.timestamp_scale).clamp(1, u32::MAX as u64) as u32
    }

    fn handle_segment_child(&mut self, node: ElementNode, state: &mut ParserState<'_>) -> Result<()> {
        match node.id {
            EbmlId::INFO => {
                let scale = node
                    .child_uint(EbmlId::TIMESTAMP_SCALE)
                    .unwrap_or(DEFAULT_TIMESTAMP_SCALE);
                if scale == 0 {
                    return Err(Error::unsupported("TimestampScale of 0"));
                }
                self.timestamp_scale = scale;
                debug!(
                    timestamp_scale = scale,
                    muxing_app = node.child_str(EbmlId::MUXING_APP).unwrap_or(""),
                    "Segment info"
                );
            }
            EbmlId::TRACKS => {
                for entry in node.children_of(EbmlId::TRACK_ENTRY) {
                    if let Some(track) = self.track_from_entry(entry)? {
                        state.register_track(track)?;
                    }
                }
            }
            EbmlId::CLUSTER => self.handle_cluster(&node, state)?,
            _ => trace!(name = node.name, offset = node.offset, "Skipping segment child"),
        }
        Ok(())
    }

    fn handle_cluster(&self, cluster: &ElementNode, state: &mut ParserState<'_>) -> Result<()> {
        let cluster_timestamp = cluster.child_uint(EbmlId::TIMESTAMP).unwrap_or(0) as i64;

        for child in cluster.children() {
            match child.id {
                EbmlId::SIMPLE_BLOCK => {
                    if let Some(data) = child.as_binary() {
                        self.emit_block(data, cluster_timestamp, None, None, state)?;
                    }
                }
                EbmlId::BLOCK_GROUP => {
                    let Some(data) = child.child_binary(EbmlId::BLOCK) else {
                        return Err(Error::MissingElement("Block"));
                    };
                    let key = child.child(EbmlId::REFERENCE_BLOCK).is_none();
                    let duration = child
                        .child_uint(EbmlId::BLOCK_DURATION)
                        .map(|d| d.min(u32::MAX as u64) as u32);
                    self.emit_block(data, cluster_timestamp, Some(key), duration, state)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Decode a Block or SimpleBlock payload and route it.
    ///
    /// `key` is `None` for a SimpleBlock, whose flags carry the key bit.
    fn emit_block(
        &self,
        data: &Bytes,
        cluster_timestamp: i64,
        key: Option<bool>,
        duration: Option<u32>,
        state: &mut ParserState<'_>,
    ) -> Result<()> {
        let mut cursor = ByteCursor::from_bytes(data);
        let track_number = cursor.get_vint()?.value;
        let relative = cursor.get_i16()?;
        let flags = cursor.get_u8()?;

        if flags & FLAG_LACING != 0 {
            return Err(Error::unsupported(format!(
                "laced block on track {}",
                track_number
            )));
        }

        let Ok(raw_id) = u32::try_from(track_number) else {
            trace!(track_number, "Block for out-of-range track number");
            return Ok(());
        };
        let track_id = TrackId::new(raw_id);
        if !state.is_registered(track_id) {
            trace!(track_number, "Block for unknown track skipped");
            return Ok(());
        }

        let is_key = key.unwrap_or(flags & FLAG_KEYFRAME != 0);
        let timestamp = cluster_timestamp + relative as i64;
        let payload = data.slice(cursor.offset() as usize..);

        let mut sample = Sample::new(
            track_id,
            timestamp,
            timestamp,
            payload,
            if is_key { SampleKind::Key } else { SampleKind::Delta },
        );
        sample.duration = duration.or_else(|| self.default_durations.get(&track_number).copied());

        state.emit_sample(sample)
    }

    fn track_from_entry(&mut self, entry: &ElementNode) -> Result<Option<Track>> {
        let number = entry
            .child_uint(EbmlId::TRACK_NUMBER)
            .ok_or(Error::MissingElement("TrackNumber"))?;
        let track_type = entry
            .child_uint(EbmlId::TRACK_TYPE)
            .ok_or(Error::MissingElement("TrackType"))?;
        let codec_id = entry
            .child_str(EbmlId::CODEC_ID)
            .ok_or(Error::MissingElement("CodecID"))?;
        let codec_private = entry.child_binary(EbmlId::CODEC_PRIVATE).cloned();

        let track_id = u32::try_from(number)
            .map(TrackId::new)
            .map_err(|_| Error::unsupported(format!("track number {}", number)))?;

        let timescale = self.timescale();
        let (kind, codec, tag) = match track_type {
            TRACK_TYPE_VIDEO => {
                let (codec, tag, base) = video_codec(codec_id, codec_private.as_deref())?;
                (TrackKind::Video(video_info(entry, base)), codec, tag)
            }
            TRACK_TYPE_AUDIO => {
                let (codec, tag, audio) = audio_codec(entry, codec_id, codec_private.as_deref())?;
                (TrackKind::Audio(audio), codec, tag)
            }
            other => {
                debug!(track_number = number, track_type = other, codec_id, "Ignoring non-AV track");
                return Ok(None);
            }
        };

        if let Some(ns) = entry.child_uint(EbmlId::DEFAULT_DURATION) {
            let ticks = ns / self.timestamp_scale;
            self.default_durations
                .insert(number, ticks.min(u32::MAX as u64) as u32);
        }

        Ok(Some(Track {
            track_id,
            kind,
            codec,
            codec_without_config: tag,
            codec_private,
            timescale,
            raw_box: None,
        }))
    }
}

/// Codec string, codec family and, for H.264, the SPS-derived attributes.
fn video_codec(
    codec_id: &str,
    private: Option<&[u8]>,
) -> Result<(String, CodecTag, Option<VideoTrackInfo>)> {
    Ok(match codec_id {
        "V_MPEG4/ISO/AVC" => {
            let private = private.ok_or(Error::MissingElement("CodecPrivate"))?;
            let config = avc::parse_avcc(private)?;
            let sps = config.first_sps()?;
            (
                avc::get_codec_string_from_sps(&sps),
                CodecTag::H264,
                Some(avc::video_info_from_sps(&sps)),
            )
        }
        "V_MPEGH/ISO/HEVC" => {
            let private = private.ok_or(Error::MissingElement("CodecPrivate"))?;
            let config = hevc::parse_hvcc(private)?;
            (hevc::get_hevc_codec_string("hvc1", &config), CodecTag::H265, None)
        }
        "V_VP8" => ("vp8".to_string(), CodecTag::Vp8, None),
        "V_VP9" => (vpx::DEFAULT_VP9_CODEC_STRING.to_string(), CodecTag::Vp9, None),
        "V_AV1" => {
            let codec = match private {
                Some(p) => av1::get_av1_codec_string(&av1::parse_av1c(p)?),
                None => "av01".to_string(),
            };
            (codec, CodecTag::Av1, None)
        }
        other => (other.to_string(), CodecTag::Other(other.to_string()), None),
    })
}

/// Merge the Video element over whatever the bitstream already told us.
fn video_info(entry: &ElementNode, base: Option<VideoTrackInfo>) -> VideoTrackInfo {
    let video = entry.child(EbmlId::VIDEO);
    let pixel = |id: EbmlId| video.and_then(|v| v.child_uint(id)).map(|v| v as u32);

    let mut info = base.unwrap_or_else(|| {
        VideoTrackInfo::with_dimensions(
            pixel(EbmlId::PIXEL_WIDTH).unwrap_or(0),
            pixel(EbmlId::PIXEL_HEIGHT).unwrap_or(0),
        )
    });

    if let (Some(w), Some(h)) = (pixel(EbmlId::DISPLAY_WIDTH), pixel(EbmlId::DISPLAY_HEIGHT)) {
        info.display_aspect_width = w;
        info.display_aspect_height = h;
    }

    if let Some(colour) = video.and_then(|v| v.child(EbmlId::COLOUR)) {
        let code = |id: EbmlId| colour.child_uint(id).unwrap_or(COLOUR_UNSPECIFIED) as u8;
        info.color = Some(VideoColor::from_codes(
            code(EbmlId::PRIMARIES),
            code(EbmlId::TRANSFER_CHARACTERISTICS),
            code(EbmlId::MATRIX_COEFFICIENTS),
            colour.child_uint(EbmlId::RANGE) == Some(RANGE_FULL),
        ));
    }

    info
}

fn audio_codec(
    entry: &ElementNode,
    codec_id: &str,
    private: Option<&[u8]>,
) -> Result<(String, CodecTag, AudioTrackInfo)> {
    let audio = entry.child(EbmlId::AUDIO);
    let mut info = AudioTrackInfo {
        sample_rate: audio
            .and_then(|a| a.child_float(EbmlId::SAMPLING_FREQUENCY))
            .map(|f| f as u32)
            .unwrap_or(8000),
        number_of_channels: audio
            .and_then(|a| a.child_uint(EbmlId::CHANNELS))
            .map(|c| c as u16)
            .unwrap_or(1),
    };

    let (codec, tag) = match codec_id {
        "A_OPUS" => {
            if let Some(p) = private {
                info.number_of_channels = opus::parse_opus_head(p)?.channel_count as u16;
            }
            info.sample_rate = opus::OPUS_SAMPLE_RATE;
            ("opus".to_string(), CodecTag::Opus)
        }
        "A_VORBIS" => ("vorbis".to_string(), CodecTag::Vorbis),
        id if id.starts_with("A_AAC") => {
            let object_type = match private {
                Some(p) => {
                    let asc = aac::parse_audio_specific_config(p)?;
                    info.sample_rate = asc.sample_rate;
                    if asc.channel_configuration > 0 {
                        info.number_of_channels = asc.channel_configuration as u16;
                    }
                    asc.audio_object_type
                }
                None => 2,
            };
            (aac::get_aac_codec_string(object_type), CodecTag::Aac)
        }
        "A_MPEG/L3" => ("mp3".to_string(), CodecTag::Mp3),
        id if id.starts_with("A_PCM") => ("pcm".to_string(), CodecTag::Pcm),
        other => (other.to_string(), CodecTag::Other(other.to_string())),
    };

    Ok((codec, tag, info))
}

impl Demuxer for WebmDemuxer {
    fn advance(&mut self, cursor: &mut ByteCursor, state: &mut ParserState<'_>) -> Result<()> {
        loop {
            match self.state {
                State::Header => {
                    let header = parse_ebml(cursor)?;
                    if header.id != EbmlId::EBML {
                        return Err(Error::unsupported(format!(
                            "expected EBML header, found {}",
                            header.name
                        )));
                    }
                    let doc_type = header.child_str(EbmlId::DOC_TYPE).unwrap_or("matroska");
                    if doc_type != "webm" && doc_type != "matroska" {
                        return Err(Error::unsupported(format!("DocType {}", doc_type)));
                    }
                    debug!(doc_type, "EBML header");
                    self.state = State::SegmentHeader;
                }
                State::SegmentHeader => {
                    let header = cursor.attempt(read_element_header)?;
                    if header.id != EbmlId::SEGMENT {
                        return Err(Error::unsupported(format!(
                            "expected Segment, found {}",
                            header.info.name
                        )));
                    }
                    let end = header.size.map(|size| cursor.offset() + size);
                    debug!(offset = header.offset, ?end, "Segment");
                    self.state = State::SegmentChildren { end };
                }
                State::SegmentChildren { end } => {
                    let at_end = match end {
                        Some(end) => cursor.offset() >= end,
                        None => cursor.is_exhausted(),
                    };
                    if at_end {
                        self.state = State::Done;
                        continue;
                    }

                    let node = parse_ebml(cursor)?;
                    if let Some(end) = end {
                        if node.end() > end {
                            return Err(Error::ContainerOverrun {
                                container: "Segment".to_string(),
                                offset: node.end(),
                                end,
                            });
                        }
                    }
                    self.handle_segment_child(node, state)?;
                }
                State::Done => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CollectingSink, TrackRegistry};
    use crate::testing::{ebml_element, ebml_uint, webm_file, WebmTrackSpec};

    fn demux(data: &[u8]) -> Result<CollectingSink> {
        let mut registry = TrackRegistry::new();
        let mut sink = CollectingSink::new();
        let mut cursor = ByteCursor::from_bytes(data);
        let mut demuxer = WebmDemuxer::new();
        demuxer.advance(&mut cursor, &mut ParserState::new(&mut registry, &mut sink))?;
        Ok(sink)
    }

    #[test]
    fn test_vp9_and_opus_tracks() {
        let data = webm_file(
            &[WebmTrackSpec::vp9(1, 640, 360), WebmTrackSpec::opus(2)],
            &[(0, vec![(1, 0, true, b"frame0".to_vec()), (2, 0, true, b"audio0".to_vec())])],
        );
        let sink = demux(&data).unwrap();

        assert_eq!(sink.tracks.len(), 2);
        let video = &sink.tracks[0];
        assert_eq!(video.codec, "vp09.00.10.08");
        assert_eq!(video.timescale, 1000);
        assert_eq!(video.video().unwrap().width, 640);

        let audio = &sink.tracks[1];
        assert_eq!(audio.codec, "opus");
        assert_eq!(audio.audio().unwrap().sample_rate, 48000);
        assert_eq!(audio.audio().unwrap().number_of_channels, 2);
    }

    #[test]
    fn test_block_timestamps_and_flags() {
        let data = webm_file(
            &[WebmTrackSpec::vp9(1, 320, 240)],
            &[
                (0, vec![(1, 0, true, vec![1]), (1, 33, false, vec![2])]),
                (1000, vec![(1, -5, false, vec![3])]),
            ],
        );
        let sink = demux(&data).unwrap();

        let times: Vec<(i64, SampleKind)> = sink.samples.iter().map(|s| (s.cts, s.kind)).collect();
        assert_eq!(
            times,
            vec![
                (0, SampleKind::Key),
                (33, SampleKind::Delta),
                (995, SampleKind::Delta)
            ]
        );
        assert_eq!(sink.samples[1].data.as_ref(), &[2]);
    }

    #[test]
    fn test_blocks_for_unknown_tracks_are_skipped() {
        let data = webm_file(
            &[WebmTrackSpec::vp9(1, 320, 240)],
            &[(0, vec![(7, 0, true, vec![9]), (1, 0, true, vec![1])])],
        );
        let sink = demux(&data).unwrap();
        assert_eq!(sink.samples.len(), 1);
        assert_eq!(sink.samples[0].track_id, TrackId::new(1));
    }

    #[test]
    fn test_block_group_with_block_additions() {
        let mut video = ebml_uint(&[0xB0], 320);
        video.extend(ebml_uint(&[0xBA], 240));
        video.extend(ebml_uint(&[0x53, 0xB8], 0));
        let mut entry = ebml_uint(&[0xD7], 1);
        entry.extend(ebml_uint(&[0x83], 1));
        entry.extend(ebml_element(&[0x86], b"V_VP9"));
        entry.extend(ebml_element(&[0x22, 0xB5, 0x9D], b"en-US"));
        entry.extend(ebml_element(&[0xE0], &video));

        // alpha plane carried as BlockAdditional with BlockAddID 1
        let mut more = ebml_uint(&[0xEE], 1);
        more.extend(ebml_element(&[0xA5], &[0xAA; 6]));
        let mut group = ebml_element(&[0xA1], &[0x81, 0x00, 0x10, 0x00, 1, 2, 3]);
        group.extend(ebml_element(&[0x75, 0xA1], &ebml_element(&[0xA6], &more)));
        let mut cluster = ebml_uint(&[0xE7], 2000);
        cluster.extend(ebml_element(&[0xA0], &group));

        let mut segment = ebml_element(&[0x16, 0x54, 0xAE, 0x6B], &ebml_element(&[0xAE], &entry));
        segment.extend(ebml_element(&[0x1F, 0x43, 0xB6, 0x75], &cluster));
        let mut data = ebml_element(&[0x1A, 0x45, 0xDF, 0xA3], &ebml_element(&[0x42, 0x82], b"webm"));
        data.extend(ebml_element(&[0x18, 0x53, 0x80, 0x67], &segment));

        let sink = demux(&data).unwrap();
        assert_eq!(sink.tracks.len(), 1);
        assert_eq!(sink.samples.len(), 1);
        let sample = &sink.samples[0];
        assert_eq!(sample.cts, 2016);
        assert_eq!(sample.kind, SampleKind::Key);
        assert_eq!(sample.data.as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_rejects_non_ebml_input() {
        let data = ebml_element(&[0x18, 0x53, 0x80, 0x67], &[]);
        assert!(matches!(demux(&data), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_colour_element() {
        let mut colour = ebml_element(&[0x55, 0xBB], &[9]);
        colour.extend(ebml_element(&[0x55, 0xBA], &[16]));
        colour.extend(ebml_element(&[0x55, 0xB1], &[9]));
        colour.extend(ebml_element(&[0x55, 0xB9], &[2]));
        let mut video = ebml_element(&[0xB0], &[0x0F, 0x00]);
        video.extend(ebml_element(&[0xBA], &[0x08, 0x70]));
        video.extend(ebml_element(&[0x55, 0xB0], &colour));

        let mut entry = ebml_element(&[0xD7], &[1]);
        entry.extend(ebml_element(&[0x83], &[1]));
        entry.extend(ebml_element(&[0x86], b"V_VP9"));
        entry.extend(ebml_element(&[0xE0], &video));
        let entry = ebml_element(&[0xAE], &entry);

        let node = parse_ebml(&mut ByteCursor::from_bytes(&entry)).unwrap();
        let track = WebmDemuxer::new().track_from_entry(&node).unwrap().unwrap();
        let info = track.video().unwrap();
        assert_eq!((info.width, info.height), (3840, 2160));
        let color = info.color.unwrap();
        assert!(color.full_range);
        assert!(color.transfer_characteristics.is_hdr());
    }
}

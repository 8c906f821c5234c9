//! Movie box interpretation: headers, sample descriptions, sample tables.

use bytes::Bytes;
use mediaforge_common::{
    AspectRatio, AudioTrackInfo, CodecTag, Track, TrackId, TrackKind, VideoColor, VideoTrackInfo,
};
use mediaforge_probe::codec::{aac, av1, avc, hevc, opus, vpx};
use tracing::{debug, warn};

use super::atoms::{BoxType, HandlerType};
use super::reader::{parse_boxes, BoxNode};
use super::sample_table::{SampleTable, SampleTableBuilder};
use super::writer::{FIXED_MINUS_ONE, FIXED_ONE};
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};

/// Fixed part of a VisualSampleEntry before its child boxes
const VISUAL_SAMPLE_ENTRY_SIZE: usize = 78;
/// Fixed part of an AudioSampleEntry (version 0) before its child boxes
const AUDIO_SAMPLE_ENTRY_SIZE: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovieHeader {
    pub timescale: u32,
    pub duration: u64,
    pub next_track_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackHeader {
    pub track_id: u32,
    pub duration: u64,
    /// Clockwise degrees derived from the matrix
    pub rotation: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaHeader {
    pub timescale: u32,
    pub duration: u64,
}

/// A track of the movie box with its resolved samples.
#[derive(Debug, Clone)]
pub struct MovieTrack {
    pub track: Track,
    pub samples: SampleTable,
}

/// Everything the movie box says about the presentation.
#[derive(Debug, Clone)]
pub struct Movie {
    pub header: MovieHeader,
    pub tracks: Vec<MovieTrack>,
}

fn payload(node: &BoxNode) -> ByteCursor {
    ByteCursor::from_bytes_at(node.data(), node.offset + node.header_size as u64)
}

/// Read a version 0 (32-bit) or version 1 (64-bit) field.
fn get_versioned(c: &mut ByteCursor, version: u8) -> Result<u64> {
    if version == 1 {
        c.get_u64()
    } else {
        Ok(c.get_u32()? as u64)
    }
}

pub fn read_mvhd(node: &BoxNode) -> Result<MovieHeader> {
    let mut c = payload(node);
    let version = c.get_u8()?;
    c.discard(3)?;
    get_versioned(&mut c, version)?; // creation time
    get_versioned(&mut c, version)?; // modification time
    let timescale = c.get_u32()?;
    let duration = get_versioned(&mut c, version)?;
    c.discard(4 + 2 + 10 + 36 + 24)?; // rate, volume, reserved, matrix, pre_defined
    let next_track_id = c.get_u32()?;

    Ok(MovieHeader {
        timescale,
        duration,
        next_track_id,
    })
}

pub fn read_tkhd(node: &BoxNode) -> Result<TrackHeader> {
    let mut c = payload(node);
    let version = c.get_u8()?;
    c.discard(3)?;
    get_versioned(&mut c, version)?;
    get_versioned(&mut c, version)?;
    let track_id = c.get_u32()?;
    c.discard(4)?;
    let duration = get_versioned(&mut c, version)?;
    c.discard(8 + 2 + 2 + 2 + 2)?; // reserved, layer, alternate_group, volume, reserved

    let mut matrix = [0u32; 9];
    for v in &mut matrix {
        *v = c.get_u32()?;
    }
    let width = c.get_u32()? >> 16;
    let height = c.get_u32()? >> 16;

    Ok(TrackHeader {
        track_id,
        duration,
        rotation: rotation_from_matrix(&matrix),
        width,
        height,
    })
}

fn rotation_from_matrix(m: &[u32; 9]) -> u32 {
    match (m[0], m[1], m[3], m[4]) {
        (0, FIXED_ONE, FIXED_MINUS_ONE, 0) => 90,
        (FIXED_MINUS_ONE, 0, 0, FIXED_MINUS_ONE) => 180,
        (0, FIXED_MINUS_ONE, FIXED_ONE, 0) => 270,
        _ => 0,
    }
}

pub fn read_mdhd(node: &BoxNode) -> Result<MediaHeader> {
    let mut c = payload(node);
    let version = c.get_u8()?;
    c.discard(3)?;
    get_versioned(&mut c, version)?;
    get_versioned(&mut c, version)?;
    let timescale = c.get_u32()?;
    let duration = get_versioned(&mut c, version)?;
    if timescale == 0 {
        return Err(Error::invalid_mp4("mdhd timescale of 0"));
    }
    Ok(MediaHeader {
        timescale,
        duration,
    })
}

pub fn read_hdlr(node: &BoxNode) -> Result<HandlerType> {
    let mut c = payload(node);
    c.discard(8)?; // version/flags, pre_defined
    Ok(HandlerType::from_bytes(c.get_fourcc()?))
}

/// Interpret a parsed `moov`. `raw` holds the moov box bytes, used to keep
/// each track's original `trak`.
pub fn read_moov(moov: &BoxNode, raw: &Bytes) -> Result<Movie> {
    let header = read_mvhd(moov.child(BoxType::MVHD).ok_or(Error::MissingAtom("mvhd"))?)?;

    if moov.child(BoxType::MVEX).is_some() {
        return Err(Error::unsupported("fragmented MP4 (mvex)"));
    }

    let mut tracks = Vec::new();
    for trak in moov.children_of(BoxType::TRAK) {
        let start = (trak.offset - moov.offset) as usize;
        let raw_trak = raw
            .get(start..start + trak.size as usize)
            .map(Bytes::copy_from_slice);
        if let Some(track) = read_trak(trak, raw_trak)? {
            tracks.push(track);
        }
    }

    Ok(Movie { header, tracks })
}

fn read_trak(trak: &BoxNode, raw: Option<Bytes>) -> Result<Option<MovieTrack>> {
    let tkhd = read_tkhd(trak.child(BoxType::TKHD).ok_or(Error::MissingAtom("tkhd"))?)?;
    let mdia = trak.child(BoxType::MDIA).ok_or(Error::MissingAtom("mdia"))?;
    let mdhd = read_mdhd(mdia.child(BoxType::MDHD).ok_or(Error::MissingAtom("mdhd"))?)?;
    let handler = read_hdlr(mdia.child(BoxType::HDLR).ok_or(Error::MissingAtom("hdlr"))?)?;
    let stbl = mdia
        .find(&[BoxType::MINF, BoxType::STBL])
        .ok_or(Error::MissingAtom("stbl"))?;
    let stsd = stbl.child(BoxType::STSD).ok_or(Error::MissingAtom("stsd"))?;

    if !matches!(handler, HandlerType::Video | HandlerType::Audio) {
        debug!(track_id = tkhd.track_id, ?handler, "Ignoring track");
        return Ok(None);
    }

    let description = read_stsd(stsd, handler)?;
    let samples = SampleTableBuilder::from_stbl(stbl)?.build()?;

    let kind = match description.kind {
        TrackKind::Video(mut video) => {
            video.rotation = tkhd.rotation;
            if tkhd.rotation == 90 || tkhd.rotation == 270 {
                std::mem::swap(&mut video.width, &mut video.height);
                std::mem::swap(&mut video.display_aspect_width, &mut video.display_aspect_height);
            }
            TrackKind::Video(video)
        }
        audio => audio,
    };

    debug!(
        track_id = tkhd.track_id,
        codec = %description.codec,
        samples = samples.len(),
        timescale = mdhd.timescale,
        "Read trak"
    );

    Ok(Some(MovieTrack {
        track: Track {
            track_id: TrackId::new(tkhd.track_id),
            kind,
            codec: description.codec,
            codec_without_config: description.tag,
            codec_private: description.codec_private,
            timescale: mdhd.timescale,
            raw_box: raw,
        },
        samples,
    }))
}

/// Decoded first sample description.
#[derive(Debug, Clone)]
pub struct SampleDescription {
    pub format: BoxType,
    pub codec: String,
    pub tag: CodecTag,
    pub codec_private: Option<Bytes>,
    pub kind: TrackKind,
}

pub fn read_stsd(stsd: &BoxNode, handler: HandlerType) -> Result<SampleDescription> {
    let data = stsd.data();
    let base = stsd.offset + stsd.header_size as u64;
    if data.len() < 8 {
        return Err(Error::invalid_mp4("stsd too short"));
    }
    let entry_count = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if entry_count == 0 {
        return Err(Error::invalid_mp4("stsd without entries"));
    }
    if entry_count > 1 {
        warn!(entry_count, "Multiple sample descriptions; using the first");
    }

    let entries = parse_boxes(&data[8..], base + 8)?;
    let entry = entries
        .first()
        .ok_or_else(|| Error::invalid_mp4("stsd without entries"))?;
    let content = entry.data();
    let content_base = entry.offset + entry.header_size as u64;

    match handler {
        HandlerType::Video => read_visual_entry(entry.box_type, content, content_base),
        _ => read_audio_entry(entry.box_type, content, content_base),
    }
}

fn child_data(children: &[BoxNode], box_type: BoxType) -> Option<&[u8]> {
    children
        .iter()
        .find(|c| c.box_type == box_type)
        .map(BoxNode::data)
}

fn read_visual_entry(format: BoxType, content: &[u8], base: u64) -> Result<SampleDescription> {
    if content.len() < VISUAL_SAMPLE_ENTRY_SIZE {
        return Err(Error::invalid_mp4(format!("{} sample entry too short", format)));
    }
    let width = u16::from_be_bytes([content[24], content[25]]) as u32;
    let height = u16::from_be_bytes([content[26], content[27]]) as u32;
    let children = parse_boxes(
        &content[VISUAL_SAMPLE_ENTRY_SIZE..],
        base + VISUAL_SAMPLE_ENTRY_SIZE as u64,
    )?;

    let mut video = VideoTrackInfo::with_dimensions(width, height);
    let (codec, tag, codec_private) = match format {
        BoxType::AVC1 | BoxType::AVC3 => {
            let avcc = child_data(&children, BoxType::AVCC).ok_or(Error::MissingAtom("avcC"))?;
            let config = avc::parse_avcc(avcc)?;
            let sps = config.first_sps()?;
            video = avc::video_info_from_sps(&sps);
            let codec = format!("{}{}", format, &avc::get_codec_string_from_sps(&sps)[4..]);
            (codec, CodecTag::H264, Some(Bytes::copy_from_slice(avcc)))
        }
        BoxType::HVC1 | BoxType::HEV1 => {
            let hvcc = child_data(&children, BoxType::HVCC).ok_or(Error::MissingAtom("hvcC"))?;
            let config = hevc::parse_hvcc(hvcc)?;
            (
                hevc::get_hevc_codec_string(format.as_str(), &config),
                CodecTag::H265,
                Some(Bytes::copy_from_slice(hvcc)),
            )
        }
        BoxType::AV01 => {
            let av1c = child_data(&children, BoxType::AV1C).ok_or(Error::MissingAtom("av1C"))?;
            let config = av1::parse_av1c(av1c)?;
            (
                av1::get_av1_codec_string(&config),
                CodecTag::Av1,
                Some(Bytes::copy_from_slice(av1c)),
            )
        }
        BoxType::VP09 => match child_data(&children, BoxType::VPCC) {
            Some(vpcc) => {
                let config = vpx::parse_vpcc(vpcc)?;
                video.color = Some(VideoColor::from_codes(
                    config.colour_primaries,
                    config.transfer_characteristics,
                    config.matrix_coefficients,
                    config.video_full_range,
                ));
                (
                    vpx::get_vp9_codec_string(&config),
                    CodecTag::Vp9,
                    Some(Bytes::copy_from_slice(vpcc)),
                )
            }
            None => (vpx::DEFAULT_VP9_CODEC_STRING.to_string(), CodecTag::Vp9, None),
        },
        other => (other.to_string(), CodecTag::Other(other.to_string()), None),
    };

    if let Some(pasp) = child_data(&children, BoxType::PASP) {
        if pasp.len() >= 8 {
            let h = u32::from_be_bytes([pasp[0], pasp[1], pasp[2], pasp[3]]);
            let v = u32::from_be_bytes([pasp[4], pasp[5], pasp[6], pasp[7]]);
            if h > 0 && v > 0 {
                video.sample_aspect_ratio = AspectRatio::new(h, v);
                video.display_aspect_width = (video.width as u64 * h as u64 / v as u64) as u32;
                video.display_aspect_height = video.height;
            }
        }
    }

    if let Some(colr) = child_data(&children, BoxType::COLR) {
        if let Some(color) = read_colr(colr) {
            video.color = Some(color);
        }
    }

    Ok(SampleDescription {
        format,
        codec,
        tag,
        codec_private,
        kind: TrackKind::Video(video),
    })
}

/// `nclx` / `nclc` colour information; ICC profiles are ignored.
fn read_colr(data: &[u8]) -> Option<VideoColor> {
    if data.len() < 10 {
        return None;
    }
    let code = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]).min(255) as u8;
    match &data[0..4] {
        b"nclx" => Some(VideoColor::from_codes(
            code(4),
            code(6),
            code(8),
            data.get(10).is_some_and(|b| b & 0x80 != 0),
        )),
        b"nclc" => Some(VideoColor::from_codes(code(4), code(6), code(8), false)),
        _ => None,
    }
}

fn read_audio_entry(format: BoxType, content: &[u8], base: u64) -> Result<SampleDescription> {
    if content.len() < AUDIO_SAMPLE_ENTRY_SIZE {
        return Err(Error::invalid_mp4(format!("{} sample entry too short", format)));
    }
    let sound_version = u16::from_be_bytes([content[8], content[9]]);
    let channels = u16::from_be_bytes([content[16], content[17]]);
    let sample_rate = u32::from_be_bytes([content[24], content[25], content[26], content[27]]) >> 16;

    // QuickTime sound description versions carry extra fields
    let fixed = AUDIO_SAMPLE_ENTRY_SIZE
        + match sound_version {
            1 => 16,
            2 => 36,
            _ => 0,
        };
    let children = match content.get(fixed..) {
        Some(rest) => parse_boxes(rest, base + fixed as u64)?,
        None => Vec::new(),
    };

    let mut audio = AudioTrackInfo {
        sample_rate,
        number_of_channels: channels,
    };

    let (codec, tag, codec_private) = match format {
        BoxType::MP4A => {
            let esds = child_data(&children, BoxType::ESDS).ok_or(Error::MissingAtom("esds"))?;
            let descriptor = aac::parse_esds(esds)?;
            match descriptor.object_type_indication {
                0x40 | 0x66 | 0x67 | 0x68 => {
                    let asc = descriptor
                        .decoder_specific_info
                        .ok_or(Error::MissingAtom("DecoderSpecificInfo"))?;
                    let parsed = aac::parse_audio_specific_config(&asc)?;
                    audio.sample_rate = parsed.sample_rate;
                    if parsed.channel_configuration > 0 {
                        audio.number_of_channels = parsed.channel_configuration as u16;
                    }
                    (
                        aac::get_aac_codec_string(parsed.audio_object_type),
                        CodecTag::Aac,
                        Some(asc),
                    )
                }
                0x69 | 0x6B => ("mp3".to_string(), CodecTag::Mp3, None),
                oti => {
                    let codec = format!("mp4a.{:02x}", oti);
                    (codec.clone(), CodecTag::Other(codec), None)
                }
            }
        }
        BoxType::OPUS => {
            let dops = child_data(&children, BoxType::DOPS).ok_or(Error::MissingAtom("dOps"))?;
            let head = opus::parse_dops(dops)?;
            audio.number_of_channels = head.channel_count as u16;
            audio.sample_rate = opus::OPUS_SAMPLE_RATE;
            ("opus".to_string(), CodecTag::Opus, Some(Bytes::copy_from_slice(dops)))
        }
        other => (other.to_string(), CodecTag::Other(other.to_string()), None),
    };

    Ok(SampleDescription {
        format,
        codec,
        tag,
        codec_private,
        kind: TrackKind::Audio(audio),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isobmff::mux::{create_padded_moov_atom, MuxOptions, MuxSample};
    use crate::isobmff::reader::parse_box;
    use crate::isobmff::writer::rotation_matrix;
    use crate::testing::h264_track;
    use mediaforge_common::SampleKind;

    #[test]
    fn test_rotation_from_matrix() {
        for rotation in [0, 90, 180, 270] {
            assert_eq!(rotation_from_matrix(&rotation_matrix(rotation)), rotation);
        }
        assert_eq!(rotation_from_matrix(&rotation_matrix(45)), 0);
    }

    #[test]
    fn test_colr_nclx() {
        let mut colr = b"nclx".to_vec();
        colr.extend_from_slice(&[0, 9, 0, 16, 0, 9, 0x80]);
        let color = read_colr(&colr).unwrap();
        assert_eq!(color.primaries.code(), 9);
        assert!(color.full_range);
        assert!(read_colr(b"prof\0\0\0\0\0\0\0").is_none());
    }

    #[test]
    fn test_reads_back_written_moov() {
        let track = h264_track(1, 90000, 1920, 1080);
        let mut options = MuxOptions::new(vec![track]);
        options.samples.push(MuxSample {
            track_id: TrackId::new(1),
            dts: 0,
            cts: 0,
            duration: 3000,
            size: 100,
            offset: 10_000,
            kind: SampleKind::Key,
        });

        let raw = create_padded_moov_atom(&options).unwrap();
        let moov = parse_box(&mut ByteCursor::from_bytes(&raw)).unwrap();
        let movie = read_moov(&moov, &raw).unwrap();

        assert_eq!(movie.header.next_track_id, 2);
        assert_eq!(movie.tracks.len(), 1);
        let parsed = &movie.tracks[0];
        assert_eq!(parsed.track.codec, "avc1.640028");
        assert_eq!(parsed.track.timescale, 90000);
        assert_eq!(parsed.track.video().unwrap().width, 1920);
        assert_eq!(parsed.track.video().unwrap().height, 1080);
        assert!(parsed.track.raw_box.as_ref().unwrap().starts_with(&[0, 0]));
        assert_eq!(parsed.samples.len(), 1);
        assert_eq!(parsed.samples.samples[0].offset, 10_000);
        assert_eq!(parsed.samples.samples[0].duration, 3000);
    }
}

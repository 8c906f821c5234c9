//! Progressive MP4 writing.
//!
//! The movie box is written into a fixed reservation of [`HEADER_LENGTH`]
//! bytes so that the media data can start at a known offset. Whatever the
//! movie box does not use is absorbed by a trailing `free` child.

use bytes::{BufMut, Bytes, BytesMut};
use mediaforge_common::{
    AspectRatio, AudioTrackInfo, CodecTag, Sample, SampleKind, Track, TrackId, TrackKind,
    VideoTrackInfo,
};
use mediaforge_probe::codec::{aac, avc, opus};
use tracing::{debug, info, warn};

use super::atoms::{BoxType, HandlerType};
use super::reader::parse_boxes;
use super::writer::{rotation_matrix, BoxWriter, IDENTITY_MATRIX};
use crate::error::{Error, Result};
use crate::registry::SampleSink;

/// Movie timescale of written files.
pub const ISO_BASE_TIMESCALE: u32 = 1000;

/// Bytes reserved for the movie box.
pub const HEADER_LENGTH: usize = 8196;

const FREE_BOX_HEADER_SIZE: usize = 8;
/// `ftyp` with a major brand, minor version and four compatible brands
const FTYP_SIZE: usize = 32;
/// ISO-639-2/T `und`, packed as three 5-bit letters
const LANGUAGE_UNDETERMINED: u16 = 0x55C4;
/// `data` atom type for UTF-8 text
const WELL_KNOWN_TYPE_UTF8: u32 = 1;

/// Placement of one sample in the media data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxSample {
    pub track_id: TrackId,
    pub dts: i64,
    pub cts: i64,
    pub duration: u32,
    pub size: u32,
    /// Absolute file offset of the first byte
    pub offset: u64,
    pub kind: SampleKind,
}

/// Input of [`create_padded_moov_atom`].
#[derive(Debug, Clone)]
pub struct MuxOptions {
    pub tracks: Vec<Track>,
    pub samples: Vec<MuxSample>,
    /// `©too` metadata item
    pub tool: Option<String>,
    /// `©cmt` metadata item
    pub comment: Option<String>,
    /// Exact size of the written movie box
    pub header_length: usize,
}

impl MuxOptions {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            samples: Vec::new(),
            tool: Some(format!("mediaforge {}", env!("CARGO_PKG_VERSION"))),
            comment: None,
            header_length: HEADER_LENGTH,
        }
    }
}

/// Serialize a movie box of exactly `options.header_length` bytes.
pub fn create_padded_moov_atom(options: &MuxOptions) -> Result<Bytes> {
    let mut w = BoxWriter::with_capacity(options.header_length);
    w.begin_box(BoxType::MOOV);

    let mut movie_duration = 0u64;
    for track in &options.tracks {
        let duration = track_duration(options, track.track_id);
        movie_duration = movie_duration.max(to_movie_time(duration, track.timescale));
    }
    let next_track_id = options
        .tracks
        .iter()
        .map(|t| t.track_id.get())
        .max()
        .unwrap_or(0)
        + 1;
    write_mvhd(&mut w, movie_duration, next_track_id)?;

    for track in &options.tracks {
        let samples: Vec<&MuxSample> = options
            .samples
            .iter()
            .filter(|s| s.track_id == track.track_id)
            .collect();
        write_trak(&mut w, track, &samples)?;
    }

    write_udta(&mut w, options)?;

    let used = w.len();
    let padding = options
        .header_length
        .checked_sub(used)
        .filter(|p| *p == 0 || *p >= FREE_BOX_HEADER_SIZE)
        .ok_or(Error::HeaderOverflow {
            size: used,
            reserved: options.header_length,
        })?;
    if padding > 0 {
        w.begin_box(BoxType::FREE);
        w.put_zeros(padding - FREE_BOX_HEADER_SIZE);
        w.end_box()?;
    }

    w.end_box()?;
    debug!(used, padding, tracks = options.tracks.len(), "Wrote moov");
    w.finish()
}

fn track_duration(options: &MuxOptions, track_id: TrackId) -> u64 {
    options
        .samples
        .iter()
        .filter(|s| s.track_id == track_id)
        .map(|s| s.duration as u64)
        .sum()
}

fn to_movie_time(duration: u64, timescale: u32) -> u64 {
    if timescale == 0 {
        return 0;
    }
    (duration as u128 * ISO_BASE_TIMESCALE as u128 / timescale as u128) as u64
}

fn write_mvhd(w: &mut BoxWriter, duration: u64, next_track_id: u32) -> Result<()> {
    w.begin_full_box(BoxType::MVHD, 1, 0);
    w.put_u64(0); // creation time
    w.put_u64(0); // modification time
    w.put_u32(ISO_BASE_TIMESCALE);
    w.put_u64(duration);
    w.put_u32(0x0001_0000); // rate 1.0
    w.put_u16(0x0100); // volume 1.0
    w.put_zeros(10);
    w.put_matrix(&IDENTITY_MATRIX);
    w.put_zeros(24); // pre_defined
    w.put_u32(next_track_id);
    w.end_box()
}

fn write_trak(w: &mut BoxWriter, track: &Track, samples: &[&MuxSample]) -> Result<()> {
    let duration: u64 = samples.iter().map(|s| s.duration as u64).sum();
    let handler = match track.kind {
        TrackKind::Video(_) => HandlerType::Video,
        TrackKind::Audio(_) => HandlerType::Audio,
    };

    w.begin_box(BoxType::TRAK);
    write_tkhd(w, track, to_movie_time(duration, track.timescale))?;

    w.begin_box(BoxType::MDIA);
    w.begin_full_box(BoxType::MDHD, 1, 0);
    w.put_u64(0);
    w.put_u64(0);
    w.put_u32(track.timescale);
    w.put_u64(duration);
    w.put_u16(LANGUAGE_UNDETERMINED);
    w.put_u16(0);
    w.end_box()?;

    w.begin_full_box(BoxType::HDLR, 0, 0);
    w.put_u32(0); // pre_defined
    w.put_slice(&handler.as_bytes());
    w.put_zeros(12);
    w.put_slice(match handler {
        HandlerType::Video => b"VideoHandler\0",
        _ => b"SoundHandler\0",
    });
    w.end_box()?;

    w.begin_box(BoxType::MINF);
    match handler {
        HandlerType::Video => {
            w.begin_full_box(BoxType::VMHD, 0, 1);
            w.put_zeros(8); // graphicsmode, opcolor
        }
        _ => {
            w.begin_full_box(BoxType::SMHD, 0, 0);
            w.put_zeros(4); // balance, reserved
        }
    }
    w.end_box()?;

    w.begin_box(BoxType::DINF);
    w.begin_full_box(BoxType::DREF, 0, 0);
    w.put_u32(1);
    // self-contained: media data is in this file
    w.begin_full_box(BoxType::URL, 0, 1);
    w.end_box()?;
    w.end_box()?;
    w.end_box()?;

    w.begin_box(BoxType::STBL);
    match track.raw_box.as_deref().map(retained_stsd).transpose()?.flatten() {
        Some(stsd) => {
            debug!(track_id = %track.track_id, len = stsd.len(), "Copying original stsd");
            w.put_slice(stsd);
        }
        None => write_stsd(w, track)?,
    }
    write_sample_tables(w, samples)?;
    w.end_box()?; // stbl
    w.end_box()?; // minf
    w.end_box()?; // mdia
    w.end_box() // trak
}

/// Width and height before the track matrix is applied.
fn unrotated_dimensions(video: &VideoTrackInfo) -> (u32, u32) {
    match video.rotation {
        90 | 270 => (video.height, video.width),
        _ => (video.width, video.height),
    }
}

fn write_tkhd(w: &mut BoxWriter, track: &Track, duration: u64) -> Result<()> {
    // enabled | in movie | in preview
    w.begin_full_box(BoxType::TKHD, 1, 0x7);
    w.put_u64(0);
    w.put_u64(0);
    w.put_u32(track.track_id.get());
    w.put_u32(0);
    w.put_u64(duration);
    w.put_zeros(8);
    w.put_u16(0); // layer
    w.put_u16(0); // alternate group

    match &track.kind {
        TrackKind::Video(video) => {
            let (width, height) = unrotated_dimensions(video);
            w.put_u16(0);
            w.put_u16(0);
            w.put_matrix(&rotation_matrix(video.rotation));
            w.put_u32(width << 16);
            w.put_u32(height << 16);
        }
        TrackKind::Audio(_) => {
            w.put_u16(0x0100);
            w.put_u16(0);
            w.put_matrix(&IDENTITY_MATRIX);
            w.put_u32(0);
            w.put_u32(0);
        }
    }
    w.end_box()
}

fn write_stsd(w: &mut BoxWriter, track: &Track) -> Result<()> {
    w.begin_full_box(BoxType::STSD, 0, 0);
    w.put_u32(1);
    match &track.kind {
        TrackKind::Video(video) => write_visual_entry(w, track, video)?,
        TrackKind::Audio(audio) => write_audio_entry(w, track, audio)?,
    }
    w.end_box()
}

/// The `stsd` box of a `trak` read from an MP4 file, byte for byte.
fn retained_stsd(raw_trak: &[u8]) -> Result<Option<&[u8]>> {
    let boxes = parse_boxes(raw_trak, 0)?;
    let stsd = boxes
        .iter()
        .find(|b| b.box_type == BoxType::TRAK)
        .and_then(|trak| {
            trak.find(&[BoxType::MDIA, BoxType::MINF, BoxType::STBL, BoxType::STSD])
        });
    Ok(stsd.and_then(|stsd| raw_trak.get(stsd.offset as usize..stsd.end() as usize)))
}

fn codec_private<'a>(track: &'a Track, what: &'static str) -> Result<&'a [u8]> {
    track
        .codec_private
        .as_deref()
        .ok_or(Error::MissingElement(what))
}

fn write_visual_entry(w: &mut BoxWriter, track: &Track, video: &VideoTrackInfo) -> Result<()> {
    let (format, config_box) = match &track.codec_without_config {
        CodecTag::H264 => (BoxType::AVC1, Some((BoxType::AVCC, codec_private(track, "avcC")?))),
        CodecTag::H265 => {
            let format = if track.codec.starts_with("hev1") {
                BoxType::HEV1
            } else {
                BoxType::HVC1
            };
            (format, Some((BoxType::HVCC, codec_private(track, "hvcC")?)))
        }
        CodecTag::Av1 => (BoxType::AV01, Some((BoxType::AV1C, codec_private(track, "av1C")?))),
        CodecTag::Vp9 => (BoxType::VP09, None),
        other => {
            return Err(Error::unsupported(format!("muxing {} video", other)));
        }
    };
    let (width, height) = unrotated_dimensions(video);
    let dimension = |v: u32| {
        u16::try_from(v).map_err(|_| Error::unsupported(format!("frame dimension {}", v)))
    };

    w.begin_box(format);
    w.put_zeros(6);
    w.put_u16(1); // data reference index
    w.put_zeros(16); // pre_defined, reserved
    w.put_u16(dimension(width)?);
    w.put_u16(dimension(height)?);
    w.put_u32(0x0048_0000); // 72 dpi
    w.put_u32(0x0048_0000);
    w.put_u32(0);
    w.put_u16(1); // frame count
    w.put_zeros(32); // compressor name
    w.put_u16(0x0018);
    w.put_u16(0xFFFF);

    match config_box {
        Some((box_type, content)) => w.write_box(box_type, content)?,
        None => {
            let vpcc = match track.codec_private.as_deref() {
                Some(vpcc) => Bytes::copy_from_slice(vpcc),
                None => default_vpcc(video),
            };
            w.write_box(BoxType::VPCC, &vpcc)?;
        }
    }

    if video.sample_aspect_ratio != AspectRatio::SQUARE && video.sample_aspect_ratio.denominator > 0
    {
        w.begin_box(BoxType::PASP);
        w.put_u32(video.sample_aspect_ratio.numerator);
        w.put_u32(video.sample_aspect_ratio.denominator);
        w.end_box()?;
    }

    if let Some(color) = &video.color {
        w.begin_box(BoxType::COLR);
        w.put_slice(b"nclx");
        w.put_u16(color.primaries.code() as u16);
        w.put_u16(color.transfer_characteristics.code() as u16);
        w.put_u16(color.matrix_coefficients.code() as u16);
        w.put_u8(if color.full_range { 0x80 } else { 0 });
        w.end_box()?;
    }

    w.end_box()
}

/// `vpcC` for a VP9 track that arrived without one: profile 0, level 1.0,
/// 8 bits, 4:2:0 colocated.
fn default_vpcc(video: &VideoTrackInfo) -> Bytes {
    let (primaries, transfer, matrix, full_range) = match &video.color {
        Some(c) => (
            c.primaries.code(),
            c.transfer_characteristics.code(),
            c.matrix_coefficients.code(),
            c.full_range,
        ),
        None => (2, 2, 2, false),
    };
    let mut buf = BytesMut::with_capacity(12);
    buf.put_u32(0x0100_0000); // version 1, flags 0
    buf.put_u8(0);
    buf.put_u8(10);
    buf.put_u8((8 << 4) | (1 << 1) | full_range as u8);
    buf.put_u8(primaries);
    buf.put_u8(transfer);
    buf.put_u8(matrix);
    buf.put_u16(0); // codec initialization data size
    buf.freeze()
}

fn write_audio_entry(w: &mut BoxWriter, track: &Track, audio: &AudioTrackInfo) -> Result<()> {
    let format = match &track.codec_without_config {
        CodecTag::Aac | CodecTag::Mp3 => BoxType::MP4A,
        CodecTag::Opus => BoxType::OPUS,
        other => return Err(Error::unsupported(format!("muxing {} audio", other))),
    };

    w.begin_box(format);
    w.put_zeros(6);
    w.put_u16(1); // data reference index
    w.put_zeros(8); // version, revision, vendor
    w.put_u16(audio.number_of_channels);
    w.put_u16(16); // sample size
    w.put_u32(0); // pre_defined, reserved
    // 16.16 fixed point; rates that do not fit are left to the decoder config
    if audio.sample_rate <= u16::MAX as u32 {
        w.put_u32(audio.sample_rate << 16);
    } else {
        warn!(
            track_id = %track.track_id,
            sample_rate = audio.sample_rate,
            "Sample rate does not fit the sample entry, writing 0"
        );
        w.put_u32(0);
    }

    match &track.codec_without_config {
        CodecTag::Aac => {
            let asc = codec_private(track, "AudioSpecificConfig")?;
            w.write_box(BoxType::ESDS, &esds_content(0x40, Some(asc)))?;
        }
        CodecTag::Mp3 => w.write_box(BoxType::ESDS, &esds_content(0x6B, None))?,
        _ => {
            let private = codec_private(track, "OpusHead")?;
            w.write_box(BoxType::DOPS, &dops_content(private)?)?;
        }
    }

    w.end_box()
}

/// `esds` payload: ES_Descriptor > DecoderConfigDescriptor > DecoderSpecificInfo,
/// followed by an SLConfigDescriptor.
fn esds_content(object_type_indication: u8, decoder_specific_info: Option<&[u8]>) -> Bytes {
    let dsi_len = decoder_specific_info.map_or(0, |d| 2 + d.len());
    let decoder_config_len = 13 + dsi_len;
    let es_len = 3 + 2 + decoder_config_len + 3;

    let mut buf = BytesMut::new();
    buf.put_u32(0); // version/flags
    buf.put_u8(0x03);
    buf.put_u8(es_len as u8);
    buf.put_u16(0); // ES_ID
    buf.put_u8(0); // flags
    buf.put_u8(0x04);
    buf.put_u8(decoder_config_len as u8);
    buf.put_u8(object_type_indication);
    buf.put_u8((0x05 << 2) | 1); // audio stream
    buf.put_slice(&[0, 0, 0]); // buffer size
    buf.put_u32(0); // max bitrate
    buf.put_u32(0); // average bitrate
    if let Some(dsi) = decoder_specific_info {
        buf.put_u8(0x05);
        buf.put_u8(dsi.len() as u8);
        buf.put_slice(dsi);
    }
    buf.put_slice(&[0x06, 0x01, 0x02]);
    buf.freeze()
}

/// Opus configuration as `dOps`; Matroska's `OpusHead` is converted.
fn dops_content(private: &[u8]) -> Result<Bytes> {
    if !private.starts_with(b"OpusHead") {
        opus::parse_dops(private)?;
        return Ok(Bytes::copy_from_slice(private));
    }
    let head = opus::parse_opus_head(private)?;
    if head.channel_mapping_family != 0 {
        return Err(Error::unsupported(format!(
            "Opus channel mapping family {}",
            head.channel_mapping_family
        )));
    }
    let mut buf = BytesMut::with_capacity(11);
    buf.put_u8(0);
    buf.put_u8(head.channel_count);
    buf.put_u16(head.pre_skip);
    buf.put_u32(head.input_sample_rate);
    buf.put_i16(head.output_gain);
    buf.put_u8(head.channel_mapping_family);
    Ok(buf.freeze())
}

fn write_sample_tables(w: &mut BoxWriter, samples: &[&MuxSample]) -> Result<()> {
    // stts: runs of equal durations
    let mut stts: Vec<(u32, u32)> = Vec::new();
    for sample in samples {
        match stts.last_mut() {
            Some((count, delta)) if *delta == sample.duration => *count += 1,
            _ => stts.push((1, sample.duration)),
        }
    }
    w.begin_full_box(BoxType::STTS, 0, 0);
    w.put_u32(stts.len() as u32);
    for (count, delta) in &stts {
        w.put_u32(*count);
        w.put_u32(*delta);
    }
    w.end_box()?;

    if samples.iter().any(|s| s.kind != SampleKind::Key) {
        let sync: Vec<u32> = samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == SampleKind::Key)
            .map(|(i, _)| i as u32 + 1)
            .collect();
        w.begin_full_box(BoxType::STSS, 0, 0);
        w.put_u32(sync.len() as u32);
        for number in sync {
            w.put_u32(number);
        }
        w.end_box()?;
    }

    if samples.iter().any(|s| s.cts != s.dts) {
        let mut ctts: Vec<(u32, i32)> = Vec::new();
        for sample in samples {
            let offset = i32::try_from(sample.cts - sample.dts)
                .map_err(|_| Error::invalid_mp4("composition offset out of range"))?;
            match ctts.last_mut() {
                Some((count, last)) if *last == offset => *count += 1,
                _ => ctts.push((1, offset)),
            }
        }
        // version 1: signed offsets
        w.begin_full_box(BoxType::CTTS, 1, 0);
        w.put_u32(ctts.len() as u32);
        for (count, offset) in ctts {
            w.put_u32(count);
            w.put_i32(offset);
        }
        w.end_box()?;
    }

    // One sample per chunk
    w.begin_full_box(BoxType::STSC, 0, 0);
    if samples.is_empty() {
        w.put_u32(0);
    } else {
        w.put_u32(1);
        w.put_u32(1);
        w.put_u32(1);
        w.put_u32(1);
    }
    w.end_box()?;

    w.begin_full_box(BoxType::STSZ, 0, 0);
    w.put_u32(0);
    w.put_u32(samples.len() as u32);
    for sample in samples {
        w.put_u32(sample.size);
    }
    w.end_box()?;

    w.begin_full_box(BoxType::CO64, 0, 0);
    w.put_u32(samples.len() as u32);
    for sample in samples {
        w.put_u64(sample.offset);
    }
    w.end_box()
}

fn write_udta(w: &mut BoxWriter, options: &MuxOptions) -> Result<()> {
    let items: Vec<(BoxType, &str)> = [
        (BoxType::TOOL, options.tool.as_deref()),
        (BoxType::COMMENT, options.comment.as_deref()),
    ]
    .into_iter()
    .filter_map(|(t, v)| v.map(|v| (t, v)))
    .collect();
    if items.is_empty() {
        return Ok(());
    }

    w.begin_box(BoxType::UDTA);
    w.begin_full_box(BoxType::META, 0, 0);
    w.begin_full_box(BoxType::HDLR, 0, 0);
    w.put_u32(0);
    w.put_slice(b"mdir");
    w.put_slice(b"appl");
    w.put_zeros(8);
    w.put_u8(0);
    w.end_box()?;

    w.begin_box(BoxType::ILST);
    for (box_type, value) in items {
        w.begin_box(box_type);
        w.begin_box(BoxType::DATA);
        w.put_u32(WELL_KNOWN_TYPE_UTF8);
        w.put_u32(0); // locale
        w.put_slice(value.as_bytes());
        w.end_box()?;
        w.end_box()?;
    }
    w.end_box()?; // ilst
    w.end_box()?; // meta
    w.end_box() // udta
}

/// `ftyp` written ahead of the movie box.
fn ftyp() -> Result<Bytes> {
    let mut w = BoxWriter::new();
    w.begin_box(BoxType::FTYP);
    w.put_slice(b"isom");
    w.put_u32(0x200);
    for brand in [b"isom", b"iso2", b"avc1", b"mp41"] {
        w.put_slice(brand);
    }
    w.end_box()?;
    w.finish()
}

/// Collects tracks and samples and writes them as a progressive MP4:
/// `ftyp`, a padded `moov`, then one `mdat` holding every sample in arrival
/// order.
///
/// H.264 samples arriving as Annex B byte streams are rewritten with 4-byte
/// length prefixes.
#[derive(Debug, Default)]
pub struct Mp4Muxer {
    tracks: Vec<Track>,
    samples: Vec<Sample>,
    tool: Option<String>,
    comment: Option<String>,
    header_length: Option<usize>,
}

impl Mp4Muxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_header_length(mut self, header_length: usize) -> Self {
        self.header_length = Some(header_length);
        self
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Sample placement for a file laid out as `ftyp`, `moov`, `mdat`.
    fn layout(&self) -> Result<Layout> {
        let mut options = MuxOptions::new(self.tracks.clone());
        if let Some(ref tool) = self.tool {
            options.tool = Some(tool.clone());
        }
        options.comment = self.comment.clone();
        if let Some(header_length) = self.header_length {
            options.header_length = header_length;
        }

        let payload_len: u64 = self.samples.iter().map(|s| s.data.len() as u64).sum();
        let mdat_header_len = if payload_len + 8 > u32::MAX as u64 { 16 } else { 8 };
        let mut offset = (FTYP_SIZE + options.header_length) as u64 + mdat_header_len;

        let durations = sample_durations(&self.samples);
        for (sample, duration) in self.samples.iter().zip(durations) {
            let size = u32::try_from(sample.data.len())
                .map_err(|_| Error::invalid_mp4("sample larger than 4 GiB"))?;
            options.samples.push(MuxSample {
                track_id: sample.track_id,
                dts: sample.dts,
                cts: sample.cts,
                duration,
                size,
                offset,
                kind: sample.kind,
            });
            offset += size as u64;
        }

        Ok(Layout {
            options,
            payload_len,
            mdat_header_len,
            total_len: offset,
        })
    }

    /// The padded movie box alone, with sample offsets pointing into the
    /// `mdat` that [`finish`](Self::finish) would write.
    pub fn moov(&self) -> Result<Bytes> {
        create_padded_moov_atom(&self.layout()?.options)
    }

    /// Lay out and serialize the whole file.
    pub fn finish(self) -> Result<Bytes> {
        let layout = self.layout()?;
        let ftyp = ftyp()?;
        let moov = create_padded_moov_atom(&layout.options)?;

        let mut out = BytesMut::with_capacity(layout.total_len as usize);
        out.put_slice(&ftyp);
        out.put_slice(&moov);
        if layout.mdat_header_len == 16 {
            out.put_u32(1);
            out.put_slice(&BoxType::MDAT.0);
            out.put_u64(layout.payload_len + 16);
        } else {
            out.put_u32((layout.payload_len + 8) as u32);
            out.put_slice(&BoxType::MDAT.0);
        }
        for sample in &self.samples {
            out.put_slice(&sample.data);
        }

        info!(
            tracks = layout.options.tracks.len(),
            samples = layout.options.samples.len(),
            bytes = out.len(),
            "Muxed MP4"
        );
        Ok(out.freeze())
    }
}

struct Layout {
    options: MuxOptions,
    payload_len: u64,
    mdat_header_len: u64,
    total_len: u64,
}

/// Duration of each sample: the distance to the next sample of the same
/// track, or for the last one its own duration, else its predecessor's.
fn sample_durations(samples: &[Sample]) -> Vec<u32> {
    let mut durations = vec![0u32; samples.len()];
    let mut last_index: std::collections::HashMap<TrackId, usize> =
        std::collections::HashMap::new();

    for (i, sample) in samples.iter().enumerate() {
        if let Some(prev) = last_index.insert(sample.track_id, i) {
            let delta = (sample.dts - samples[prev].dts).clamp(0, u32::MAX as i64);
            durations[prev] = delta as u32;
        }
    }
    let mut previous: std::collections::HashMap<TrackId, u32> = std::collections::HashMap::new();
    for (i, sample) in samples.iter().enumerate() {
        let is_last = last_index.get(&sample.track_id) == Some(&i);
        if is_last {
            durations[i] = sample
                .duration
                .or_else(|| previous.get(&sample.track_id).copied())
                .unwrap_or(0);
        } else {
            previous.insert(sample.track_id, durations[i]);
        }
    }
    durations
}

fn is_annex_b(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 1]) || data.starts_with(&[0, 0, 0, 1])
}

/// Annex B access unit to 4-byte length-prefixed NAL units, without AUDs.
fn to_length_prefixed(data: &Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(data.len() + 16);
    for unit in avc::extract_annex_b(data) {
        if unit.nal_type == avc::NalUnitType::Aud {
            continue;
        }
        buf.put_u32(unit.data.len() as u32);
        buf.put_slice(&unit.data);
    }
    buf.freeze()
}

impl SampleSink for Mp4Muxer {
    fn on_track(&mut self, track: &Track) -> Result<()> {
        if track.codec_without_config == CodecTag::Aac {
            aac::parse_audio_specific_config(codec_private(track, "AudioSpecificConfig")?)?;
        }
        self.tracks.push(track.clone());
        Ok(())
    }

    fn on_sample(&mut self, mut sample: Sample) -> Result<()> {
        let is_h264 = self
            .tracks
            .iter()
            .any(|t| t.track_id == sample.track_id && t.codec_without_config == CodecTag::H264);
        if is_h264 && is_annex_b(&sample.data) {
            sample.data = to_length_prefixed(&sample.data);
        }
        self.samples.push(sample);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::ByteCursor;
    use crate::isobmff::moov::read_moov;
    use crate::isobmff::reader::{parse_box, BoxPayload};
    use crate::testing::{aac_track, h264_track};
    use mediaforge_probe::testing::{h264_delta_frame, h264_key_frame};

    #[test]
    fn test_moov_fills_reservation_exactly() {
        let options = MuxOptions::new(vec![h264_track(1, 90000, 1280, 720)]);
        let moov = create_padded_moov_atom(&options).unwrap();
        assert_eq!(moov.len(), HEADER_LENGTH);

        let node = parse_box(&mut ByteCursor::from_bytes(&moov)).unwrap();
        assert_eq!(node.size, HEADER_LENGTH as u64);
        let last = node.children().last().unwrap();
        assert_eq!(last.box_type, BoxType::FREE);
        assert_eq!(last.end(), HEADER_LENGTH as u64);
    }

    #[test]
    fn test_next_track_id_follows_highest() {
        let options = MuxOptions::new(vec![h264_track(256, 90000, 640, 360), aac_track(257)]);
        let moov = create_padded_moov_atom(&options).unwrap();
        let node = parse_box(&mut ByteCursor::from_bytes(&moov)).unwrap();
        let mvhd = crate::isobmff::moov::read_mvhd(node.child(BoxType::MVHD).unwrap()).unwrap();
        assert_eq!(mvhd.timescale, ISO_BASE_TIMESCALE);
        assert_eq!(mvhd.next_track_id, 258);
    }

    #[test]
    fn test_moov_decode_encode_round_trip() {
        let mut options = MuxOptions::new(vec![h264_track(1, 90000, 1280, 720), aac_track(3)]);
        for i in 0..3u32 {
            options.samples.push(MuxSample {
                track_id: TrackId::new(1),
                dts: i as i64 * 3000,
                cts: i as i64 * 3000 + 3000,
                duration: 3000,
                size: 500 + i,
                offset: 9000 + i as u64 * 1000,
                kind: if i == 0 { SampleKind::Key } else { SampleKind::Delta },
            });
            options.samples.push(MuxSample {
                track_id: TrackId::new(3),
                dts: i as i64 * 1024,
                cts: i as i64 * 1024,
                duration: 1024,
                size: 300,
                offset: 12_000 + i as u64 * 300,
                kind: SampleKind::Key,
            });
        }
        let first = create_padded_moov_atom(&options).unwrap();
        let decoded = read_moov(&parse_box(&mut ByteCursor::from_bytes(&first)).unwrap(), &first)
            .unwrap();
        assert!(decoded.tracks.iter().all(|t| t.track.raw_box.is_some()));

        let mut again = MuxOptions::new(decoded.tracks.iter().map(|t| t.track.clone()).collect());
        for movie_track in &decoded.tracks {
            again.samples.extend(movie_track.samples.samples.iter().map(|s| MuxSample {
                track_id: movie_track.track.track_id,
                dts: s.dts,
                cts: s.dts + s.cts_offset as i64,
                duration: s.duration,
                size: s.size,
                offset: s.offset,
                kind: if s.is_sync { SampleKind::Key } else { SampleKind::Delta },
            }));
        }
        let second = create_padded_moov_atom(&again).unwrap();
        assert_eq!(second.len(), HEADER_LENGTH);

        let node = parse_box(&mut ByteCursor::from_bytes(&second)).unwrap();
        assert_eq!(node.size, 8196);
        let reread = read_moov(&node, &second).unwrap();
        assert_eq!(reread.header.next_track_id, 4);
        assert_eq!(reread.tracks.len(), 2);
        for (before, after) in decoded.tracks.iter().zip(&reread.tracks) {
            assert_eq!(after.track.track_id, before.track.track_id);
            assert_eq!(after.track.kind, before.track.kind);
            assert_eq!(after.track.codec, before.track.codec);
            assert_eq!(after.track.codec_private, before.track.codec_private);
            assert_eq!(after.samples.samples, before.samples.samples);

            let stsd_before = retained_stsd(before.track.raw_box.as_ref().unwrap()).unwrap();
            let stsd_after = retained_stsd(after.track.raw_box.as_ref().unwrap()).unwrap();
            assert!(stsd_before.is_some());
            assert_eq!(stsd_after, stsd_before);
        }
    }

    #[test]
    fn test_retained_stsd_is_copied_verbatim() {
        let options = MuxOptions::new(vec![h264_track(1, 90000, 640, 360)]);
        let moov = create_padded_moov_atom(&options).unwrap();
        let movie = read_moov(&parse_box(&mut ByteCursor::from_bytes(&moov)).unwrap(), &moov)
            .unwrap();

        // a codec the muxer cannot describe itself still passes through
        let mut track = movie.tracks[0].track.clone();
        track.codec_without_config = CodecTag::Mp3;
        let raw = track.raw_box.clone().unwrap();
        let stsd = retained_stsd(&raw).unwrap().unwrap().to_vec();

        let written = create_padded_moov_atom(&MuxOptions::new(vec![track])).unwrap();
        assert!(written.windows(stsd.len()).any(|w| w == &stsd[..]));
    }

    #[test]
    fn test_metadata_items() {
        let mut options = MuxOptions::new(vec![]);
        options.tool = Some("tool-x".into());
        options.comment = Some("hello".into());
        let moov = create_padded_moov_atom(&options).unwrap();
        let node = parse_box(&mut ByteCursor::from_bytes(&moov)).unwrap();

        let ilst = node
            .find(&[BoxType::UDTA, BoxType::META, BoxType::ILST])
            .unwrap();
        let comment = ilst.child(BoxType::COMMENT).unwrap();
        assert!(matches!(comment.payload, BoxPayload::Data(_)));
        assert!(comment.data().ends_with(b"hello"));
        assert!(ilst.child(BoxType::TOOL).unwrap().data().ends_with(b"tool-x"));
    }

    #[test]
    fn test_header_overflow() {
        let mut options = MuxOptions::new(vec![h264_track(1, 90000, 1280, 720)]);
        options.header_length = 64;
        assert!(matches!(
            create_padded_moov_atom(&options),
            Err(Error::HeaderOverflow { reserved: 64, .. })
        ));

        // a remainder too small for a free box
        let mut options = MuxOptions::new(vec![]);
        options.tool = None;
        let exact = create_padded_moov_atom(&MuxOptions {
            header_length: 0,
            ..options.clone()
        })
        .unwrap_err();
        let Error::HeaderOverflow { size, .. } = exact else {
            panic!("expected overflow");
        };
        options.header_length = size + 3;
        assert!(create_padded_moov_atom(&options).is_err());
        options.header_length = size;
        assert_eq!(create_padded_moov_atom(&options).unwrap().len(), size);
    }

    #[test]
    fn test_audio_entry_sample_rate_field() {
        fn entry_rate(sample_rate: u32) -> u32 {
            let mut track = aac_track(1);
            let TrackKind::Audio(audio) = &mut track.kind else {
                unreachable!()
            };
            audio.sample_rate = sample_rate;
            let audio = audio.clone();

            let mut w = BoxWriter::new();
            write_audio_entry(&mut w, &track, &audio).unwrap();
            let entry = w.finish().unwrap();
            assert_eq!(&entry[4..8], b"mp4a");
            u32::from_be_bytes([entry[32], entry[33], entry[34], entry[35]])
        }

        assert_eq!(entry_rate(48000), 48000 << 16);
        assert_eq!(entry_rate(65535), 65535 << 16);
        assert_eq!(entry_rate(96000), 0);
        assert_eq!(entry_rate(192_000), 0);
    }

    #[test]
    fn test_esds_round_trips_through_parser() {
        let asc = aac::build_audio_specific_config(2, 4, 2);
        let esds = esds_content(0x40, Some(&asc));
        let parsed = aac::parse_esds(&esds).unwrap();
        assert_eq!(parsed.object_type_indication, 0x40);
        assert_eq!(parsed.decoder_specific_info.unwrap(), asc);
    }

    #[test]
    fn test_opus_head_becomes_dops() {
        let mut head = b"OpusHead".to_vec();
        head.extend_from_slice(&[1, 2, 0x38, 0x01, 0x80, 0xBB, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let dops = dops_content(&head).unwrap();
        let parsed = opus::parse_dops(&dops).unwrap();
        assert_eq!(parsed.channel_count, 2);
        assert_eq!(parsed.pre_skip, 312);
        assert_eq!(parsed.input_sample_rate, 48000);
    }

    #[test]
    fn test_durations_from_decode_deltas() {
        let track = TrackId::new(1);
        let other = TrackId::new(2);
        let samples = vec![
            Sample::new(track, 0, 0, Bytes::new(), SampleKind::Key),
            Sample::new(other, 0, 0, Bytes::new(), SampleKind::Key),
            Sample::new(track, 3000, 3000, Bytes::new(), SampleKind::Delta),
            Sample::new(track, 6000, 6000, Bytes::new(), SampleKind::Delta),
        ];
        assert_eq!(sample_durations(&samples), vec![3000, 0, 3000, 3000]);
    }

    #[test]
    fn test_muxer_converts_annex_b() {
        let mut muxer = Mp4Muxer::new();
        muxer.on_track(&h264_track(1, 90000, 320, 240)).unwrap();
        muxer
            .on_sample(Sample::new(TrackId::new(1), 0, 0, h264_key_frame(320, 240), SampleKind::Key))
            .unwrap();
        muxer
            .on_sample(Sample::new(TrackId::new(1), 3000, 3000, h264_delta_frame(), SampleKind::Delta))
            .unwrap();
        assert_eq!(muxer.sample_count(), 2);
        let moov = muxer.moov().unwrap();

        let file = muxer.finish().unwrap();
        assert_eq!(&file[4..8], b"ftyp");
        let moov_start = u32::from_be_bytes([file[0], file[1], file[2], file[3]]) as usize;
        assert_eq!(moov_start, FTYP_SIZE);
        assert_eq!(&file[moov_start..moov_start + HEADER_LENGTH], &moov[..]);
        let mdat_start = moov_start + HEADER_LENGTH;
        assert_eq!(&file[mdat_start + 4..mdat_start + 8], b"mdat");
        // AUD dropped, first NAL is the SPS with a length prefix
        assert_eq!(file[mdat_start + 8 + 4] & 0x1F, 7);
    }
}

//! Builders for synthetic containers used in tests.
//!
//! Enabled for this crate's unit tests and, through the `test-util` feature,
//! for downstream test suites.

use std::collections::HashMap;

use bytes::Bytes;
use mediaforge_common::{AudioTrackInfo, CodecTag, Track, TrackId, TrackKind};
use mediaforge_probe::codec::{aac, avc};
use mediaforge_probe::testing::h264_key_frame;

use crate::ts::handlers;
use crate::ts::PACKET_SIZE;

/// H.264 track as the transport stream handler would register it.
pub fn h264_track(track_id: u32, timescale: u32, width: u32, height: u32) -> Track {
    let units = avc::extract_annex_b(&h264_key_frame(width, height));
    let parameter_sets = avc::get_sps_and_pps(&units).expect("key frame carries SPS and PPS");
    handlers::h264_track(TrackId::new(track_id), timescale, &parameter_sets)
        .expect("synthetic SPS parses")
}

/// AAC LC, 48 kHz stereo, 48 kHz timescale.
pub fn aac_track(track_id: u32) -> Track {
    Track {
        track_id: TrackId::new(track_id),
        kind: TrackKind::Audio(AudioTrackInfo {
            sample_rate: 48000,
            number_of_channels: 2,
        }),
        codec: "mp4a.40.2".to_string(),
        codec_without_config: CodecTag::Aac,
        codec_private: Some(aac::build_audio_specific_config(2, 3, 2)),
        timescale: 48000,
        raw_box: None,
    }
}

/// One AAC LC ADTS frame without CRC, with `payload_len` bytes of payload.
pub fn adts_frame(sample_rate: u32, channels: u8, payload_len: usize) -> Vec<u8> {
    let index = aac::sampling_frequency_index(sample_rate).expect("standard sample rate");
    let frame_length = payload_len + 7;
    let mut frame = vec![
        0xFF,
        0xF1,
        (1 << 6) | (index << 2) | ((channels >> 2) & 0x01),
        ((channels & 0x03) << 6) | ((frame_length >> 11) as u8 & 0x03),
        (frame_length >> 3) as u8,
        ((frame_length as u8 & 0x07) << 5) | 0x1F,
        0xFC,
    ];
    frame.extend((0..payload_len).map(|i| i as u8));
    frame
}

// ---------------------------------------------------------------------------
// EBML / WebM
// ---------------------------------------------------------------------------

/// Element with the given id bytes; sizes below 127 use a 1-byte vint,
/// anything else an 8-byte one.
pub fn ebml_element(id: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = id.to_vec();
    if payload.len() < 127 {
        out.push(0x80 | payload.len() as u8);
    } else {
        out.push(0x01);
        out.extend_from_slice(&(payload.len() as u64).to_be_bytes()[1..]);
    }
    out.extend_from_slice(payload);
    out
}

pub fn ebml_uint(id: &[u8], value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take(7).take_while(|b| **b == 0).count();
    ebml_element(id, &bytes[skip..])
}

/// A TrackEntry to put in [`webm_file`].
#[derive(Debug, Clone)]
pub struct WebmTrackSpec {
    pub number: u64,
    pub track_type: u64,
    pub codec_id: &'static str,
    pub codec_private: Option<Vec<u8>>,
    pub video: Option<(u32, u32)>,
    /// Sampling frequency and channels
    pub audio: Option<(f64, u64)>,
}

impl WebmTrackSpec {
    pub fn vp9(number: u64, width: u32, height: u32) -> Self {
        Self {
            number,
            track_type: 1,
            codec_id: "V_VP9",
            codec_private: None,
            video: Some((width, height)),
            audio: None,
        }
    }

    pub fn opus(number: u64) -> Self {
        let mut head = b"OpusHead".to_vec();
        head.extend_from_slice(&[1, 2, 0x38, 0x01, 0x80, 0xBB, 0x00, 0x00, 0x00, 0x00, 0x00]);
        Self {
            number,
            track_type: 2,
            codec_id: "A_OPUS",
            codec_private: Some(head),
            video: None,
            audio: Some((48000.0, 2)),
        }
    }

    /// The `TrackEntry` element.
    pub fn to_element(&self) -> Vec<u8> {
        let mut entry = ebml_uint(&[0xD7], self.number);
        entry.extend(ebml_uint(&[0x83], self.track_type));
        entry.extend(ebml_element(&[0x86], self.codec_id.as_bytes()));
        if let Some(private) = &self.codec_private {
            entry.extend(ebml_element(&[0x63, 0xA2], private));
        }
        if let Some((width, height)) = self.video {
            let mut video = ebml_uint(&[0xB0], width as u64);
            video.extend(ebml_uint(&[0xBA], height as u64));
            entry.extend(ebml_element(&[0xE0], &video));
        }
        if let Some((rate, channels)) = self.audio {
            let mut audio = ebml_element(&[0xB5], &rate.to_be_bytes());
            audio.extend(ebml_uint(&[0x9F], channels));
            entry.extend(ebml_element(&[0xE1], &audio));
        }
        ebml_element(&[0xAE], &entry)
    }
}

/// A block inside a cluster: track number, timestamp relative to the
/// cluster, key flag, frame data.
pub type WebmBlock = (u64, i16, bool, Vec<u8>);

/// Complete WebM file: EBML header, then a Segment with Info (1 ms ticks),
/// Tracks and one Cluster per `(timestamp, blocks)` entry, all SimpleBlocks.
pub fn webm_file(tracks: &[WebmTrackSpec], clusters: &[(u64, Vec<WebmBlock>)]) -> Vec<u8> {
    let mut header = ebml_uint(&[0x42, 0x86], 1);
    header.extend(ebml_element(&[0x42, 0x82], b"webm"));
    let mut out = ebml_element(&[0x1A, 0x45, 0xDF, 0xA3], &header);

    let mut info = ebml_uint(&[0x2A, 0xD7, 0xB1], 1_000_000);
    info.extend(ebml_element(&[0x4D, 0x80], b"mediaforge-tests"));
    let mut segment = ebml_element(&[0x15, 0x49, 0xA9, 0x66], &info);

    let entries: Vec<u8> = tracks.iter().flat_map(WebmTrackSpec::to_element).collect();
    segment.extend(ebml_element(&[0x16, 0x54, 0xAE, 0x6B], &entries));

    for (timestamp, blocks) in clusters {
        let mut cluster = ebml_uint(&[0xE7], *timestamp);
        for (track, relative, key, data) in blocks {
            let mut block = vec![0x80 | *track as u8];
            block.extend_from_slice(&relative.to_be_bytes());
            block.push(if *key { 0x80 } else { 0x00 });
            block.extend_from_slice(data);
            cluster.extend(ebml_element(&[0xA3], &block));
        }
        segment.extend(ebml_element(&[0x1F, 0x43, 0xB6, 0x75], &cluster));
    }

    out.extend(ebml_element(&[0x18, 0x53, 0x80, 0x67], &segment));
    out
}

// ---------------------------------------------------------------------------
// MPEG-TS
// ---------------------------------------------------------------------------

/// Pointer field, section header and a zero CRC (the demuxer does not check
/// it).
fn psi_payload(table_id: u8, table_id_extension: u16, body: &[u8]) -> Vec<u8> {
    let section_length = 5 + body.len() + 4;
    let mut out = vec![0x00, table_id];
    out.extend_from_slice(&(0xB000 | section_length as u16).to_be_bytes());
    out.extend_from_slice(&table_id_extension.to_be_bytes());
    out.extend_from_slice(&[0xC1, 0x00, 0x00]);
    out.extend_from_slice(body);
    out.extend_from_slice(&[0, 0, 0, 0]);
    out
}

/// PAT payload announcing program 1 at `pmt_pid`.
pub fn pat_section(pmt_pid: u16) -> Vec<u8> {
    let mut body = 1u16.to_be_bytes().to_vec();
    body.extend_from_slice(&(0xE000 | pmt_pid).to_be_bytes());
    psi_payload(0x00, 1, &body)
}

/// PMT payload listing `(stream_type, elementary_pid)` pairs.
pub fn pmt_section(streams: &[(u8, u16)]) -> Vec<u8> {
    let pcr_pid = streams.first().map_or(0x1FFF, |s| s.1);
    let mut body = (0xE000 | pcr_pid).to_be_bytes().to_vec();
    body.extend_from_slice(&0xF000u16.to_be_bytes()); // no program descriptors
    for (stream_type, pid) in streams {
        body.push(*stream_type);
        body.extend_from_slice(&(0xE000 | pid).to_be_bytes());
        body.extend_from_slice(&0xF000u16.to_be_bytes());
    }
    psi_payload(0x02, 1, &body)
}

/// One packet carrying `payload`, stuffed with an adaptation field when the
/// payload is shorter than 184 bytes.
fn ts_packet(pid: u16, payload_unit_start: bool, continuity_counter: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() <= PACKET_SIZE - 4);
    let mut out = vec![
        0x47,
        (if payload_unit_start { 0x40 } else { 0x00 }) | (pid >> 8) as u8 & 0x1F,
        pid as u8,
        0,
    ];
    let stuffing = PACKET_SIZE - 4 - payload.len();
    if stuffing == 0 {
        out[3] = 0x10 | (continuity_counter & 0x0F);
    } else {
        out[3] = 0x30 | (continuity_counter & 0x0F);
        out.push((stuffing - 1) as u8);
        if stuffing > 1 {
            out.push(0x00);
            out.extend(std::iter::repeat(0xFF).take(stuffing - 2));
        }
    }
    out.extend_from_slice(payload);
    out
}

/// PSI sections are padded with 0xFF rather than an adaptation field.
fn psi_packet(pid: u16, section: &[u8]) -> Vec<u8> {
    let mut payload = section.to_vec();
    payload.resize(PACKET_SIZE - 4, 0xFF);
    ts_packet(pid, true, 0, &payload)
}

pub fn pat_packet(pmt_pid: u16) -> Vec<u8> {
    psi_packet(0, &pat_section(pmt_pid))
}

pub fn pmt_packet(pmt_pid: u16, streams: &[(u8, u16)]) -> Vec<u8> {
    psi_packet(pmt_pid, &pmt_section(streams))
}

fn encode_timestamp(prefix: u8, ts: u64) -> [u8; 5] {
    [
        (prefix << 4) | (((ts >> 30) & 0x07) as u8) << 1 | 1,
        (ts >> 22) as u8,
        (((ts >> 15) & 0x7F) as u8) << 1 | 1,
        (ts >> 7) as u8,
        ((ts & 0x7F) as u8) << 1 | 1,
    ]
}

/// PES header with an unbounded packet length.
pub fn pes_header(stream_id: u8, pts: Option<u64>, dts: Option<u64>) -> Vec<u8> {
    let mut out = vec![0, 0, 1, stream_id, 0, 0, 0x80];
    match (pts, dts) {
        (Some(pts), Some(dts)) => {
            out.extend_from_slice(&[0xC0, 10]);
            out.extend_from_slice(&encode_timestamp(0b0011, pts));
            out.extend_from_slice(&encode_timestamp(0b0001, dts));
        }
        (Some(pts), None) => {
            out.extend_from_slice(&[0x80, 5]);
            out.extend_from_slice(&encode_timestamp(0b0010, pts));
        }
        _ => out.extend_from_slice(&[0x00, 0]),
    }
    out
}

/// One PES packet split over as many TS packets as needed, continuity
/// counters starting at `continuity_start`.
pub fn pes_packets(
    pid: u16,
    stream_id: u8,
    pts: u64,
    dts: Option<u64>,
    data: &[u8],
    continuity_start: u8,
) -> Vec<u8> {
    let mut pes = pes_header(stream_id, Some(pts), dts);
    pes.extend_from_slice(data);

    pes.chunks(PACKET_SIZE - 4)
        .enumerate()
        .flat_map(|(i, chunk)| {
            ts_packet(pid, i == 0, continuity_start.wrapping_add(i as u8), chunk)
        })
        .collect()
}

/// Transport stream assembled packet by packet, keeping continuity counters
/// per PID.
#[derive(Debug, Default)]
pub struct TsWriter {
    out: Vec<u8>,
    counters: HashMap<u16, u8>,
}

impl TsWriter {
    pub const PMT_PID: u16 = 0x1000;

    /// Starts with a PAT and a PMT listing `streams`.
    pub fn new(streams: &[(u8, u16)]) -> Self {
        let mut writer = Self::default();
        writer.out.extend(pat_packet(Self::PMT_PID));
        writer.out.extend(pmt_packet(Self::PMT_PID, streams));
        writer
    }

    pub fn pes(&mut self, pid: u16, stream_id: u8, pts: u64, dts: Option<u64>, data: &[u8]) -> &mut Self {
        let counter = self.counters.entry(pid).or_insert(0);
        let packets = pes_packets(pid, stream_id, pts, dts, data, *counter);
        *counter = counter.wrapping_add((packets.len() / PACKET_SIZE) as u8) & 0x0F;
        self.out.extend(packets);
        self
    }

    pub fn finish(&self) -> Bytes {
        Bytes::copy_from_slice(&self.out)
    }
}

/// `fmt ` chunk with a 16-byte `WAVEFORMAT` payload.
pub fn wave_format_chunk(format_tag: u16, channels: u16, sample_rate: u32, bits: u16) -> Vec<u8> {
    let block_align = channels * bits.div_ceil(8);
    let mut chunk = b"fmt ".to_vec();
    chunk.extend(16u32.to_le_bytes());
    chunk.extend(format_tag.to_le_bytes());
    chunk.extend(channels.to_le_bytes());
    chunk.extend(sample_rate.to_le_bytes());
    chunk.extend((sample_rate * block_align as u32).to_le_bytes());
    chunk.extend(block_align.to_le_bytes());
    chunk.extend(bits.to_le_bytes());
    chunk
}

/// Integer PCM WAVE file: `RIFF` header, `fmt ` and a padded `data` chunk.
pub fn wav_file(channels: u16, sample_rate: u32, bits: u16, audio: &[u8]) -> Vec<u8> {
    let mut body = b"WAVE".to_vec();
    body.extend(wave_format_chunk(1, channels, sample_rate, bits));
    body.extend(b"data");
    body.extend((audio.len() as u32).to_le_bytes());
    body.extend_from_slice(audio);
    if audio.len() % 2 == 1 {
        body.push(0);
    }

    let mut file = b"RIFF".to_vec();
    file.extend((body.len() as u32).to_le_bytes());
    file.extend(body);
    file
}

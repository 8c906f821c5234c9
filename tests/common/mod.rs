//! Shared fixtures for integration tests.
//!
//! Inputs are synthesized with the `test-util` builders and, where a test
//! needs a path, written into a temporary directory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use bytes::Bytes;
use mediaforge_media::testing::{adts_frame, wav_file, webm_file, TsWriter, WebmTrackSpec};
use mediaforge_media::{CollectingSink, Mp4Muxer, ParseSession, SampleSink};
use mediaforge_probe::testing::{h264_delta_frame, h264_key_frame};

pub const VIDEO_PID: u16 = 0x100;
pub const AUDIO_PID: u16 = 0x101;

/// One second of 1280x720 H.264 at 30 fps with B-frame style offsets, plus
/// AAC LC stereo at 48 kHz.
pub fn ts_fixture() -> Bytes {
    let mut ts = TsWriter::new(&[(0x1B, VIDEO_PID), (0x0F, AUDIO_PID)]);
    for i in 0..30u64 {
        let frame = if i == 0 {
            h264_key_frame(1280, 720)
        } else {
            h264_delta_frame()
        };
        ts.pes(VIDEO_PID, 0xE0, i * 3000 + 6000, Some(i * 3000 + 3000), &frame);
        if i % 2 == 0 {
            let mut frames = adts_frame(48000, 2, 200);
            frames.extend(adts_frame(48000, 2, 180));
            ts.pes(AUDIO_PID, 0xC0, i / 2 * 3840, None, &frames);
        }
    }
    ts.finish()
}

/// One second of 48 kHz stereo 16-bit PCM.
pub fn wav_fixture() -> Bytes {
    let audio: Vec<u8> = (0..48000 * 4).map(|i| (i % 256) as u8).collect();
    Bytes::from(wav_file(2, 48000, 16, &audio))
}

/// VP9 video and Opus audio over two clusters.
pub fn webm_fixture() -> Bytes {
    Bytes::from(webm_file(
        &[WebmTrackSpec::vp9(1, 640, 360), WebmTrackSpec::opus(2)],
        &[
            (
                0,
                vec![
                    (1, 0, true, vec![0x82, 0x49, 0x83, 0x42, 0x00]),
                    (2, 0, true, vec![0xFC; 40]),
                    (1, 33, false, vec![0x86; 200]),
                    (2, 20, true, vec![0xFC; 40]),
                ],
            ),
            (
                1000,
                vec![(1, 0, false, vec![0x86; 150]), (2, 0, true, vec![0xFC; 40])],
            ),
        ],
    ))
}

/// The transport stream fixture remuxed to MP4.
pub fn mp4_fixture() -> Bytes {
    let source = demux_whole(&ts_fixture());
    let mut muxer = Mp4Muxer::new();
    for track in &source.tracks {
        muxer.on_track(track).unwrap();
    }
    for sample in source.samples {
        muxer.on_sample(sample).unwrap();
    }
    muxer.finish().unwrap()
}

pub fn demux_whole(data: &[u8]) -> CollectingSink {
    demux_chunked(data, data.len().max(1))
}

pub fn demux_chunked(data: &[u8], chunk_size: usize) -> CollectingSink {
    let mut session = ParseSession::new(CollectingSink::new());
    for chunk in data.chunks(chunk_size) {
        session.feed(chunk).unwrap();
    }
    session.finish().unwrap();
    session.into_sink()
}

pub fn write_fixture(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

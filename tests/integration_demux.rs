//! Streaming demux integration tests
//!
//! Feed synthetic MPEG-TS, WebM and MP4 inputs through a parse session and
//! check the tracks and samples that come out, including across a TS to MP4
//! remux.

mod common;

use assert_matches::assert_matches;
use common::{demux_chunked, demux_whole, mp4_fixture, ts_fixture, webm_fixture, AUDIO_PID, VIDEO_PID};
use mediaforge_common::{CodecTag, SampleKind, TrackId};
use mediaforge_media::testing::ebml_element;
use mediaforge_media::{CollectingSink, ContainerFormat, Error, ParseSession, Progress};

// ===== MPEG-TS =====

#[test]
fn test_ts_tracks_and_samples() {
    let sink = demux_whole(&ts_fixture());

    assert_eq!(sink.tracks.len(), 2);
    let video = &sink.tracks[0];
    assert_eq!(video.track_id, TrackId::new(VIDEO_PID as u32));
    assert_eq!(video.codec_without_config, CodecTag::H264);
    assert_eq!(video.timescale, 90000);
    let info = video.video().unwrap();
    assert_eq!((info.width, info.height), (1280, 720));

    let audio = &sink.tracks[1];
    assert_eq!(audio.codec, "mp4a.40.2");
    assert_eq!(audio.audio().unwrap().sample_rate, 48000);

    let video_samples: Vec<_> = sink.samples_for(video.track_id).collect();
    assert_eq!(video_samples.len(), 30);
    assert_eq!(video_samples[0].kind, SampleKind::Key);
    assert!(video_samples[1..].iter().all(|s| s.kind == SampleKind::Delta));
    assert!(video_samples.iter().all(|s| s.cts - s.dts == 3000));

    let audio_dts: Vec<i64> = sink
        .samples_for(TrackId::new(AUDIO_PID as u32))
        .map(|s| s.dts)
        .collect();
    assert_eq!(audio_dts.len(), 30);
    assert!(audio_dts.windows(2).all(|w| w[1] - w[0] == 1920));
}

#[test]
fn test_ts_one_byte_at_a_time() {
    let data = ts_fixture();
    let whole = demux_whole(&data);
    let bytewise = demux_chunked(&data, 1);
    assert_eq!(whole.tracks, bytewise.tracks);
    assert_eq!(whole.samples, bytewise.samples);
}

#[test]
fn test_ts_suspends_until_fed() {
    let data = ts_fixture();
    let mut session = ParseSession::new(CollectingSink::new());

    assert_eq!(session.feed(&data[..100]).unwrap(), Progress::NeedMoreData { needed: 101 });
    assert_eq!(session.format(), None);

    assert!(!session.feed(&data[100..400]).unwrap().is_ready());
    assert_eq!(session.format(), Some(ContainerFormat::TransportStream));
    assert_eq!(session.offset(), 376);

    session.feed(&data[400..]).unwrap();
    session.finish().unwrap();
    assert_eq!(session.sink().samples.len(), 60);
}

// ===== WebM =====

#[test]
fn test_webm_timestamps() {
    let sink = demux_whole(&webm_fixture());

    let codecs: Vec<&str> = sink.tracks.iter().map(|t| t.codec.as_str()).collect();
    assert_eq!(codecs, vec!["vp09.00.10.08", "opus"]);

    let video: Vec<(i64, SampleKind)> = sink
        .samples_for(TrackId::new(1))
        .map(|s| (s.cts, s.kind))
        .collect();
    assert_eq!(
        video,
        vec![(0, SampleKind::Key), (33, SampleKind::Delta), (1000, SampleKind::Delta)]
    );
    assert_eq!(sink.samples_for(TrackId::new(2)).count(), 3);
}

#[test]
fn test_webm_one_byte_at_a_time() {
    let data = webm_fixture();
    let whole = demux_whole(&data);
    let bytewise = demux_chunked(&data, 1);
    assert_eq!(whole.tracks, bytewise.tracks);
    assert_eq!(whole.samples, bytewise.samples);
}

#[test]
fn test_webm_unknown_element_is_fatal() {
    let mut data = ebml_element(&[0x1A, 0x45, 0xDF, 0xA3], &ebml_element(&[0x42, 0x82], b"webm"));
    // a Segment whose only child has an id missing from the element table
    data.extend(ebml_element(&[0x18, 0x53, 0x80, 0x67], &ebml_element(&[0x43, 0x21], &[0])));

    let mut session = ParseSession::new(CollectingSink::new());
    let err = session.feed(&data).unwrap_err();
    assert_matches!(err, Error::UnknownElementId { id: 0x4321, offset: 17 });
}

#[test]
fn test_webm_child_overrunning_parent() {
    // EBML header of 6 bytes whose DocType claims 10
    let mut data = vec![0x1A, 0x45, 0xDF, 0xA3, 0x86, 0x42, 0x82, 0x8A, b'w', b'e', b'b'];
    data.extend_from_slice(&[0; 16]);

    let mut session = ParseSession::new(CollectingSink::new());
    let err = session.feed(&data).unwrap_err();
    assert_matches!(err, Error::ContainerOverrun { ref container, .. } if container == "EBML");
}

// ===== MP4 =====

#[test]
fn test_ts_remuxed_to_mp4_keeps_samples() {
    let ts = demux_whole(&ts_fixture());
    let mp4 = demux_whole(&mp4_fixture());

    assert_eq!(mp4.tracks.len(), 2);
    assert_eq!(mp4.tracks[0].codec, ts.tracks[0].codec);
    assert_eq!(mp4.tracks[1].codec, "mp4a.40.2");
    assert!(mp4.tracks[0].raw_box.is_some());

    let video: Vec<_> = mp4.samples_for(TrackId::new(VIDEO_PID as u32)).collect();
    assert_eq!(video.len(), 30);
    assert_eq!(video[0].kind, SampleKind::Key);
    for (i, sample) in video.iter().enumerate() {
        assert_eq!(sample.dts, i as i64 * 3000);
        assert_eq!(sample.cts, sample.dts + 3000);
        assert_eq!(sample.duration, Some(3000));
    }

    let ts_audio: Vec<_> = ts.samples_for(TrackId::new(AUDIO_PID as u32)).collect();
    let mp4_audio: Vec<_> = mp4.samples_for(TrackId::new(AUDIO_PID as u32)).collect();
    assert_eq!(ts_audio.len(), mp4_audio.len());
    for (a, b) in ts_audio.iter().zip(&mp4_audio) {
        assert_eq!(a.dts, b.dts);
        assert_eq!(a.data, b.data);
    }
}

#[test]
fn test_mp4_one_byte_at_a_time() {
    let data = mp4_fixture();
    let whole = demux_whole(&data);
    let bytewise = demux_chunked(&data, 1);
    assert_eq!(whole.tracks, bytewise.tracks);
    assert_eq!(whole.samples, bytewise.samples);
}

#[test]
fn test_mp4_truncated_in_mdat() {
    let data = mp4_fixture();
    let mut session = ParseSession::new(CollectingSink::new());
    session.feed(&data[..data.len() - 50]).unwrap();
    assert_matches!(session.finish(), Err(Error::UnexpectedEof { .. }));
    assert_eq!(session.tracks().count(), 2);
}

//! Elementary stream handlers: turn a completed PES payload into a track
//! registration and samples.

use bytes::Bytes;
use mediaforge_common::{
    AudioTrackInfo, CodecTag, Sample, SampleKind, Track, TrackId, TrackKind,
};
use mediaforge_probe::codec::aac::{self, AdtsHeader};
use mediaforge_probe::codec::avc::{self, AvcTrackParameters, SpsAndPps};

use super::pes::PesHeader;
use crate::error::{Error, Result};
use crate::registry::ParserState;

/// All transport stream timestamps tick at 90 kHz.
pub const TS_TIMESCALE: u32 = 90000;

/// A PES packet collected for one PID.
#[derive(Debug, Clone)]
pub struct TransportStreamPacketBuffer {
    pub pes_header: PesHeader,
    pub buffer: Bytes,
    /// File offset of the packet that started the PES
    pub offset: u64,
}

impl TransportStreamPacketBuffer {
    fn pts(&self) -> Result<i64> {
        self.pes_header
            .pts
            .map(|pts| pts as i64)
            .ok_or_else(|| {
                Error::invalid_ts(format!("PES packet at offset {} has no PTS", self.offset))
            })
    }
}

/// Video track described by an H.264 SPS/PPS pair.
pub fn h264_track(track_id: TrackId, timescale: u32, parameter_sets: &SpsAndPps) -> Result<Track> {
    let params = AvcTrackParameters::from_parameter_sets(parameter_sets)?;
    Ok(Track {
        track_id,
        kind: TrackKind::Video(params.video),
        codec: params.codec,
        codec_without_config: CodecTag::H264,
        codec_private: Some(params.codec_private),
        timescale,
        raw_box: None,
    })
}

/// Audio track described by an ADTS header.
pub fn adts_track(track_id: TrackId, timescale: u32, header: &AdtsHeader) -> Track {
    Track {
        track_id,
        kind: TrackKind::Audio(AudioTrackInfo {
            sample_rate: header.sample_rate,
            number_of_channels: header.channel_configuration as u16,
        }),
        codec: header.codec_string(),
        codec_without_config: CodecTag::Aac,
        codec_private: Some(header.audio_specific_config()),
        timescale,
        raw_box: None,
    }
}

/// One access unit of H.264 in Annex B form. The track is registered from
/// the first access unit, which must carry SPS and PPS.
pub fn handle_avc_packet(
    pid: u16,
    stream: TransportStreamPacketBuffer,
    state: &mut ParserState<'_>,
) -> Result<()> {
    let track_id = TrackId::new(pid as u32);
    let units = avc::extract_annex_b(&stream.buffer);

    if !state.is_registered(track_id) {
        let parameter_sets = avc::get_sps_and_pps(&units)?;
        state.register_track(h264_track(track_id, TS_TIMESCALE, &parameter_sets)?)?;
    }

    let pts = stream.pts()?;
    let dts = stream.pes_header.dts.map_or(pts, |dts| dts as i64);
    let kind = avc::get_key_frame_or_delta(&units);
    state.emit_sample(Sample::new(track_id, dts, pts, stream.buffer, kind))
}

/// A run of ADTS frames; each frame becomes one sample, spaced by the frame
/// duration from the PES timestamp.
pub fn handle_aac_packet(
    pid: u16,
    stream: TransportStreamPacketBuffer,
    state: &mut ParserState<'_>,
) -> Result<()> {
    let track_id = TrackId::new(pid as u32);
    let frames = aac::split_adts_frames(&stream.buffer)?;
    let Some(first) = frames.first() else {
        return Ok(());
    };

    if !state.is_registered(track_id) {
        state.register_track(adts_track(track_id, TS_TIMESCALE, &first.header))?;
    }

    let pts = stream.pts()?;
    let frame_duration = aac::SAMPLES_PER_FRAME as u64 * TS_TIMESCALE as u64
        / first.header.sample_rate as u64;

    for (i, frame) in frames.into_iter().enumerate() {
        let timestamp = pts + (i as u64 * frame_duration) as i64;
        let mut sample = Sample::new(track_id, timestamp, timestamp, frame.payload, SampleKind::Key);
        sample.duration = Some(frame_duration as u32);
        state.emit_sample(sample)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CollectingSink, TrackRegistry};
    use crate::testing::adts_frame;
    use mediaforge_probe::testing::{h264_delta_frame, h264_key_frame};

    fn buffer(data: Bytes, pts: u64, dts: Option<u64>) -> TransportStreamPacketBuffer {
        TransportStreamPacketBuffer {
            pes_header: PesHeader {
                stream_id: 0xE0,
                pts: Some(pts),
                dts,
            },
            buffer: data,
            offset: 0,
        }
    }

    #[test]
    fn test_avc_registers_once_and_keeps_timestamps() {
        let mut registry = TrackRegistry::new();
        let mut sink = CollectingSink::new();
        let mut state = ParserState::new(&mut registry, &mut sink);

        handle_avc_packet(0x100, buffer(h264_key_frame(1280, 720), 6006, Some(3003)), &mut state)
            .unwrap();
        handle_avc_packet(0x100, buffer(h264_delta_frame(), 9009, None), &mut state).unwrap();
        drop(state);

        assert_eq!(sink.tracks.len(), 1);
        let track = &sink.tracks[0];
        assert_eq!(track.track_id, TrackId::new(0x100));
        assert_eq!(track.timescale, 90000);
        assert_eq!(track.video().unwrap().width, 1280);

        assert_eq!(sink.samples[0].cts, 6006);
        assert_eq!(sink.samples[0].dts, 3003);
        assert_eq!(sink.samples[0].kind, SampleKind::Key);
        assert_eq!(sink.samples[1].dts, 9009);
        assert_eq!(sink.samples[1].kind, SampleKind::Delta);
    }

    #[test]
    fn test_avc_first_unit_without_sps_fails() {
        let mut registry = TrackRegistry::new();
        let mut sink = CollectingSink::new();
        let mut state = ParserState::new(&mut registry, &mut sink);
        let err = handle_avc_packet(0x100, buffer(h264_delta_frame(), 0, None), &mut state)
            .unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn test_aac_frames_are_spread_by_frame_duration() {
        let mut registry = TrackRegistry::new();
        let mut sink = CollectingSink::new();
        let mut state = ParserState::new(&mut registry, &mut sink);

        let mut data = adts_frame(48000, 2, 10);
        data.extend(adts_frame(48000, 2, 12));
        handle_aac_packet(0x101, buffer(Bytes::from(data), 1000, None), &mut state).unwrap();
        drop(state);

        let track = &sink.tracks[0];
        assert_eq!(track.codec, "mp4a.40.2");
        assert_eq!(track.audio().unwrap().sample_rate, 48000);
        assert_eq!(track.audio().unwrap().number_of_channels, 2);

        assert_eq!(sink.samples.len(), 2);
        assert_eq!(sink.samples[0].dts, 1000);
        assert_eq!(sink.samples[1].dts, 1000 + 1920);
        assert_eq!(sink.samples[1].data.len(), 12);
        assert_eq!(sink.samples[1].duration, Some(1920));
    }
}

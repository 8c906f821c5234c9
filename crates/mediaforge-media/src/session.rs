//! Format detection and the push-style parse session.

use std::fmt;
use std::io::{self, Read};

use tracing::{debug, trace};

use crate::cursor::ByteCursor;
use crate::ebml::WebmDemuxer;
use crate::error::{Error, Result};
use crate::isobmff::{BoxType, IsoDemuxer};
use crate::registry::{ParserState, SampleSink, TrackRegistry};
use crate::riff::WavDemuxer;
use crate::ts::{TsDemuxer, PACKET_SIZE, SYNC_BYTE};
use crate::{Demuxer, Progress};
use mediaforge_common::Track;

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];
const RIFF_MAGIC: &[u8; 4] = b"RIFF";
const BOX_HEADER_SIZE: usize = 8;

/// Container formats the session can demux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerFormat {
    IsoBmff,
    Webm,
    TransportStream,
    Wave,
}

impl ContainerFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::IsoBmff => "mp4",
            Self::Webm => "webm",
            Self::TransportStream => "mpegts",
            Self::Wave => "wav",
        }
    }

    fn demuxer(self) -> Box<dyn Demuxer> {
        match self {
            Self::IsoBmff => Box::new(IsoDemuxer::new()),
            Self::Webm => Box::new(WebmDemuxer::new()),
            Self::TransportStream => Box::new(TsDemuxer::new()),
            Self::Wave => Box::new(WavDemuxer::new()),
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identify the container from the first bytes of the input.
///
/// Returns `Ok(None)` while more bytes are needed to decide. `finished`
/// says no more input will arrive, in which case a short prefix is decided
/// on what is there.
pub fn detect_format(data: &[u8], finished: bool) -> Result<Option<ContainerFormat>> {
    for (magic, format) in [
        (&EBML_MAGIC, ContainerFormat::Webm),
        (RIFF_MAGIC, ContainerFormat::Wave),
    ] {
        let prefix = data.len().min(magic.len());
        if prefix > 0 && data[..prefix] == magic[..prefix] {
            if prefix == magic.len() {
                return Ok(Some(format));
            }
            if !finished {
                return Ok(None);
            }
        }
    }

    if data.first() == Some(&SYNC_BYTE) {
        match data.get(PACKET_SIZE) {
            Some(&SYNC_BYTE) => return Ok(Some(ContainerFormat::TransportStream)),
            Some(_) => {}
            None if !finished => return Ok(None),
            None if data.len() == PACKET_SIZE => {
                return Ok(Some(ContainerFormat::TransportStream))
            }
            None => {}
        }
    }

    if data.len() < BOX_HEADER_SIZE {
        if !finished {
            return Ok(None);
        }
        return Err(Error::UnexpectedEof {
            offset: data.len() as u64,
            needed: BOX_HEADER_SIZE - data.len(),
        });
    }

    let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if (size == 0 || size == 1 || size as usize >= BOX_HEADER_SIZE) && BoxType::is_plausible(&data[4..8]) {
        return Ok(Some(ContainerFormat::IsoBmff));
    }

    Err(Error::unsupported("unrecognized container format"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Detecting,
    Parsing,
    /// The container has been fully parsed; further input is discarded.
    Complete,
}

/// One parse of one input: buffers pushed bytes, detects the format and
/// drives the matching demuxer.
///
/// Every call to [`feed`](Self::feed) parses as far as the buffered input
/// allows. Tracks and samples reach the sink during that call.
pub struct ParseSession<S> {
    cursor: ByteCursor,
    registry: TrackRegistry,
    sink: S,
    format: Option<ContainerFormat>,
    demuxer: Option<Box<dyn Demuxer>>,
    phase: Phase,
}

impl<S: SampleSink> ParseSession<S> {
    pub fn new(sink: S) -> Self {
        Self {
            cursor: ByteCursor::new(),
            registry: TrackRegistry::new(),
            sink,
            format: None,
            demuxer: None,
            phase: Phase::Detecting,
        }
    }

    /// Skip detection and parse the input as `format`.
    pub fn with_format(sink: S, format: ContainerFormat) -> Self {
        let mut session = Self::new(sink);
        session.start(format);
        session
    }

    fn start(&mut self, format: ContainerFormat) {
        debug!(%format, "Container format");
        self.format = Some(format);
        self.demuxer = Some(format.demuxer());
        self.phase = Phase::Parsing;
    }

    /// Push the next chunk of input.
    pub fn feed(&mut self, data: &[u8]) -> Result<Progress<()>> {
        trace!(len = data.len(), offset = self.cursor.offset(), "Feed");
        self.cursor.feed(data);
        self.poll()
    }

    /// Signal end of input and parse whatever is still buffered.
    ///
    /// Fails with [`Error::UnexpectedEof`] if the input stopped in the
    /// middle of a structure.
    pub fn finish(&mut self) -> Result<()> {
        self.cursor.finish();
        match self.poll()? {
            Progress::Ready(()) => Ok(()),
            Progress::NeedMoreData { needed } => Err(Error::UnexpectedEof {
                offset: self.cursor.offset(),
                needed,
            }),
        }
    }

    fn poll(&mut self) -> Result<Progress<()>> {
        if self.phase == Phase::Detecting {
            match detect_format(self.cursor.available(), self.cursor.is_finished())? {
                Some(format) => self.start(format),
                None => {
                    return Ok(Progress::NeedMoreData {
                        needed: self.cursor.bytes_remaining() + 1,
                    })
                }
            }
        }

        if self.phase == Phase::Complete {
            let skipped = self.cursor.discard_available(u64::MAX);
            if skipped > 0 {
                trace!(skipped, "Discarding input after end of container");
            }
            return Ok(Progress::Ready(()));
        }

        let Some(demuxer) = self.demuxer.as_mut() else {
            return Err(Error::unsupported("parse session has no demuxer"));
        };
        let mut state = ParserState::new(&mut self.registry, &mut self.sink);
        match demuxer.advance(&mut self.cursor, &mut state) {
            Ok(()) => {
                debug!(
                    offset = self.cursor.offset(),
                    tracks = self.registry.len(),
                    "Container complete"
                );
                self.phase = Phase::Complete;
                self.cursor.discard_available(u64::MAX);
                Ok(Progress::Ready(()))
            }
            Err(Error::InsufficientData { needed, .. }) => Ok(Progress::NeedMoreData { needed }),
            Err(e) => Err(e),
        }
    }

    /// Detected (or forced) container format.
    pub fn format(&self) -> Option<ContainerFormat> {
        self.format
    }

    /// Whether the container has been parsed to its end.
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Tracks registered so far, in registration order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.registry.iter()
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.cursor.offset()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S> fmt::Debug for ParseSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseSession")
            .field("format", &self.format)
            .field("phase", &self.phase)
            .field("offset", &self.cursor.offset())
            .field("tracks", &self.registry.len())
            .finish()
    }
}

/// Parse everything `reader` yields, `chunk_size` bytes at a time.
pub fn parse_reader<R: Read, S: SampleSink>(
    mut reader: R,
    chunk_size: usize,
    sink: S,
) -> Result<ParseSession<S>> {
    let mut session = ParseSession::new(sink);
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        session.feed(&buf[..n])?;
    }
    session.finish()?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CollectingSink;
    use crate::testing::{adts_frame, wav_file, webm_file, TsWriter, WebmTrackSpec};
    use crate::Mp4Muxer;
    use bytes::Bytes;
    use mediaforge_common::{Sample, SampleKind, TrackId};
    use mediaforge_probe::testing::{h264_delta_frame, h264_key_frame};

    fn ts_fixture() -> Bytes {
        let mut ts = TsWriter::new(&[(0x1B, 0x100), (0x0F, 0x101)]);
        ts.pes(0x100, 0xE0, 3003, Some(0), &h264_key_frame(640, 360))
            .pes(0x101, 0xC0, 0, None, &adts_frame(48000, 2, 200))
            .pes(0x100, 0xE0, 6006, Some(3003), &h264_delta_frame())
            .pes(0x101, 0xC0, 1920, None, &adts_frame(48000, 2, 300));
        ts.finish()
    }

    fn parse_in_chunks(data: &[u8], chunk: usize) -> ParseSession<CollectingSink> {
        let mut session = ParseSession::new(CollectingSink::new());
        for piece in data.chunks(chunk) {
            session.feed(piece).unwrap();
        }
        session.finish().unwrap();
        session
    }

    #[test]
    fn test_detect_format() {
        let ts = ts_fixture();
        assert_eq!(detect_format(&ts, false).unwrap(), Some(ContainerFormat::TransportStream));
        assert_eq!(detect_format(&ts[..100], false).unwrap(), None);

        let webm = webm_file(&[WebmTrackSpec::vp9(1, 320, 240)], &[]);
        assert_eq!(detect_format(&webm, false).unwrap(), Some(ContainerFormat::Webm));
        assert_eq!(detect_format(&webm[..2], false).unwrap(), None);

        let mp4 = b"\x00\x00\x00\x20ftypisom";
        assert_eq!(detect_format(mp4, true).unwrap(), Some(ContainerFormat::IsoBmff));
        assert_eq!(detect_format(&mp4[..5], false).unwrap(), None);

        let wav = wav_file(1, 8000, 16, &[0; 8]);
        assert_eq!(detect_format(&wav, false).unwrap(), Some(ContainerFormat::Wave));
        assert_eq!(detect_format(b"RI", false).unwrap(), None);

        assert!(matches!(
            detect_format(&[0x00, 0x00, 0x00, 0x04, 0, 1, 2, 3], true),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(detect_format(&[], true), Err(Error::UnexpectedEof { .. })));
    }

    #[test]
    fn test_ts_session() {
        let session = parse_in_chunks(&ts_fixture(), 4096);
        assert_eq!(session.format(), Some(ContainerFormat::TransportStream));
        assert!(session.is_complete());

        let codecs: Vec<&str> = session.tracks().map(|t| t.codec.as_str()).collect();
        assert_eq!(codecs, vec!["avc1.640028", "mp4a.40.2"]);

        let sink = session.sink();
        let video: Vec<&Sample> = sink.samples_for(TrackId::new(0x100)).collect();
        assert_eq!(video.len(), 2);
        assert_eq!((video[0].dts, video[0].cts, video[0].kind), (0, 3003, SampleKind::Key));
        assert_eq!((video[1].dts, video[1].cts, video[1].kind), (3003, 6006, SampleKind::Delta));
        assert_eq!(sink.samples_for(TrackId::new(0x101)).count(), 2);
    }

    #[test]
    fn test_wave_session() {
        let audio: Vec<u8> = (0..4 * 2000).map(|i| (i % 251) as u8).collect();
        let data = wav_file(2, 48000, 16, &audio);
        let whole = parse_in_chunks(&data, data.len());
        assert_eq!(whole.format(), Some(ContainerFormat::Wave));
        assert!(whole.is_complete());

        let track = whole.tracks().next().unwrap();
        assert_eq!(track.codec, "pcm-s16");
        assert_eq!(track.audio().unwrap().sample_rate, 48000);

        let chunked = parse_in_chunks(&data, 333).into_sink();
        assert_eq!(chunked.samples, whole.into_sink().samples);
        assert_eq!(chunked.samples.len(), 2);
    }

    #[test]
    fn test_byte_at_a_time_matches_whole_input() {
        let data = ts_fixture();
        let whole = parse_in_chunks(&data, data.len()).into_sink();
        let bytewise = parse_in_chunks(&data, 1).into_sink();

        assert_eq!(whole.tracks, bytewise.tracks);
        assert_eq!(whole.samples, bytewise.samples);
    }

    fn remuxed_mp4() -> Bytes {
        let source = parse_in_chunks(&ts_fixture(), 1000).into_sink();
        let mut muxer = Mp4Muxer::new();
        for track in &source.tracks {
            muxer.on_track(track).unwrap();
        }
        for sample in source.samples {
            muxer.on_sample(sample).unwrap();
        }
        muxer.finish().unwrap()
    }

    #[test]
    fn test_remuxed_ts_parses_as_mp4() {
        let session = parse_in_chunks(&remuxed_mp4(), 777);
        assert_eq!(session.format(), Some(ContainerFormat::IsoBmff));
        assert_eq!(session.tracks().count(), 2);
        assert_eq!(session.sink().samples.len(), 4);
    }

    #[test]
    fn test_trailing_bytes_after_webm_are_discarded() {
        let mut data = webm_file(
            &[WebmTrackSpec::vp9(1, 320, 240)],
            &[(0, vec![(1, 0, true, vec![1, 2, 3])])],
        );
        data.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let mut session = ParseSession::new(CollectingSink::new());
        assert!(session.feed(&data).unwrap().is_ready());
        assert!(session.feed(&[0x00; 16]).unwrap().is_ready());
        session.finish().unwrap();
        assert_eq!(session.sink().samples.len(), 1);
    }

    #[test]
    fn test_truncated_input() {
        let data = ts_fixture();
        let mut session = ParseSession::new(CollectingSink::new());
        let progress = session.feed(&data[..data.len() - 10]).unwrap();
        assert_eq!(progress, Progress::NeedMoreData { needed: PACKET_SIZE });
        assert!(matches!(session.finish(), Err(Error::UnexpectedEof { .. })));
    }

    #[test]
    fn test_with_format_skips_detection() {
        let mut session = ParseSession::with_format(CollectingSink::new(), ContainerFormat::IsoBmff);
        session.feed(&remuxed_mp4()).unwrap();
        session.finish().unwrap();
        assert_eq!(session.format(), Some(ContainerFormat::IsoBmff));
        assert_eq!(session.tracks().count(), 2);
    }

    #[test]
    fn test_parse_reader() {
        let data = ts_fixture();
        let session = parse_reader(io::Cursor::new(data.to_vec()), 100, CollectingSink::new()).unwrap();
        assert_eq!(session.sink().samples.len(), 4);
        assert_eq!(session.offset(), data.len() as u64);
    }
}

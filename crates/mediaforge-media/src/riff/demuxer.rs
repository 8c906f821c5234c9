//! Streaming WAVE demuxer.

use mediaforge_common::{AudioTrackInfo, CodecTag, Sample, SampleKind, Track, TrackId, TrackKind};
use tracing::{debug, trace, warn};

use super::chunk::{
    read_chunk_header, read_riff_header, read_wave_format, WaveFormat, CHUNK_HEADER_SIZE,
};
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::registry::ParserState;
use crate::Demuxer;

/// Frames of audio per emitted sample.
pub const FRAMES_PER_SAMPLE: u64 = 1024;

/// `data` size written by encoders that never patch the header.
const UNKNOWN_DATA_SIZE: u32 = u32::MAX;

const WAVE_TRACK_ID: TrackId = TrackId::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Chunks,
    /// Inside `data`; `end` is `None` when it runs to the end of input
    Data { end: Option<u64>, padded_end: Option<u64> },
    Skip { end: u64 },
}

/// Demuxes the single PCM track of a RIFF/WAVE file.
///
/// The `fmt ` chunk must precede `data`. Samples hold [`FRAMES_PER_SAMPLE`]
/// frames (fewer at the end of `data`); timestamps count frames, so the track
/// timescale is the sample rate.
#[derive(Debug)]
pub struct WavDemuxer {
    state: State,
    format: Option<WaveFormat>,
    frames: u64,
}

impl Default for WavDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl WavDemuxer {
    pub fn new() -> Self {
        Self {
            state: State::Header,
            format: None,
            frames: 0,
        }
    }

    fn handle_chunk(&mut self, cursor: &mut ByteCursor, state: &mut ParserState<'_>) -> Result<()> {
        let chunk = cursor.peek(read_chunk_header)?;
        match &chunk.id {
            b"fmt " => {
                let format = cursor.attempt(|c| {
                    c.discard(CHUNK_HEADER_SIZE)?;
                    let format = read_wave_format(c, chunk.size)?;
                    c.discard(chunk.padded_size() - chunk.size as u64)?;
                    Ok(format)
                })?;
                if self.format.is_some() {
                    warn!(offset = chunk.offset, "Ignoring repeated fmt chunk");
                    return Ok(());
                }
                let codec = format.codec()?;
                debug!(
                    codec,
                    channels = format.number_of_channels,
                    sample_rate = format.sample_rate,
                    "WAVE format"
                );
                state.register_track(Track {
                    track_id: WAVE_TRACK_ID,
                    kind: TrackKind::Audio(AudioTrackInfo {
                        sample_rate: format.sample_rate,
                        number_of_channels: format.number_of_channels,
                    }),
                    codec: codec.to_string(),
                    codec_without_config: CodecTag::Pcm,
                    codec_private: None,
                    timescale: format.sample_rate,
                    raw_box: None,
                })?;
                self.format = Some(format);
            }
            b"data" => {
                if self.format.is_none() {
                    return Err(Error::invalid_riff(format!(
                        "data chunk at offset {} before fmt",
                        chunk.offset
                    )));
                }
                cursor.discard(CHUNK_HEADER_SIZE)?;
                let (end, padded_end) = if chunk.size == UNKNOWN_DATA_SIZE {
                    (None, None)
                } else {
                    let start = cursor.offset();
                    (Some(start + chunk.size as u64), Some(chunk.end()))
                };
                trace!(offset = chunk.offset, size = chunk.size, "data chunk");
                self.state = State::Data { end, padded_end };
            }
            _ => {
                trace!(id = %chunk.id_str(), offset = chunk.offset, size = chunk.size, "Skipping chunk");
                cursor.discard(CHUNK_HEADER_SIZE)?;
                self.state = State::Skip { end: chunk.end() };
            }
        }
        Ok(())
    }

    fn read_data(
        &mut self,
        end: Option<u64>,
        padded_end: Option<u64>,
        cursor: &mut ByteCursor,
        state: &mut ParserState<'_>,
    ) -> Result<()> {
        let Some(format) = self.format else {
            return Err(Error::invalid_riff("data without fmt"));
        };
        let block_align = format.block_align as u64;
        let max_bytes = block_align * FRAMES_PER_SAMPLE;

        let remaining = match end {
            Some(end) => end.saturating_sub(cursor.offset()),
            None if cursor.is_finished() => cursor.bytes_remaining() as u64,
            None => u64::MAX,
        };
        let whole_frames = remaining.min(max_bytes) / block_align * block_align;

        if whole_frames == 0 {
            if remaining > 0 {
                warn!(bytes = remaining, offset = cursor.offset(), "Dropping partial trailing frame");
                cursor.discard(remaining)?;
            }
            self.state = match padded_end {
                Some(padded_end) => State::Skip { end: padded_end },
                None => State::Chunks,
            };
            return Ok(());
        }

        let data = cursor.get_slice(whole_frames as usize)?;
        let frames = whole_frames / block_align;
        let mut sample = Sample::new(
            WAVE_TRACK_ID,
            self.frames as i64,
            self.frames as i64,
            data,
            SampleKind::Key,
        );
        sample.duration = Some(frames as u32);
        self.frames += frames;
        state.emit_sample(sample)
    }
}

impl Demuxer for WavDemuxer {
    fn advance(&mut self, cursor: &mut ByteCursor, state: &mut ParserState<'_>) -> Result<()> {
        loop {
            match self.state {
                State::Header => {
                    let header = read_riff_header(cursor)?;
                    debug!(file_size = header.file_size, "RIFF header");
                    self.state = State::Chunks;
                }
                State::Chunks => {
                    if cursor.is_exhausted() {
                        if self.format.is_none() {
                            return Err(Error::MissingElement("fmt"));
                        }
                        return Ok(());
                    }
                    self.handle_chunk(cursor, state)?;
                }
                State::Skip { end } => {
                    let remaining = end.saturating_sub(cursor.offset());
                    if cursor.discard_available(remaining) < remaining {
                        if cursor.is_exhausted() {
                            // a missing pad byte at the very end is common
                            debug!(offset = cursor.offset(), "Input ends inside chunk");
                            self.state = State::Chunks;
                            continue;
                        }
                        cursor.ensure(1)?;
                    }
                    self.state = State::Chunks;
                }
                State::Data { end, padded_end } => {
                    if end.is_none() && cursor.is_exhausted() {
                        self.state = State::Chunks;
                        continue;
                    }
                    self.read_data(end, padded_end, cursor, state)?;
                }
            }
        }
    }
}

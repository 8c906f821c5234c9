//! Progressive MP4 demuxer.
//!
//! The movie box must precede the media data: once `moov` is parsed every
//! sample's file offset is known, and `mdat` is streamed in offset order
//! without buffering more than one sample at a time.

use std::collections::VecDeque;

use bytes::Bytes;
use mediaforge_common::{Sample, SampleKind, TrackId};
use tracing::{debug, trace, warn};

use super::atoms::BoxType;
use super::moov::read_moov;
use super::reader::{parse_box, read_box_header, BoxHeader, BoxNode};
use super::sample_table::SampleEntry;
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::registry::ParserState;
use crate::Demuxer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    TopLevel,
    /// Discard bytes up to `end`, or to end of input when `None`
    Skip { end: Option<u64> },
    Mdat { end: Option<u64> },
}

#[derive(Debug, Clone, Copy)]
struct PendingSample {
    track_id: TrackId,
    entry: SampleEntry,
}

#[derive(Debug)]
pub struct IsoDemuxer {
    state: State,
    seen_moov: bool,
    /// Samples not yet read, by ascending file offset
    pending: VecDeque<PendingSample>,
}

impl Default for IsoDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl IsoDemuxer {
    pub fn new() -> Self {
        Self {
            state: State::TopLevel,
            seen_moov: false,
            pending: VecDeque::new(),
        }
    }

    fn handle_top_level(
        &mut self,
        header: BoxHeader,
        cursor: &mut ByteCursor,
        state: &mut ParserState<'_>,
    ) -> Result<()> {
        let end = header.size.map(|size| header.offset + size);

        match header.box_type {
            BoxType::MOOV => {
                let size = header
                    .size
                    .ok_or_else(|| Error::unsupported("moov box without a size"))?;
                let len = usize::try_from(size)
                    .map_err(|_| Error::invalid_mp4("moov box too large"))?;
                let raw = Bytes::copy_from_slice(cursor.peek_slice(len)?);
                let node = parse_box(&mut ByteCursor::from_bytes_at(&raw, header.offset))?;
                cursor.discard(size)?;

                if self.seen_moov {
                    warn!(offset = header.offset, "Ignoring second moov box");
                    return Ok(());
                }
                self.seen_moov = true;
                self.load_movie(&node, &raw, state)?;
            }
            BoxType::MDAT => {
                if !self.seen_moov {
                    return Err(Error::unsupported(
                        "mdat before moov; the file is not progressive",
                    ));
                }
                cursor.discard(header.header_size as u64)?;
                debug!(offset = header.offset, size = ?header.size, "Streaming mdat");
                self.state = State::Mdat { end };
            }
            BoxType::MOOF => return Err(Error::unsupported("fragmented MP4 (moof)")),
            BoxType::FTYP => {
                let node = parse_box(cursor)?;
                let brand = node.data().get(..4).map(|b| String::from_utf8_lossy(b).into_owned());
                debug!(major_brand = ?brand, "ftyp");
            }
            other => {
                trace!(box_type = %other, offset = header.offset, "Skipping top-level box");
                cursor.discard(header.header_size as u64)?;
                self.state = State::Skip { end };
            }
        }
        Ok(())
    }

    fn load_movie(
        &mut self,
        moov: &BoxNode,
        raw: &Bytes,
        state: &mut ParserState<'_>,
    ) -> Result<()> {
        let movie = read_moov(moov, raw)?;
        debug!(
            timescale = movie.header.timescale,
            duration = movie.header.duration,
            tracks = movie.tracks.len(),
            "moov"
        );

        let mut pending = Vec::new();
        for movie_track in movie.tracks {
            let track_id = movie_track.track.track_id;
            if !state.register_track(movie_track.track)? {
                warn!(%track_id, "Duplicate track id in moov; samples of the copy are dropped");
                continue;
            }
            pending.extend(
                movie_track
                    .samples
                    .iter()
                    .map(|entry| PendingSample {
                        track_id,
                        entry: *entry,
                    }),
            );
        }
        pending.sort_by_key(|p| p.entry.offset);
        self.pending = pending.into();
        Ok(())
    }

    /// Read samples that lie inside the current mdat. Returns once the mdat
    /// has been consumed; suspends when the next sample is not buffered.
    fn read_mdat(
        &mut self,
        end: Option<u64>,
        cursor: &mut ByteCursor,
        state: &mut ParserState<'_>,
    ) -> Result<()> {
        while let Some(next) = self.pending.front().copied() {
            let offset = next.entry.offset;
            let sample_end = offset + next.entry.size as u64;

            if end.is_some_and(|end| offset >= end) {
                break;
            }
            if end.is_some_and(|end| sample_end > end) {
                return Err(Error::invalid_mp4(format!(
                    "sample at offset {} runs past the end of mdat",
                    offset
                )));
            }
            if offset < cursor.offset() {
                return Err(Error::invalid_mp4(format!(
                    "sample at offset {} overlaps data already read",
                    offset
                )));
            }

            let gap = offset - cursor.offset();
            if cursor.discard_available(gap) < gap {
                // Nothing buffered left; wait for the rest of the gap
                cursor.ensure(1)?;
            }

            let data = cursor.get_slice(next.entry.size as usize)?;
            self.pending.pop_front();

            let mut sample = Sample::new(
                next.track_id,
                next.entry.dts,
                next.entry.cts(),
                data,
                if next.entry.is_sync {
                    SampleKind::Key
                } else {
                    SampleKind::Delta
                },
            );
            sample.duration = Some(next.entry.duration);
            state.emit_sample(sample)?;
        }

        self.state = State::Skip { end };
        Ok(())
    }
}

impl Demuxer for IsoDemuxer {
    fn advance(&mut self, cursor: &mut ByteCursor, state: &mut ParserState<'_>) -> Result<()> {
        loop {
            match self.state {
                State::TopLevel => {
                    if cursor.is_exhausted() {
                        if !self.seen_moov {
                            return Err(Error::MissingAtom("moov"));
                        }
                        if !self.pending.is_empty() {
                            return Err(Error::invalid_mp4(format!(
                                "input ended with {} samples unread",
                                self.pending.len()
                            )));
                        }
                        return Ok(());
                    }
                    let header = cursor.peek(read_box_header)?;
                    self.handle_top_level(header, cursor, state)?;
                }
                State::Skip { end } => {
                    match end {
                        Some(end) => {
                            let remaining = end.saturating_sub(cursor.offset());
                            if cursor.discard_available(remaining) < remaining {
                                cursor.ensure(1)?;
                            }
                        }
                        None => {
                            cursor.discard_available(u64::MAX);
                            if !cursor.is_exhausted() {
                                cursor.ensure(1)?;
                            }
                        }
                    }
                    self.state = State::TopLevel;
                }
                State::Mdat { end } => self.read_mdat(end, cursor, state)?,
            }
        }
    }
}

//! Mediaforge-Media: streaming container demuxing and ISO-BMFF muxing
//!
//! Input is pushed in arbitrary chunks; tracks and samples are pushed out to a
//! [`SampleSink`] as soon as the bytes that describe them have arrived.
//!
//! # Modules
//!
//! - `cursor` - offset-tracked byte window with atomic, suspendable reads
//! - `ebml` - EBML element tree and the WebM/Matroska demuxer
//! - `isobmff` - box reader, progressive MP4 demuxer, moov/mdat writer
//! - `ts` - MPEG-2 transport stream demuxer (H.264 and ADTS AAC)
//! - `riff` - RIFF/WAVE demuxer for integer PCM
//! - `registry` - per-session track registry and sample routing
//! - `session` - format detection and the push-style [`ParseSession`]
//!
//! # Example
//!
//! ```no_run
//! use mediaforge_media::{CollectingSink, ParseSession, Progress};
//!
//! let data = std::fs::read("input.ts")?;
//! let mut session = ParseSession::new(CollectingSink::new());
//! for chunk in data.chunks(4096) {
//!     if let Progress::NeedMoreData { .. } = session.feed(chunk)? {
//!         continue;
//!     }
//! }
//! session.finish()?;
//! for track in session.tracks() {
//!     println!("{} {}", track.track_id, track.codec);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cursor;
pub mod ebml;
pub mod error;
pub mod isobmff;
pub mod registry;
pub mod riff;
pub mod session;
pub mod ts;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cursor::{ByteCursor, Vint};
pub use error::{Error, Result};
pub use isobmff::{create_padded_moov_atom, Mp4Muxer, MuxOptions};
pub use registry::{CollectingSink, ParserState, SampleSink, TrackRegistry};
pub use session::{detect_format, parse_reader, ContainerFormat, ParseSession};

/// Outcome of pushing input into a parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress<T> {
    Ready(T),
    /// Parsing stopped at an element that is not fully buffered yet.
    NeedMoreData {
        /// Bytes the pending read asked for
        needed: usize,
    },
}

impl<T> Progress<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// A container format parser driven by a [`ByteCursor`].
///
/// `advance` consumes as much of the buffered input as it can, dispatching
/// tracks and samples through `state`. When the next structure is not fully
/// buffered it returns [`Error::InsufficientData`] with the cursor positioned
/// at the start of that structure; the caller feeds more bytes and calls
/// `advance` again. `Ok(())` means the container has been fully parsed.
///
/// Once the cursor is finished, an implementation must flush anything it is
/// still holding when it reaches [`ByteCursor::is_exhausted`].
pub trait Demuxer: Send {
    fn advance(&mut self, cursor: &mut ByteCursor, state: &mut ParserState<'_>) -> Result<()>;
}

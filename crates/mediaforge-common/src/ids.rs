//! Typed track identifier.
//!
//! Track ids come from different places depending on the container: the
//! `tkhd` track id in ISO-BMFF, `TrackNumber` in Matroska, the elementary PID
//! in MPEG-TS. Wrapping them keeps them from being mixed up with sizes,
//! offsets and timestamps, which are also plain integers.

use serde::{Deserialize, Serialize};

/// Identifier of a track, unique within one parse session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(u32);

impl TrackId {
    /// Wrap a raw track number.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw track number.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for TrackId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<TrackId> for u32 {
    fn from(id: TrackId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

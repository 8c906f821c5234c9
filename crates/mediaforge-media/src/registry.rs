//! Track registry and sample routing.
//!
//! Each parse session owns one [`TrackRegistry`]. A demuxer registers a track
//! the first time it sees packets for it and routes every sample through
//! [`ParserState`], which hands it to the consumer's [`SampleSink`] before the
//! demuxer moves on.

use std::collections::HashMap;

use mediaforge_common::{Sample, Track, TrackId};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Consumer of parse results.
///
/// Both callbacks run synchronously on the parsing thread; the parser does
/// not read further until they return. Returning an error aborts the session.
pub trait SampleSink {
    /// Called once per track, before any of its samples.
    fn on_track(&mut self, track: &Track) -> Result<()>;

    /// Called for every sample, in arrival order per track.
    fn on_sample(&mut self, sample: Sample) -> Result<()>;
}

impl<S: SampleSink + ?Sized> SampleSink for &mut S {
    fn on_track(&mut self, track: &Track) -> Result<()> {
        (**self).on_track(track)
    }

    fn on_sample(&mut self, sample: Sample) -> Result<()> {
        (**self).on_sample(sample)
    }
}

/// Sink that keeps everything it receives.
#[derive(Debug, Default, Clone)]
pub struct CollectingSink {
    pub tracks: Vec<Track>,
    pub samples: Vec<Sample>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples of one track, in dispatch order.
    pub fn samples_for(&self, track_id: TrackId) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(move |s| s.track_id == track_id)
    }
}

impl SampleSink for CollectingSink {
    fn on_track(&mut self, track: &Track) -> Result<()> {
        self.tracks.push(track.clone());
        Ok(())
    }

    fn on_sample(&mut self, sample: Sample) -> Result<()> {
        self.samples.push(sample);
        Ok(())
    }
}

/// Tracks discovered so far in one parse session.
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: HashMap<TrackId, Track>,
    /// Registration order, for stable iteration
    order: Vec<TrackId>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `track` unless its id is already known.
    ///
    /// Returns `true` if the track was new, in which case the sink has been
    /// told about it. A duplicate is a no-op: the first registration wins and
    /// the sink is not called again.
    pub fn register(&mut self, track: Track, sink: &mut dyn SampleSink) -> Result<bool> {
        if self.tracks.contains_key(&track.track_id) {
            trace!(track_id = %track.track_id, "Track already registered");
            return Ok(false);
        }

        debug!(
            track_id = %track.track_id,
            codec = %track.codec,
            timescale = track.timescale,
            "Registered track"
        );

        sink.on_track(&track)?;
        self.order.push(track.track_id);
        self.tracks.insert(track.track_id, track);
        Ok(true)
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.tracks.contains_key(&track_id)
    }

    pub fn get(&self, track_id: TrackId) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    /// Tracks in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.order.iter().filter_map(|id| self.tracks.get(id))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Session state a demuxer works against: the registry plus the consumer.
pub struct ParserState<'a> {
    registry: &'a mut TrackRegistry,
    sink: &'a mut dyn SampleSink,
}

impl<'a> ParserState<'a> {
    pub fn new(registry: &'a mut TrackRegistry, sink: &'a mut dyn SampleSink) -> Self {
        Self { registry, sink }
    }

    /// See [`TrackRegistry::register`].
    pub fn register_track(&mut self, track: Track) -> Result<bool> {
        self.registry.register(track, self.sink)
    }

    pub fn is_registered(&self, track_id: TrackId) -> bool {
        self.registry.contains(track_id)
    }

    pub fn track(&self, track_id: TrackId) -> Option<&Track> {
        self.registry.get(track_id)
    }

    /// Hand a sample to the consumer. Timestamps are forwarded unchanged.
    pub fn emit_sample(&mut self, sample: Sample) -> Result<()> {
        if !self.registry.contains(sample.track_id) {
            return Err(Error::Sink(format!(
                "sample for unregistered track {}",
                sample.track_id
            )));
        }
        self.sink.on_sample(sample)
    }
}

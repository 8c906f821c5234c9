//! Probe a media file by streaming it through a parse session.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mediaforge_common::{Sample, SampleKind, Track, TrackId};
use mediaforge_media::{parse_reader, SampleSink};
use serde::Serialize;

/// Sample statistics of one track.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackStats {
    pub samples: u64,
    pub key_frames: u64,
    pub bytes: u64,
    pub first_dts: Option<i64>,
    pub last_dts: Option<i64>,
    /// Span from the first decode time to the end of the last sample, in
    /// track ticks
    pub duration: u64,
}

impl TrackStats {
    fn record(&mut self, sample: &Sample) {
        self.samples += 1;
        if sample.kind == SampleKind::Key {
            self.key_frames += 1;
        }
        self.bytes += sample.size() as u64;
        let first = *self.first_dts.get_or_insert(sample.dts);
        self.last_dts = Some(sample.dts);
        let end = sample.dts + sample.duration.unwrap_or(0) as i64;
        self.duration = self.duration.max((end - first).max(0) as u64);
    }

    /// Duration in seconds for a track ticking at `timescale`.
    pub fn seconds(&self, timescale: u32) -> f64 {
        if timescale == 0 {
            return 0.0;
        }
        self.duration as f64 / timescale as f64
    }
}

/// Sink that keeps track descriptions and per-track statistics but drops
/// sample data.
#[derive(Debug, Default)]
pub struct StatsSink {
    pub tracks: Vec<Track>,
    pub stats: BTreeMap<TrackId, TrackStats>,
}

impl SampleSink for StatsSink {
    fn on_track(&mut self, track: &Track) -> mediaforge_media::Result<()> {
        self.tracks.push(track.clone());
        self.stats.insert(track.track_id, TrackStats::default());
        Ok(())
    }

    fn on_sample(&mut self, sample: Sample) -> mediaforge_media::Result<()> {
        self.stats.entry(sample.track_id).or_default().record(&sample);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackReport {
    #[serde(flatten)]
    pub track: Track,
    pub stats: TrackStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub file: PathBuf,
    pub format: String,
    pub size: u64,
    pub tracks: Vec<TrackReport>,
}

/// Stream `path` through a parse session, `chunk_size` bytes at a time.
pub fn probe_file(path: &Path, chunk_size: usize) -> Result<ProbeReport> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let size = file.metadata()?.len();

    let session = parse_reader(file, chunk_size, StatsSink::default())
        .with_context(|| format!("Failed to parse {:?}", path))?;
    let format = session
        .format()
        .map(|f| f.name().to_string())
        .unwrap_or_default();
    let mut sink = session.into_sink();

    let tracks = std::mem::take(&mut sink.tracks)
        .into_iter()
        .map(|track| TrackReport {
            stats: sink.stats.remove(&track.track_id).unwrap_or_default(),
            track,
        })
        .collect();

    Ok(ProbeReport {
        file: path.to_path_buf(),
        format,
        size,
        tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_stats_span_includes_last_duration() {
        let id = TrackId::new(1);
        let mut stats = TrackStats::default();
        let mut last = Sample::new(id, 2048, 2048, Bytes::from_static(&[0; 4]), SampleKind::Key);
        last.duration = Some(1024);

        stats.record(&Sample::new(id, 1024, 1024, Bytes::from_static(&[0; 6]), SampleKind::Key));
        stats.record(&last);

        assert_eq!(stats.samples, 2);
        assert_eq!(stats.key_frames, 2);
        assert_eq!(stats.bytes, 10);
        assert_eq!(stats.first_dts, Some(1024));
        assert_eq!(stats.duration, 2048);
        assert_eq!(stats.seconds(1024), 2.0);
    }
}

//! Benchmarks for streaming demux and MP4 muxing
//!
//! Measures how chunk size affects parse throughput on synthetic inputs.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mediaforge_common::{Sample, SampleKind, TrackId};
use mediaforge_media::testing::{adts_frame, webm_file, TsWriter, WebmTrackSpec};
use mediaforge_media::{CollectingSink, Mp4Muxer, ParseSession, SampleSink};
use mediaforge_probe::testing::{h264_delta_frame, h264_key_frame};

const FRAMES: u64 = 120;

/// Four seconds of 30 fps H.264 plus AAC in a transport stream.
fn ts_input() -> Bytes {
    let mut ts = TsWriter::new(&[(0x1B, 0x100), (0x0F, 0x101)]);
    for i in 0..FRAMES {
        let frame = if i % 30 == 0 {
            h264_key_frame(1280, 720)
        } else {
            h264_delta_frame()
        };
        ts.pes(0x100, 0xE0, i * 3000 + 3000, Some(i * 3000), &frame);
        ts.pes(0x101, 0xC0, i * 3000, None, &adts_frame(48000, 2, 384));
    }
    ts.finish()
}

fn webm_input() -> Bytes {
    let clusters: Vec<_> = (0..FRAMES / 30)
        .map(|c| {
            let blocks = (0..30)
                .map(|i| (1, (i * 33) as i16, i == 0, vec![0u8; 2048]))
                .collect();
            (c * 1000, blocks)
        })
        .collect();
    Bytes::from(webm_file(&[WebmTrackSpec::vp9(1, 1280, 720)], &clusters))
}

fn demux(data: &[u8], chunk_size: usize) -> usize {
    let mut session = ParseSession::new(CollectingSink::new());
    for chunk in data.chunks(chunk_size) {
        session.feed(chunk).unwrap();
    }
    session.finish().unwrap();
    session.sink().samples.len()
}

fn bench_demux(c: &mut Criterion) {
    let inputs = [("mpegts", ts_input()), ("webm", webm_input())];

    for (name, data) in &inputs {
        let mut group = c.benchmark_group(format!("demux_{}", name));
        group.throughput(Throughput::Bytes(data.len() as u64));
        for chunk_size in [188, 4096, 65536] {
            group.bench_with_input(BenchmarkId::from_parameter(chunk_size), data, |b, data| {
                b.iter(|| demux(black_box(data), chunk_size))
            });
        }
        group.finish();
    }
}

fn bench_mux(c: &mut Criterion) {
    let source = {
        let mut session = ParseSession::new(CollectingSink::new());
        session.feed(&ts_input()).unwrap();
        session.finish().unwrap();
        session.into_sink()
    };

    let mut group = c.benchmark_group("mux");
    group.throughput(Throughput::Elements(source.samples.len() as u64));
    group.bench_function("progressive_mp4", |b| {
        b.iter(|| {
            let mut muxer = Mp4Muxer::new();
            for track in &source.tracks {
                muxer.on_track(track).unwrap();
            }
            for sample in &source.samples {
                muxer.on_sample(sample.clone()).unwrap();
            }
            black_box(muxer.finish().unwrap())
        })
    });
    group.bench_function("moov_only", |b| {
        let mut muxer = Mp4Muxer::new();
        for track in &source.tracks {
            muxer.on_track(track).unwrap();
        }
        for i in 0..FRAMES as i64 {
            let sample = Sample::new(TrackId::new(0x101), i * 1920, i * 1920, Bytes::new(), SampleKind::Key);
            muxer.on_sample(sample).unwrap();
        }
        b.iter(|| black_box(muxer.moov().unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_demux, bench_mux);
criterion_main!(benches);

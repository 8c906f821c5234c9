//! Sample table resolution.
//!
//! The `stbl` children describe samples column by column:
//! - stts: decode durations (run-length)
//! - ctts: composition offsets (run-length)
//! - stss: sync samples, 1-based; absent means every sample is sync
//! - stsc: sample-to-chunk runs
//! - stsz / stz2: sample sizes
//! - stco / co64: chunk offsets
//!
//! [`SampleTableBuilder`] collects the columns and resolves them into one row
//! per sample.

use std::collections::HashSet;

use super::atoms::BoxType;
use super::reader::BoxNode;
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};

/// One resolved sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleEntry {
    /// 0-based
    pub index: u32,
    /// Absolute file offset of the sample data
    pub offset: u64,
    pub size: u32,
    pub dts: i64,
    pub duration: u32,
    pub cts_offset: i32,
    pub is_sync: bool,
}

impl SampleEntry {
    pub fn cts(&self) -> i64 {
        self.dts + self.cts_offset as i64
    }
}

#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    pub samples: Vec<SampleEntry>,
}

impl SampleTable {
    pub fn builder() -> SampleTableBuilder {
        SampleTableBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleEntry> {
        self.samples.iter()
    }

    /// Sum of all sample durations.
    pub fn duration(&self) -> u64 {
        self.samples.iter().map(|s| s.duration as u64).sum()
    }
}

#[derive(Debug, Default)]
pub struct SampleTableBuilder {
    stts_entries: Vec<(u32, u32)>, // (count, delta)
    sync_samples: Option<Vec<u32>>,
    stsc_entries: Vec<(u32, u32, u32)>, // (first_chunk, samples_per_chunk, description_index)
    uniform_size: u32,
    sample_count: u32,
    sample_sizes: Vec<u32>,
    chunk_offsets: Vec<u64>,
    ctts_entries: Vec<(u32, i32)>, // (count, offset)
}

impl SampleTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stts(&mut self, entries: Vec<(u32, u32)>) {
        self.stts_entries = entries;
    }

    pub fn set_sync_samples(&mut self, samples: Vec<u32>) {
        self.sync_samples = Some(samples);
    }

    pub fn set_stsc(&mut self, entries: Vec<(u32, u32, u32)>) {
        self.stsc_entries = entries;
    }

    /// With a non-zero `uniform_size`, `sizes` is ignored.
    pub fn set_stsz(&mut self, uniform_size: u32, sample_count: u32, sizes: Vec<u32>) {
        self.uniform_size = uniform_size;
        self.sample_count = sample_count;
        self.sample_sizes = sizes;
    }

    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) {
        self.chunk_offsets = offsets;
    }

    pub fn set_ctts(&mut self, entries: Vec<(u32, i32)>) {
        self.ctts_entries = entries;
    }

    /// Fill the builder from an `stbl` box.
    pub fn from_stbl(stbl: &BoxNode) -> Result<Self> {
        let mut builder = Self::new();
        for child in stbl.children() {
            let mut c = payload_cursor(child);
            match child.box_type {
                BoxType::STTS => builder.set_stts(read_pairs(&mut c, |c| Ok((c.get_u32()?, c.get_u32()?)))?),
                BoxType::CTTS => {
                    // Version 0 offsets are unsigned on paper; read both as signed.
                    builder.set_ctts(read_pairs(&mut c, |c| Ok((c.get_u32()?, c.get_i32()?)))?)
                }
                BoxType::STSS => builder.set_sync_samples(read_pairs(&mut c, |c| c.get_u32())?),
                BoxType::STSC => builder.set_stsc(read_pairs(&mut c, |c| {
                    Ok((c.get_u32()?, c.get_u32()?, c.get_u32()?))
                })?),
                BoxType::STSZ => {
                    c.discard(4)?;
                    let uniform = c.get_u32()?;
                    let count = c.get_u32()?;
                    let sizes = if uniform == 0 {
                        (0..count).map(|_| c.get_u32()).collect::<Result<_>>()?
                    } else {
                        Vec::new()
                    };
                    builder.set_stsz(uniform, count, sizes);
                }
                BoxType::STZ2 => {
                    c.discard(7)?; // version/flags + reserved
                    let field_size = c.get_u8()?;
                    let count = c.get_u32()?;
                    let sizes = read_compact_sizes(&mut c, field_size, count)?;
                    builder.set_stsz(0, count, sizes);
                }
                BoxType::STCO => builder.set_chunk_offsets(read_pairs(&mut c, |c| Ok(c.get_u32()? as u64))?),
                BoxType::CO64 => builder.set_chunk_offsets(read_pairs(&mut c, |c| c.get_u64())?),
                _ => {}
            }
        }
        Ok(builder)
    }

    /// Resolve every sample's offset, size and timing.
    pub fn build(self) -> Result<SampleTable> {
        let sample_count = if self.uniform_size > 0 {
            self.sample_count
        } else {
            self.sample_sizes.len() as u32
        };
        if sample_count == 0 {
            return Ok(SampleTable::default());
        }
        if self.chunk_offsets.is_empty() {
            return Err(Error::MissingAtom("stco"));
        }

        let chunks = self.resolve_sample_chunks(sample_count)?;
        let timing = self.resolve_timestamps(sample_count);
        let cts_offsets = self.resolve_cts_offsets(sample_count);
        let sync: Option<HashSet<u32>> = self
            .sync_samples
            .as_ref()
            .map(|s| s.iter().copied().collect());

        let mut samples = Vec::with_capacity(sample_count as usize);
        let mut chunk_position = vec![0u64; self.chunk_offsets.len()];

        for i in 0..sample_count {
            let size = self.size_of(i);
            let chunk = chunks[i as usize] as usize;
            let offset = self.chunk_offsets[chunk] + chunk_position[chunk];
            chunk_position[chunk] += size as u64;

            let (dts, duration) = timing[i as usize];
            samples.push(SampleEntry {
                index: i,
                offset,
                size,
                dts,
                duration,
                cts_offset: cts_offsets[i as usize],
                is_sync: sync.as_ref().map_or(true, |s| s.contains(&(i + 1))),
            });
        }

        Ok(SampleTable { samples })
    }

    fn size_of(&self, index: u32) -> u32 {
        if self.uniform_size > 0 {
            self.uniform_size
        } else {
            self.sample_sizes.get(index as usize).copied().unwrap_or(0)
        }
    }

    /// 0-based chunk index of every sample.
    fn resolve_sample_chunks(&self, sample_count: u32) -> Result<Vec<u32>> {
        let num_chunks = self.chunk_offsets.len() as u32;
        let mut result = Vec::with_capacity(sample_count as usize);

        for (i, &(first_chunk, samples_per_chunk, _)) in self.stsc_entries.iter().enumerate() {
            if first_chunk == 0 {
                return Err(Error::invalid_mp4("stsc first_chunk of 0"));
            }
            let next_first = self
                .stsc_entries
                .get(i + 1)
                .map_or(num_chunks + 1, |e| e.0);

            for chunk in first_chunk..next_first.min(num_chunks + 1) {
                for _ in 0..samples_per_chunk {
                    if result.len() as u32 >= sample_count {
                        return Ok(result);
                    }
                    result.push(chunk - 1);
                }
            }
        }

        if (result.len() as u32) < sample_count {
            return Err(Error::invalid_mp4(format!(
                "stsc maps {} of {} samples to chunks",
                result.len(),
                sample_count
            )));
        }
        Ok(result)
    }

    /// (dts, duration) per sample. Samples past the end of stts repeat the
    /// last delta.
    fn resolve_timestamps(&self, sample_count: u32) -> Vec<(i64, u32)> {
        let mut out = Vec::with_capacity(sample_count as usize);
        let mut dts = 0i64;

        'runs: for &(count, delta) in &self.stts_entries {
            for _ in 0..count {
                if out.len() as u32 >= sample_count {
                    break 'runs;
                }
                out.push((dts, delta));
                dts += delta as i64;
            }
        }

        let last_delta = out.last().map_or(0, |&(_, d)| d);
        while (out.len() as u32) < sample_count {
            out.push((dts, last_delta));
            dts += last_delta as i64;
        }
        out
    }

    fn resolve_cts_offsets(&self, sample_count: u32) -> Vec<i32> {
        let mut offsets: Vec<i32> = self
            .ctts_entries
            .iter()
            .flat_map(|&(count, offset)| std::iter::repeat(offset).take(count as usize))
            .take(sample_count as usize)
            .collect();
        offsets.resize(sample_count as usize, 0);
        offsets
    }
}

/// Cursor over a leaf box payload, with absolute offsets.
fn payload_cursor(node: &BoxNode) -> ByteCursor {
    ByteCursor::from_bytes_at(node.data(), node.offset + node.header_size as u64)
}

/// Skip version/flags, read an entry count and that many entries.
fn read_pairs<T>(
    c: &mut ByteCursor,
    mut read: impl FnMut(&mut ByteCursor) -> Result<T>,
) -> Result<Vec<T>> {
    c.discard(4)?;
    let count = c.get_u32()?;
    // Each entry is at least 4 bytes; cap the allocation by what is present.
    let mut entries = Vec::with_capacity((count as usize).min(c.bytes_remaining() / 4));
    for _ in 0..count {
        entries.push(read(c)?);
    }
    Ok(entries)
}

fn read_compact_sizes(c: &mut ByteCursor, field_size: u8, count: u32) -> Result<Vec<u32>> {
    match field_size {
        4 => {
            let mut sizes = Vec::with_capacity(count as usize);
            while (sizes.len() as u32) < count {
                let byte = c.get_u8()?;
                sizes.push((byte >> 4) as u32);
                if (sizes.len() as u32) < count {
                    sizes.push((byte & 0x0F) as u32);
                }
            }
            Ok(sizes)
        }
        8 => (0..count).map(|_| c.get_u8().map(u32::from)).collect(),
        16 => (0..count).map(|_| c.get_u16().map(u32::from)).collect(),
        other => Err(Error::invalid_mp4(format!("stz2 field size {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_table_builder() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(3, 1000)]);
        builder.set_sync_samples(vec![1]);
        builder.set_stsc(vec![(1, 3, 1)]);
        builder.set_stsz(0, 3, vec![100, 200, 150]);
        builder.set_chunk_offsets(vec![1000]);

        let table = builder.build().unwrap();
        assert_eq!(table.len(), 3);

        assert_eq!(table.samples[0].offset, 1000);
        assert_eq!(table.samples[0].dts, 0);
        assert!(table.samples[0].is_sync);

        assert_eq!(table.samples[1].offset, 1100);
        assert_eq!(table.samples[1].dts, 1000);
        assert!(!table.samples[1].is_sync);

        assert_eq!(table.samples[2].offset, 1300);
        assert_eq!(table.duration(), 3000);
    }

    #[test]
    fn test_multiple_chunks_and_stsc_runs() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(5, 10)]);
        // Chunks 1-2 hold two samples each, chunk 3 holds one
        builder.set_stsc(vec![(1, 2, 1), (3, 1, 1)]);
        builder.set_stsz(10, 5, vec![]);
        builder.set_chunk_offsets(vec![100, 500, 900]);

        let table = builder.build().unwrap();
        let offsets: Vec<u64> = table.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![100, 110, 500, 510, 900]);
        assert!(table.iter().all(|s| s.is_sync));
    }

    #[test]
    fn test_composition_offsets() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stts(vec![(3, 512)]);
        builder.set_ctts(vec![(1, 1024), (2, -512)]);
        builder.set_stsc(vec![(1, 3, 1)]);
        builder.set_stsz(0, 3, vec![1, 1, 1]);
        builder.set_chunk_offsets(vec![0]);

        let table = builder.build().unwrap();
        let cts: Vec<i64> = table.iter().map(|s| s.cts()).collect();
        assert_eq!(cts, vec![1024, 0, 512]);
    }

    #[test]
    fn test_short_stsc_is_invalid() {
        let mut builder = SampleTableBuilder::new();
        builder.set_stsc(vec![(1, 1, 1)]);
        builder.set_stsz(0, 3, vec![1, 1, 1]);
        builder.set_chunk_offsets(vec![0]);
        assert!(matches!(builder.build(), Err(Error::InvalidMp4(_))));
    }

    #[test]
    fn test_compact_sizes() {
        let mut c = ByteCursor::from_bytes(&[0x12, 0x30]);
        assert_eq!(read_compact_sizes(&mut c, 4, 3).unwrap(), vec![1, 2, 3]);
    }
}

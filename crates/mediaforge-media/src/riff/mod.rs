//! RIFF/WAVE support
//!
//! A `RIFF` header with form type `WAVE`, then little-endian sized chunks:
//! `fmt ` describes the PCM layout and `data` carries the interleaved frames.
//! Everything else is skipped.

mod chunk;
mod demuxer;

pub use chunk::{
    read_chunk_header, read_riff_header, read_wave_format, ChunkHeader, RiffHeader, WaveFormat,
    CHUNK_HEADER_SIZE, FORMAT_EXTENSIBLE, FORMAT_PCM,
};
pub use demuxer::{WavDemuxer, FRAMES_PER_SAMPLE};

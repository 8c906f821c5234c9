//! ISO base media file format (MP4, MOV) support
//!
//! - `reader` / `writer` - box tree parsing and serialization
//! - `moov` / `sample_table` - track and sample description
//! - `demuxer` - progressive MP4 demuxer
//! - `mux` - padded movie box and progressive MP4 muxer

mod atoms;
mod demuxer;
pub mod moov;
mod mux;
mod reader;
pub mod sample_table;
mod writer;

pub use atoms::{BoxType, HandlerType};
pub use demuxer::IsoDemuxer;
pub use moov::{read_moov, Movie, MovieTrack};
pub use mux::{
    create_padded_moov_atom, Mp4Muxer, MuxOptions, MuxSample, HEADER_LENGTH, ISO_BASE_TIMESCALE,
};
pub use reader::{parse_box, parse_boxes, read_box_header, BoxHeader, BoxNode, BoxPayload};
pub use sample_table::{SampleEntry, SampleTable, SampleTableBuilder};
pub use writer::{BoxWriter, IDENTITY_MATRIX};

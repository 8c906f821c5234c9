//! EBML (Matroska / WebM) parsing.
//!
//! - [`parse_ebml`]: decode one element and its subtree from a cursor
//! - [`WebmDemuxer`]: turn a Matroska Segment into tracks and samples

mod ids;
mod parser;
mod webm;

pub use ids::{EbmlId, ElementInfo, ElementType, ELEMENTS};
pub use parser::{parse_ebml, read_element_header, ElementHeader, ElementNode, ElementValue};
pub use webm::WebmDemuxer;

//! MPEG-2 transport stream support
//!
//! 188-byte packets are read one at a time; PAT and PMT map elementary PIDs to
//! stream types, and PES payloads are collected per PID until the next
//! payload unit start.

mod demuxer;
pub mod handlers;
mod packet;
mod pes;
mod psi;

pub use demuxer::TsDemuxer;
pub use handlers::{TransportStreamPacketBuffer, TS_TIMESCALE};
pub use packet::{parse_packet, TsPacket, PACKET_SIZE, SYNC_BYTE};
pub use pes::{parse_pes_header, PesHeader};
pub use psi::{parse_pat, parse_pmt, PatEntry, PmtStream, StreamType};

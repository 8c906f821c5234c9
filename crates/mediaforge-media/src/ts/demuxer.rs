//! MPEG-2 transport stream demuxer.

use std::collections::{BTreeMap, HashMap};

use bytes::BytesMut;
use tracing::{debug, trace, warn};

use super::handlers::{handle_aac_packet, handle_avc_packet, TransportStreamPacketBuffer};
use super::packet::{parse_packet, TsPacket, NULL_PID, PACKET_SIZE, PAT_PID};
use super::pes::{parse_pes_header, PesHeader};
use super::psi::{parse_pat, parse_pmt, StreamType};
use crate::cursor::ByteCursor;
use crate::error::Result;
use crate::registry::ParserState;
use crate::Demuxer;

/// PES payload collected so far for one PID.
#[derive(Debug)]
struct PendingPes {
    pes_header: PesHeader,
    buffer: BytesMut,
    offset: u64,
}

impl PendingPes {
    fn into_buffer(self) -> TransportStreamPacketBuffer {
        TransportStreamPacketBuffer {
            pes_header: self.pes_header,
            buffer: self.buffer.freeze(),
            offset: self.offset,
        }
    }
}

/// Streaming transport stream demuxer for H.264 and ADTS AAC.
///
/// A PES packet is complete once the next packet with
/// `payload_unit_start_indicator` arrives on the same PID, or when input
/// ends. Track ids are the elementary PIDs.
#[derive(Debug, Default)]
pub struct TsDemuxer {
    /// PMT PID -> program number
    pmt_pids: HashMap<u16, u16>,
    /// Elementary PID -> stream type
    streams: HashMap<u16, StreamType>,
    /// Pending PES per PID, flushed in PID order at end of input
    pending: BTreeMap<u16, PendingPes>,
    continuity: HashMap<u16, u8>,
}

impl TsDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_continuity(&mut self, packet: &TsPacket) {
        // Only packets with a payload advance the counter
        if packet.payload.is_none() || packet.pid == NULL_PID {
            return;
        }
        let previous = self.continuity.insert(packet.pid, packet.continuity_counter);
        if let Some(previous) = previous {
            let expected = (previous + 1) & 0x0F;
            if packet.continuity_counter != expected
                && packet.continuity_counter != previous
                && !packet.discontinuity
            {
                warn!(
                    pid = packet.pid,
                    expected,
                    found = packet.continuity_counter,
                    "Continuity counter gap"
                );
            }
        }
    }

    fn handle_packet(
        &mut self,
        packet: TsPacket,
        offset: u64,
        state: &mut ParserState<'_>,
    ) -> Result<()> {
        if packet.transport_error {
            warn!(pid = packet.pid, offset, "Dropping packet with transport error");
            return Ok(());
        }
        self.check_continuity(&packet);
        let Some(payload) = packet.payload else {
            return Ok(());
        };

        if packet.pid == PAT_PID {
            if packet.payload_unit_start {
                for entry in parse_pat(&payload)? {
                    if self.pmt_pids.insert(entry.pmt_pid, entry.program_number).is_none() {
                        debug!(program = entry.program_number, pmt_pid = entry.pmt_pid, "PAT");
                    }
                }
            }
            return Ok(());
        }

        if self.pmt_pids.contains_key(&packet.pid) {
            if packet.payload_unit_start {
                for stream in parse_pmt(&payload)? {
                    if self
                        .streams
                        .insert(stream.elementary_pid, stream.stream_type)
                        .is_none()
                    {
                        debug!(
                            pid = stream.elementary_pid,
                            stream_type = ?stream.stream_type,
                            "PMT stream"
                        );
                    }
                }
            }
            return Ok(());
        }

        match self.streams.get(&packet.pid) {
            Some(StreamType::H264 | StreamType::AdtsAac) => {}
            _ => {
                trace!(pid = packet.pid, "Ignoring packet");
                return Ok(());
            }
        }

        if packet.payload_unit_start {
            if let Some(done) = self.pending.remove(&packet.pid) {
                self.flush(packet.pid, done, state)?;
            }
            let (pes_header, header_len) = parse_pes_header(&payload)?;
            let mut buffer = BytesMut::with_capacity(PACKET_SIZE * 8);
            buffer.extend_from_slice(&payload[header_len..]);
            self.pending.insert(
                packet.pid,
                PendingPes {
                    pes_header,
                    buffer,
                    offset,
                },
            );
        } else if let Some(pending) = self.pending.get_mut(&packet.pid) {
            pending.buffer.extend_from_slice(&payload);
        } else {
            trace!(pid = packet.pid, offset, "Continuation before first PES start");
        }
        Ok(())
    }

    fn flush(&mut self, pid: u16, pes: PendingPes, state: &mut ParserState<'_>) -> Result<()> {
        let buffer = pes.into_buffer();
        trace!(pid, offset = buffer.offset, size = buffer.buffer.len(), "PES complete");
        match self.streams.get(&pid) {
            Some(StreamType::H264) => handle_avc_packet(pid, buffer, state),
            Some(StreamType::AdtsAac) => handle_aac_packet(pid, buffer, state),
            _ => Ok(()),
        }
    }

    fn flush_all(&mut self, state: &mut ParserState<'_>) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for (pid, pes) in pending {
            self.flush(pid, pes, state)?;
        }
        Ok(())
    }
}

impl Demuxer for TsDemuxer {
    fn advance(&mut self, cursor: &mut ByteCursor, state: &mut ParserState<'_>) -> Result<()> {
        loop {
            if cursor.is_exhausted() {
                return self.flush_all(state);
            }
            let offset = cursor.offset();
            let data = cursor.get_slice(PACKET_SIZE)?;
            let packet = parse_packet(data, offset)?;
            self.handle_packet(packet, offset, state)?;
        }
    }
}

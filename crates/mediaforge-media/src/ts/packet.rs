//! Transport stream packet header and adaptation field.

use bytes::Bytes;

use crate::error::{Error, Result};

pub const PACKET_SIZE: usize = 188;
pub const SYNC_BYTE: u8 = 0x47;
pub const PAT_PID: u16 = 0x0000;
pub const NULL_PID: u16 = 0x1FFF;

/// One parsed 188-byte packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsPacket {
    pub pid: u16,
    pub payload_unit_start: bool,
    pub transport_error: bool,
    pub continuity_counter: u8,
    /// Discontinuity indicator from the adaptation field
    pub discontinuity: bool,
    /// Bytes after the header and adaptation field; `None` if the packet
    /// carries no payload.
    pub payload: Option<Bytes>,
}

/// Parse one packet. `packet` must be exactly [`PACKET_SIZE`] bytes.
pub fn parse_packet(packet: Bytes, offset: u64) -> Result<TsPacket> {
    if packet.len() != PACKET_SIZE {
        return Err(Error::invalid_ts(format!(
            "packet of {} bytes at offset {}",
            packet.len(),
            offset
        )));
    }
    if packet[0] != SYNC_BYTE {
        return Err(Error::invalid_ts(format!(
            "lost sync at offset {}: found {:#04x}",
            offset, packet[0]
        )));
    }

    let transport_error = packet[1] & 0x80 != 0;
    let payload_unit_start = packet[1] & 0x40 != 0;
    let pid = u16::from_be_bytes([packet[1] & 0x1F, packet[2]]);
    let adaptation_field_control = (packet[3] >> 4) & 0x03;
    let continuity_counter = packet[3] & 0x0F;

    let mut pos = 4;
    let mut discontinuity = false;
    if adaptation_field_control & 0x02 != 0 {
        let length = packet[4] as usize;
        if 5 + length > PACKET_SIZE {
            return Err(Error::invalid_ts(format!(
                "adaptation field of {} bytes at offset {}",
                length, offset
            )));
        }
        if length > 0 {
            discontinuity = packet[5] & 0x80 != 0;
        }
        pos = 5 + length;
    }

    let payload = (adaptation_field_control & 0x01 != 0 && pos < PACKET_SIZE)
        .then(|| packet.slice(pos..));

    Ok(TsPacket {
        pid,
        payload_unit_start,
        transport_error,
        continuity_counter,
        discontinuity,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(header: [u8; 4], rest: &[u8]) -> Bytes {
        let mut data = header.to_vec();
        data.extend_from_slice(rest);
        data.resize(PACKET_SIZE, 0xFF);
        Bytes::from(data)
    }

    #[test]
    fn test_payload_only_packet() {
        let p = parse_packet(packet([0x47, 0x41, 0x00, 0x17], &[0xAA]), 0).unwrap();
        assert_eq!(p.pid, 0x100);
        assert!(p.payload_unit_start);
        assert_eq!(p.continuity_counter, 7);
        let payload = p.payload.unwrap();
        assert_eq!(payload.len(), 184);
        assert_eq!(payload[0], 0xAA);
    }

    #[test]
    fn test_adaptation_field_is_skipped() {
        // adaptation field of 2 bytes with the discontinuity flag, then payload
        let p = parse_packet(packet([0x47, 0x01, 0x00, 0x30], &[2, 0x80, 0x00, 0xBB]), 0).unwrap();
        assert!(p.discontinuity);
        assert_eq!(p.payload.unwrap()[0], 0xBB);
    }

    #[test]
    fn test_adaptation_only_packet_has_no_payload() {
        let p = parse_packet(packet([0x47, 0x01, 0x00, 0x20], &[183]), 0).unwrap();
        assert!(p.payload.is_none());
    }

    #[test]
    fn test_sync_loss() {
        let err = parse_packet(packet([0x48, 0, 0, 0x10], &[]), 376).unwrap_err();
        assert!(matches!(err, Error::InvalidTs(msg) if msg.contains("376")));
    }
}

//! Program specific information: PAT and PMT sections.
//!
//! Sections are expected to fit in the packet that starts them, which holds
//! for every single-program stream seen in practice.

use crate::error::{Error, Result};

const TABLE_ID_PAT: u8 = 0x00;
const TABLE_ID_PMT: u8 = 0x02;
const CRC_SIZE: usize = 4;

/// Elementary stream types we can demux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// ISO/IEC 14496-10 (H.264)
    H264,
    /// ISO/IEC 13818-7 ADTS AAC
    AdtsAac,
    Other(u8),
}

impl From<u8> for StreamType {
    fn from(value: u8) -> Self {
        match value {
            0x1B => Self::H264,
            0x0F => Self::AdtsAac,
            v => Self::Other(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatEntry {
    pub program_number: u16,
    pub pmt_pid: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: StreamType,
    pub elementary_pid: u16,
}

/// Skip the pointer field and return the section body between the header and
/// the CRC, checked against `table_id`.
fn section_body(payload: &[u8], table_id: u8, header_len: usize) -> Result<&[u8]> {
    let pointer = *payload
        .first()
        .ok_or_else(|| Error::invalid_ts("empty PSI payload"))? as usize;
    let section = payload
        .get(1 + pointer..)
        .ok_or_else(|| Error::invalid_ts("pointer field past end of packet"))?;
    if section.len() < 3 {
        return Err(Error::invalid_ts("truncated PSI section"));
    }
    if section[0] != table_id {
        return Err(Error::invalid_ts(format!(
            "expected table id {:#04x}, found {:#04x}",
            table_id, section[0]
        )));
    }

    let section_length = (u16::from_be_bytes([section[1], section[2]]) & 0x0FFF) as usize;
    let end = 3 + section_length;
    if end > section.len() {
        return Err(Error::unsupported(format!(
            "PSI section of {} bytes spanning packets",
            section_length
        )));
    }
    if section_length < header_len + CRC_SIZE {
        return Err(Error::invalid_ts(format!(
            "PSI section length {} too short",
            section_length
        )));
    }
    Ok(&section[3 + header_len..end - CRC_SIZE])
}

/// Parse a PAT from a payload that starts a section.
pub fn parse_pat(payload: &[u8]) -> Result<Vec<PatEntry>> {
    // transport_stream_id, version, section numbers
    let body = section_body(payload, TABLE_ID_PAT, 5)?;
    Ok(body
        .chunks_exact(4)
        .map(|e| PatEntry {
            program_number: u16::from_be_bytes([e[0], e[1]]),
            pmt_pid: u16::from_be_bytes([e[2], e[3]]) & 0x1FFF,
        })
        // program 0 points at the network information table
        .filter(|e| e.program_number != 0)
        .collect())
}

/// Parse a PMT from a payload that starts a section.
pub fn parse_pmt(payload: &[u8]) -> Result<Vec<PmtStream>> {
    // program_number, version, section numbers, PCR PID, program_info_length
    let body = section_body(payload, TABLE_ID_PMT, 9)?;
    let pointer = payload[0] as usize;
    let header = &payload[1 + pointer + 3..];
    let program_info_length = (u16::from_be_bytes([header[7], header[8]]) & 0x0FFF) as usize;

    let mut streams = Vec::new();
    let mut pos = program_info_length;
    while pos + 5 <= body.len() {
        let stream_type = StreamType::from(body[pos]);
        let elementary_pid = u16::from_be_bytes([body[pos + 1], body[pos + 2]]) & 0x1FFF;
        let es_info_length = (u16::from_be_bytes([body[pos + 3], body[pos + 4]]) & 0x0FFF) as usize;
        streams.push(PmtStream {
            stream_type,
            elementary_pid,
        });
        pos += 5 + es_info_length;
    }
    Ok(streams)
}

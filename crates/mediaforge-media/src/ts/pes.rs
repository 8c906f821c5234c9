//! PES packet header.

use crate::error::{Error, Result};

/// Timestamp fields of a PES header, in 90 kHz ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
}

/// Stream ids whose packets carry no optional header (ISO/IEC 13818-1 2.4.3.7)
fn has_optional_header(stream_id: u8) -> bool {
    !matches!(
        stream_id,
        0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xF9 | 0xFF
    )
}

/// 33-bit timestamp spread over 5 bytes with marker bits.
fn read_timestamp(b: &[u8]) -> u64 {
    (((b[0] >> 1) & 0x07) as u64) << 30
        | (b[1] as u64) << 22
        | ((b[2] >> 1) as u64) << 15
        | (b[3] as u64) << 7
        | (b[4] >> 1) as u64
}

/// Parse the header at the start of a PES packet. Returns the header and the
/// length of the header, i.e. where the elementary stream data starts.
pub fn parse_pes_header(data: &[u8]) -> Result<(PesHeader, usize)> {
    if data.len() < 6 || data[..3] != [0, 0, 1] {
        return Err(Error::invalid_ts("PES start code not found"));
    }
    let stream_id = data[3];
    if !has_optional_header(stream_id) {
        return Ok((
            PesHeader {
                stream_id,
                pts: None,
                dts: None,
            },
            6,
        ));
    }

    if data.len() < 9 {
        return Err(Error::invalid_ts("truncated PES header"));
    }
    let flags = data[7] >> 6;
    let header_data_length = data[8] as usize;
    let payload_start = 9 + header_data_length;
    if payload_start > data.len() {
        return Err(Error::invalid_ts(format!(
            "PES header data of {} bytes exceeds packet",
            header_data_length
        )));
    }

    let field = |at: usize| {
        data.get(at..at + 5)
            .filter(|_| at + 5 <= payload_start)
            .map(read_timestamp)
            .ok_or_else(|| Error::invalid_ts("PES timestamp outside header data"))
    };
    let (pts, dts) = match flags {
        0b10 => (Some(field(9)?), None),
        0b11 => (Some(field(9)?), Some(field(14)?)),
        0b01 => return Err(Error::invalid_ts("PES header with DTS but no PTS")),
        _ => (None, None),
    };

    Ok((
        PesHeader {
            stream_id,
            pts,
            dts,
        },
        payload_start,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::pes_header;

    #[test]
    fn test_pts_only() {
        let data = pes_header(0xE0, Some(1000), None);
        let (header, len) = parse_pes_header(&data).unwrap();
        assert_eq!(header.pts, Some(1000));
        assert_eq!(header.dts, None);
        assert_eq!(len, data.len());
    }

    #[test]
    fn test_pts_and_dts_use_33_bits() {
        let pts = (1u64 << 32) + 12345;
        let data = pes_header(0xE0, Some(pts), Some(pts - 3003));
        let (header, _) = parse_pes_header(&data).unwrap();
        assert_eq!(header.pts, Some(pts));
        assert_eq!(header.dts, Some(pts - 3003));
    }

    #[test]
    fn test_streams_without_optional_header() {
        // program stream directory, ancillary stream, padding
        for stream_id in [0xFF, 0xF9, 0xBE] {
            let data = [0, 0, 1, stream_id, 0, 3, 0x80, 0x80, 0x05];
            let (header, len) = parse_pes_header(&data).unwrap();
            assert_eq!(header.stream_id, stream_id);
            assert_eq!(header.pts, None);
            assert_eq!(len, 6);
        }
    }

    #[test]
    fn test_missing_start_code() {
        assert!(parse_pes_header(&[0, 0, 2, 0xE0, 0, 0, 0x80, 0, 0]).is_err());
    }
}

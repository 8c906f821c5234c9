//! Structural dump of a container: EBML element tree, ISO-BMFF box tree,
//! RIFF chunk list or a per-PID packet summary for transport streams.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use mediaforge_media::ebml::{parse_ebml, read_element_header, EbmlId, ElementNode, ElementValue};
use mediaforge_media::isobmff::{parse_boxes, BoxNode};
use mediaforge_media::riff::{read_chunk_header, read_riff_header, read_wave_format};
use mediaforge_media::ts::{parse_packet, PACKET_SIZE};
use mediaforge_media::{detect_format, ByteCursor, ContainerFormat};

/// Print the structure of the file at `path`. Nesting below `max_depth` is
/// not printed.
pub fn dump_file(path: &Path, out: &mut impl Write, max_depth: Option<usize>) -> Result<()> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    dump_bytes(&data, out, max_depth)
}

pub fn dump_bytes(data: &[u8], out: &mut impl Write, max_depth: Option<usize>) -> Result<()> {
    let max_depth = max_depth.unwrap_or(usize::MAX);
    let format = detect_format(data, true)?.context("Could not detect container format")?;
    tracing::debug!(%format, "Dumping");

    match format {
        ContainerFormat::Webm => dump_ebml(data, out, max_depth),
        ContainerFormat::IsoBmff => {
            for node in parse_boxes(data, 0)? {
                write_box(out, &node, 0, max_depth)?;
            }
            Ok(())
        }
        ContainerFormat::TransportStream => dump_ts(data, out),
        ContainerFormat::Wave => dump_riff(data, out),
    }
}

fn dump_riff(data: &[u8], out: &mut impl Write) -> Result<()> {
    let mut cursor = ByteCursor::from_bytes(data);
    let header = read_riff_header(&mut cursor)?;
    writeln!(out, "RIFF WAVE size {}", header.file_size)?;

    while !cursor.is_exhausted() {
        let chunk = read_chunk_header(&mut cursor)?;
        let payload = cursor.bytes_remaining().min(chunk.size as usize);
        if chunk.id == *b"fmt " {
            let format = read_wave_format(&mut cursor, chunk.size)?;
            writeln!(
                out,
                "  fmt  @{} size {}: tag {:#06x}, {} ch, {} Hz, {} bits",
                chunk.offset,
                chunk.size,
                format.format_tag,
                format.number_of_channels,
                format.sample_rate,
                format.bits_per_sample
            )?;
            cursor.discard_available(chunk.padded_size() - chunk.size as u64);
            continue;
        }
        writeln!(out, "  {} @{} size {}", chunk.id_str(), chunk.offset, chunk.size)?;
        if (payload as u64) < chunk.size as u64 {
            tracing::warn!(id = %chunk.id_str(), "Chunk runs past end of input");
        }
        cursor.discard_available(chunk.padded_size());
    }
    Ok(())
}

fn dump_ebml(data: &[u8], out: &mut impl Write, max_depth: usize) -> Result<()> {
    let mut cursor = ByteCursor::from_bytes(data);
    while !cursor.is_exhausted() {
        let header = cursor.peek(read_element_header)?;
        if header.id != EbmlId::SEGMENT {
            let node = parse_ebml(&mut cursor)?;
            write_element(out, &node, 0, max_depth)?;
            continue;
        }

        // The Segment holds the whole file; walk it one child at a time.
        let header = read_element_header(&mut cursor)?;
        let size = header
            .size
            .map_or_else(|| "unknown".to_string(), |s| s.to_string());
        writeln!(
            out,
            "{} ({}) @{} size {}",
            header.info.name, header.id, header.offset, size
        )?;
        let end = header.size.map(|s| cursor.offset() + s);
        while end.map_or(!cursor.is_exhausted(), |end| cursor.offset() < end) {
            let node = parse_ebml(&mut cursor)?;
            if max_depth > 0 {
                write_element(out, &node, 1, max_depth)?;
            }
        }
    }
    Ok(())
}

fn write_element(
    out: &mut impl Write,
    node: &ElementNode,
    depth: usize,
    max_depth: usize,
) -> Result<()> {
    let indent = "  ".repeat(depth);
    let value = match &node.value {
        ElementValue::Uint(v) => format!(": {}", v),
        ElementValue::Int(v) => format!(": {}", v),
        ElementValue::Float(v) => format!(": {}", v),
        ElementValue::String(s) => format!(": {:?}", s),
        ElementValue::Binary(b) => format!(": <{} bytes>", b.len()),
        ElementValue::Void | ElementValue::Children(_) => String::new(),
    };
    writeln!(
        out,
        "{}{} ({}) @{} size {}{}",
        indent, node.name, node.id, node.offset, node.size, value
    )?;

    if depth < max_depth {
        for child in node.children() {
            write_element(out, child, depth + 1, max_depth)?;
        }
    }
    Ok(())
}

fn write_box(out: &mut impl Write, node: &BoxNode, depth: usize, max_depth: usize) -> Result<()> {
    writeln!(
        out,
        "{}{} @{} size {}",
        "  ".repeat(depth),
        node.box_type,
        node.offset,
        node.size
    )?;
    if depth < max_depth {
        for child in node.children() {
            write_box(out, child, depth + 1, max_depth)?;
        }
    }
    Ok(())
}

fn dump_ts(data: &[u8], out: &mut impl Write) -> Result<()> {
    let data = Bytes::copy_from_slice(data);
    let mut counts: BTreeMap<u16, (u64, u64)> = BTreeMap::new();

    for (i, chunk) in data.chunks(PACKET_SIZE).enumerate() {
        if chunk.len() < PACKET_SIZE {
            tracing::warn!(bytes = chunk.len(), "Ignoring trailing partial packet");
            break;
        }
        let offset = (i * PACKET_SIZE) as u64;
        let packet = parse_packet(data.slice_ref(chunk), offset)?;
        let entry = counts.entry(packet.pid).or_default();
        entry.0 += 1;
        if packet.payload_unit_start {
            entry.1 += 1;
        }
    }

    for (pid, (packets, units)) in counts {
        writeln!(out, "PID {:#06x}: {} packets, {} unit starts", pid, packets, units)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaforge_media::testing::{wav_file, webm_file, TsWriter, WebmTrackSpec};
    use mediaforge_media::MuxOptions;
    use mediaforge_probe::testing::h264_key_frame;

    fn dump(data: &[u8], max_depth: Option<usize>) -> String {
        let mut out = Vec::new();
        dump_bytes(data, &mut out, max_depth).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_dump_webm_tree() {
        let data = webm_file(
            &[WebmTrackSpec::vp9(1, 320, 240)],
            &[(0, vec![(1, 0, true, vec![1, 2, 3])])],
        );
        let text = dump(&data, None);
        assert!(text.starts_with("EBML (0x1a45dfa3) @0"));
        assert!(text.contains("  DocType (0x4282)"));
        assert!(text.contains("Segment (0x18538067)"));
        assert!(text.contains("      CodecID (0x86)"));
        assert!(text.contains("SimpleBlock (0xa3)"));
        assert!(text.contains("<7 bytes>"));
    }

    #[test]
    fn test_dump_depth_limit() {
        let data = webm_file(&[WebmTrackSpec::vp9(1, 320, 240)], &[]);
        let text = dump(&data, Some(1));
        assert!(text.contains("  Tracks (0x1654ae6b)"));
        assert!(!text.contains("TrackEntry"));
    }

    #[test]
    fn test_dump_moov_tree() {
        let moov = mediaforge_media::create_padded_moov_atom(&MuxOptions::new(vec![])).unwrap();
        let text = dump(&moov, None);
        assert!(text.starts_with("moov @0 size 8196"));
        assert!(text.contains("  mvhd @8"));
        assert!(text.contains("free"));
    }

    #[test]
    fn test_dump_ts_summary() {
        let mut ts = TsWriter::new(&[(0x1B, 0x100)]);
        ts.pes(0x100, 0xE0, 0, None, &h264_key_frame(320, 240));
        let text = dump(&ts.finish(), None);
        assert!(text.contains("PID 0x0000: 1 packets"));
        assert!(text.contains("PID 0x0100: 1 packets, 1 unit starts"));
    }

    #[test]
    fn test_dump_wave_chunks() {
        let mut data = wav_file(2, 44100, 16, &[0; 16]);
        data.extend(b"LIST\x03\x00\x00\x00abc\x00");
        let text = dump(&data, None);
        assert!(text.starts_with("RIFF WAVE size 52"));
        assert!(text.contains("  fmt  @12 size 16: tag 0x0001, 2 ch, 44100 Hz, 16 bits"));
        assert!(text.contains("  data @36 size 16"));
        assert!(text.contains("  LIST @60 size 3"));
    }
}

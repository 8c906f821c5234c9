//! ISO-BMFF box reader.

use bytes::Bytes;
use tracing::trace;

use super::atoms::BoxType;
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};

/// Parsed box header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: BoxType,
    /// Total size including the header; `None` when the box runs to the end
    /// of its enclosing scope (size field 0).
    pub size: Option<u64>,
    /// 8, or 16 with a 64-bit size
    pub header_size: u8,
    /// Absolute offset of the size field
    pub offset: u64,
}

impl BoxHeader {
    /// Payload size, if the box size is known.
    pub fn payload_size(&self) -> Option<u64> {
        self.size.map(|s| s - self.header_size as u64)
    }
}

/// Read a box header. Consumes nothing unless the whole header is buffered.
pub fn read_box_header(cursor: &mut ByteCursor) -> Result<BoxHeader> {
    cursor.attempt(|c| {
        let offset = c.offset();
        let size32 = c.get_u32()?;
        let box_type = BoxType::from_bytes(c.get_fourcc()?);

        let (size, header_size) = match size32 {
            1 => (Some(c.get_u64()?), 16u8),
            0 => (None, 8u8),
            n => (Some(n as u64), 8u8),
        };

        if let Some(size) = size {
            if size < header_size as u64 {
                return Err(Error::invalid_mp4(format!(
                    "{} box at offset {} has size {} smaller than its header",
                    box_type, offset, size
                )));
            }
        }

        Ok(BoxHeader {
            box_type,
            size,
            header_size,
            offset,
        })
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoxPayload {
    Children(Vec<BoxNode>),
    Data(Bytes),
}

/// One parsed box and its subtree.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxNode {
    pub box_type: BoxType,
    pub offset: u64,
    pub header_size: u8,
    /// Total size including the header
    pub size: u64,
    pub payload: BoxPayload,
}

impl BoxNode {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    pub fn children(&self) -> &[BoxNode] {
        match &self.payload {
            BoxPayload::Children(children) => children,
            BoxPayload::Data(_) => &[],
        }
    }

    /// Leaf payload; empty for containers.
    pub fn data(&self) -> &[u8] {
        match &self.payload {
            BoxPayload::Data(data) => data,
            BoxPayload::Children(_) => &[],
        }
    }

    pub fn child(&self, box_type: BoxType) -> Option<&BoxNode> {
        self.children().iter().find(|c| c.box_type == box_type)
    }

    pub fn children_of(&self, box_type: BoxType) -> impl Iterator<Item = &BoxNode> {
        self.children().iter().filter(move |c| c.box_type == box_type)
    }

    /// Descendant reached by following `path` through first matches.
    pub fn find(&self, path: &[BoxType]) -> Option<&BoxNode> {
        path.iter().try_fold(self, |node, t| node.child(*t))
    }
}

/// Parse one complete box. Suspends without consuming until the whole box
/// is buffered; a box that runs to the end of input waits for `finish`.
pub fn parse_box(cursor: &mut ByteCursor) -> Result<BoxNode> {
    cursor.attempt(|c| parse_box_within(c, None))
}

/// Parse back-to-back boxes filling `data`, whose first byte sits at `offset`.
pub fn parse_boxes(data: &[u8], offset: u64) -> Result<Vec<BoxNode>> {
    let mut cursor = ByteCursor::from_bytes_at(data, offset);
    let end = offset + data.len() as u64;
    parse_children(&mut cursor, "payload", end)
}

/// Parse the children of a container ending at `end`.
///
/// QuickTime closes some containers (`udta` in particular) with a 32-bit
/// zero instead of a box; such a terminator ends the child list.
fn parse_children(cursor: &mut ByteCursor, container: &str, end: u64) -> Result<Vec<BoxNode>> {
    let mut children = Vec::new();
    while cursor.offset() < end {
        let remaining = end - cursor.offset();
        if remaining < BOX_HEADER_SIZE {
            if remaining >= 4 && cursor.peek_slice(4)? == [0; 4] {
                trace!(container, offset = cursor.offset(), "zero terminator");
                cursor.discard(remaining)?;
                break;
            }
            return Err(Error::invalid_mp4(format!(
                "{} bytes of trailing data at offset {} in {}",
                remaining,
                cursor.offset(),
                container
            )));
        }
        children.push(parse_box_within(cursor, Some((container, end)))?);
    }
    Ok(children)
}

const BOX_HEADER_SIZE: u64 = 8;

fn parse_box_within(cursor: &mut ByteCursor, parent: Option<(&str, u64)>) -> Result<BoxNode> {
    let header = read_box_header(cursor)?;
    let payload_start = cursor.offset();

    let size = match (header.size, parent) {
        (Some(size), _) => size,
        (None, Some((container, parent_end))) => parent_end
            .checked_sub(header.offset)
            .filter(|&size| size >= header.header_size as u64)
            .ok_or_else(|| {
                Error::invalid_mp4(format!(
                    "{} box at offset {} does not fit in {}",
                    header.box_type, header.offset, container
                ))
            })?,
        (None, None) => {
            if !cursor.is_finished() {
                return Err(Error::InsufficientData {
                    needed: cursor.bytes_remaining() + 1,
                    available: cursor.bytes_remaining(),
                });
            }
            header.header_size as u64 + cursor.bytes_remaining() as u64
        }
    };
    let end = header.offset + size;

    if let Some((container, parent_end)) = parent {
        if end > parent_end {
            return Err(Error::ContainerOverrun {
                container: container.to_string(),
                offset: end,
                end: parent_end,
            });
        }
    }

    let payload_len = end
        .checked_sub(payload_start)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or_else(|| Error::invalid_mp4(format!("{} box has invalid size {}", header.box_type, size)))?;
    cursor.ensure(payload_len)?;

    trace!(box_type = %header.box_type, offset = header.offset, size, "box");

    let payload = if header.box_type.is_container() {
        if header.box_type.is_full_container() && has_version_flags(cursor, payload_len)? {
            cursor.discard(4)?;
        }
        BoxPayload::Children(parse_children(cursor, header.box_type.as_str(), end)?)
    } else {
        BoxPayload::Data(cursor.get_slice(payload_len)?)
    };

    Ok(BoxNode {
        box_type: header.box_type,
        offset: header.offset,
        header_size: header.header_size,
        size,
        payload,
    })
}

/// ISO `meta` is a full box; QuickTime's `meta` starts directly with its
/// first child. Tell them apart by whether the payload opens with a box
/// header that fits.
fn has_version_flags(cursor: &ByteCursor, payload_len: usize) -> Result<bool> {
    if payload_len < 4 {
        return Err(Error::invalid_mp4(format!(
            "meta box payload of {} bytes is too short",
            payload_len
        )));
    }
    if payload_len < BOX_HEADER_SIZE as usize {
        return Ok(true);
    }
    let head = cursor.peek_slice(BOX_HEADER_SIZE as usize)?;
    let size = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as usize;
    let is_child = size >= BOX_HEADER_SIZE as usize
        && size <= payload_len
        && BoxType::is_plausible(&head[4..8]);
    Ok(!is_child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isobmff::writer::BoxWriter;

    fn sample_tree() -> Vec<u8> {
        let mut w = BoxWriter::new();
        w.begin_box(BoxType::MOOV);
        w.begin_box(BoxType::TRAK);
        w.begin_box(BoxType::TKHD);
        w.put_u32(0xDEADBEEF);
        w.end_box().unwrap();
        w.end_box().unwrap();
        w.begin_box(BoxType::UDTA);
        w.end_box().unwrap();
        w.end_box().unwrap();
        w.finish().unwrap().to_vec()
    }

    #[test]
    fn test_nested_boxes() {
        let data = sample_tree();
        let moov = parse_box(&mut ByteCursor::from_bytes(&data)).unwrap();

        assert_eq!(moov.box_type, BoxType::MOOV);
        assert_eq!(moov.size, data.len() as u64);
        assert_eq!(moov.children().len(), 2);

        let tkhd = moov.find(&[BoxType::TRAK, BoxType::TKHD]).unwrap();
        assert_eq!(tkhd.data(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(tkhd.offset, 16);
    }

    #[test]
    fn test_large_size_header() {
        let mut data = vec![0, 0, 0, 1];
        data.extend_from_slice(b"free");
        data.extend_from_slice(&20u64.to_be_bytes());
        data.extend_from_slice(&[7; 4]);

        let node = parse_box(&mut ByteCursor::from_bytes(&data)).unwrap();
        assert_eq!(node.header_size, 16);
        assert_eq!(node.data(), &[7; 4]);
    }

    #[test]
    fn test_size_zero_runs_to_end_of_input() {
        let mut data = vec![0, 0, 0, 0];
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&[1, 2, 3]);

        let mut cursor = ByteCursor::new();
        cursor.feed(&data);
        assert!(parse_box(&mut cursor).unwrap_err().is_suspension());

        cursor.finish();
        let node = parse_box(&mut cursor).unwrap();
        assert_eq!(node.size, 11);
        assert_eq!(node.data(), &[1, 2, 3]);
    }

    #[test]
    fn test_child_overrunning_parent() {
        // moov of 16 bytes holding a trak that claims 12
        let mut data = vec![0, 0, 0, 16];
        data.extend_from_slice(b"moov");
        data.extend_from_slice(&[0, 0, 0, 12]);
        data.extend_from_slice(b"trak");
        data.extend_from_slice(&[0; 4]);

        assert!(matches!(
            parse_box(&mut ByteCursor::from_bytes(&data)),
            Err(Error::ContainerOverrun { end: 16, offset: 20, .. })
        ));
    }

    #[test]
    fn test_udta_zero_terminator() {
        // moov { udta { 00 00 00 00 }, free }
        let mut data = vec![0, 0, 0, 28];
        data.extend_from_slice(b"moov");
        data.extend_from_slice(&[0, 0, 0, 12]);
        data.extend_from_slice(b"udta");
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&[0, 0, 0, 8]);
        data.extend_from_slice(b"free");

        let moov = parse_box(&mut ByteCursor::from_bytes(&data)).unwrap();
        assert_eq!(moov.children().len(), 2);
        let udta = moov.child(BoxType::UDTA).unwrap();
        assert!(udta.children().is_empty());
        assert_eq!(moov.children()[1].box_type, BoxType::FREE);
        assert_eq!(moov.children()[1].offset, 20);
    }

    #[test]
    fn test_short_non_zero_tail_rejected() {
        let mut data = vec![0, 0, 0, 13];
        data.extend_from_slice(b"udta");
        data.extend_from_slice(&[1, 2, 3, 4, 5]);

        assert!(matches!(
            parse_box(&mut ByteCursor::from_bytes(&data)),
            Err(Error::InvalidMp4(_))
        ));
    }

    #[test]
    fn test_size_zero_child_fills_parent() {
        let mut data = vec![0, 0, 0, 20];
        data.extend_from_slice(b"udta");
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(b"free");
        data.extend_from_slice(&[9; 4]);

        let udta = parse_box(&mut ByteCursor::from_bytes(&data)).unwrap();
        let free = udta.child(BoxType::FREE).unwrap();
        assert_eq!(free.size, 12);
        assert_eq!(free.data(), &[9; 4]);
    }

    #[test]
    fn test_meta_with_and_without_version_flags() {
        let mut hdlr = vec![0, 0, 0, 12];
        hdlr.extend_from_slice(b"hdlr");
        hdlr.extend_from_slice(&[0; 4]);

        // ISO full box
        let mut iso = vec![0, 0, 0, 24];
        iso.extend_from_slice(b"meta");
        iso.extend_from_slice(&[0; 4]);
        iso.extend_from_slice(&hdlr);
        // QuickTime plain container
        let mut qt = vec![0, 0, 0, 20];
        qt.extend_from_slice(b"meta");
        qt.extend_from_slice(&hdlr);

        for data in [iso, qt] {
            let meta = parse_box(&mut ByteCursor::from_bytes(&data)).unwrap();
            assert_eq!(meta.children().len(), 1);
            assert_eq!(meta.children()[0].box_type, BoxType(*b"hdlr"));
        }
    }

    #[test]
    fn test_meta_shorter_than_version_flags_rejected() {
        let mut data = vec![0, 0, 0, 10];
        data.extend_from_slice(b"meta");
        data.extend_from_slice(&[0, 0]);

        assert!(matches!(
            parse_box(&mut ByteCursor::from_bytes(&data)),
            Err(Error::InvalidMp4(_))
        ));
    }

    #[test]
    fn test_undersized_box_rejected() {
        let mut data = vec![0, 0, 0, 4];
        data.extend_from_slice(b"free");
        assert!(matches!(
            read_box_header(&mut ByteCursor::from_bytes(&data)),
            Err(Error::InvalidMp4(_))
        ));
    }
}

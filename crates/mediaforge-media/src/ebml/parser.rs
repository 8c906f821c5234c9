//! EBML element tree parser.

use bytes::Bytes;
use tracing::trace;

use super::ids::{EbmlId, ElementInfo, ElementType};
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};

/// Decoded element payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Uint(u64),
    /// Signed integers and dates
    Int(i64),
    Float(f64),
    String(String),
    Binary(Bytes),
    /// Payload was skipped
    Void,
    Children(Vec<ElementNode>),
}

/// One parsed element with its position in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub id: EbmlId,
    pub name: &'static str,
    pub value: ElementValue,
    /// Absolute offset of the first id byte
    pub offset: u64,
    /// Bytes taken by the id and size fields
    pub header_size: u8,
    /// Payload size
    pub size: u64,
}

impl ElementNode {
    /// Offset just past this element.
    pub fn end(&self) -> u64 {
        self.offset + self.header_size as u64 + self.size
    }

    pub fn children(&self) -> &[ElementNode] {
        match &self.value {
            ElementValue::Children(children) => children,
            _ => &[],
        }
    }

    /// First direct child with `id`.
    pub fn child(&self, id: EbmlId) -> Option<&ElementNode> {
        self.children().iter().find(|c| c.id == id)
    }

    /// All direct children with `id`.
    pub fn children_of(&self, id: EbmlId) -> impl Iterator<Item = &ElementNode> {
        self.children().iter().filter(move |c| c.id == id)
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self.value {
            ElementValue::Uint(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.value {
            ElementValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.value {
            ElementValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            ElementValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match &self.value {
            ElementValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn child_uint(&self, id: EbmlId) -> Option<u64> {
        self.child(id).and_then(ElementNode::as_uint)
    }

    pub fn child_float(&self, id: EbmlId) -> Option<f64> {
        self.child(id).and_then(ElementNode::as_float)
    }

    pub fn child_str(&self, id: EbmlId) -> Option<&str> {
        self.child(id).and_then(ElementNode::as_str)
    }

    pub fn child_binary(&self, id: EbmlId) -> Option<&Bytes> {
        self.child(id).and_then(ElementNode::as_binary)
    }
}

/// Element id and size, read ahead of the payload.
#[derive(Debug, Clone, Copy)]
pub struct ElementHeader {
    pub id: EbmlId,
    pub info: &'static ElementInfo,
    /// `None` for the reserved unknown-size value
    pub size: Option<u64>,
    pub offset: u64,
    pub header_size: u8,
}

/// Read an element's id and size. Unknown ids are rejected.
pub fn read_element_header(cursor: &mut ByteCursor) -> Result<ElementHeader> {
    let offset = cursor.offset();
    let id = EbmlId(cursor.get_matroska_id()?);
    let info = id
        .info()
        .ok_or(Error::UnknownElementId { id: id.0, offset })?;
    let size = cursor.get_vint()?;

    Ok(ElementHeader {
        id,
        info,
        size: (!size.is_unknown_size()).then_some(size.value),
        offset,
        header_size: (cursor.offset() - offset) as u8,
    })
}

/// Parse one complete element, children included.
///
/// The element must be fully buffered; otherwise the cursor is left where it
/// was and [`Error::InsufficientData`] is returned.
pub fn parse_ebml(cursor: &mut ByteCursor) -> Result<ElementNode> {
    cursor.attempt(|c| parse_element(c, None))
}

fn parse_element(cursor: &mut ByteCursor, parent: Option<(&'static str, u64)>) -> Result<ElementNode> {
    let header = read_element_header(cursor)?;
    let size = header.size.ok_or(Error::UnknownSizeElement {
        id: header.id.0,
        offset: header.offset,
    })?;

    let start = cursor.offset();
    let end = start + size;
    if let Some((container, parent_end)) = parent {
        if end > parent_end {
            return Err(Error::ContainerOverrun {
                container: container.to_string(),
                offset: end,
                end: parent_end,
            });
        }
    }

    // Wait for the whole payload before decoding any of it.
    let len = usize::try_from(size).map_err(|_| Error::InvalidElementSize {
        name: header.info.name,
        size,
    })?;
    cursor.ensure(len)?;

    trace!(id = %header.id, name = header.info.name, offset = header.offset, size, "EBML element");

    let invalid = || Error::InvalidElementSize {
        name: header.info.name,
        size,
    };

    let value = match header.info.element_type {
        ElementType::Uint => {
            if len > 8 {
                return Err(invalid());
            }
            ElementValue::Uint(cursor.get_uint_n(len)?)
        }
        ElementType::Int | ElementType::Date => {
            if len > 8 {
                return Err(invalid());
            }
            let raw = cursor.get_uint_n(len)?;
            ElementValue::Int(sign_extend(raw, len))
        }
        ElementType::Float => match len {
            0 => ElementValue::Float(0.0),
            4 => ElementValue::Float(f32::from_bits(cursor.get_u32()?) as f64),
            8 => ElementValue::Float(f64::from_bits(cursor.get_u64()?)),
            _ => return Err(invalid()),
        },
        ElementType::String | ElementType::Utf8 => {
            let text = cursor.get_byte_string(len)?;
            ElementValue::String(text.trim_end_matches('\0').to_string())
        }
        ElementType::Binary => ElementValue::Binary(cursor.get_slice(len)?),
        ElementType::Void => {
            cursor.discard(size)?;
            ElementValue::Void
        }
        ElementType::Children => {
            let mut children = Vec::new();
            while cursor.offset() < end {
                children.push(parse_element(cursor, Some((header.info.name, end)))?);
            }
            ElementValue::Children(children)
        }
    };

    Ok(ElementNode {
        id: header.id,
        name: header.info.name,
        value,
        offset: header.offset,
        header_size: header.header_size,
        size,
    })
}

fn sign_extend(raw: u64, len: usize) -> i64 {
    if len == 0 {
        return 0;
    }
    let shift = 64 - 8 * len as u32;
    ((raw << shift) as i64) >> shift
}

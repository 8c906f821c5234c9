//! ISO-BMFF box type codes.

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxType(pub [u8; 4]);

impl BoxType {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MOOF: Self = Self(*b"moof");
    pub const MVEX: Self = Self(*b"mvex");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const VMHD: Self = Self(*b"vmhd");
    pub const SMHD: Self = Self(*b"smhd");
    pub const DINF: Self = Self(*b"dinf");
    pub const DREF: Self = Self(*b"dref");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STZ2: Self = Self(*b"stz2");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const CTTS: Self = Self(*b"ctts");
    pub const UDTA: Self = Self(*b"udta");
    pub const META: Self = Self(*b"meta");
    pub const ILST: Self = Self(*b"ilst");
    pub const FREE: Self = Self(*b"free");
    pub const SKIP: Self = Self(*b"skip");
    pub const URL: Self = Self(*b"url ");
    pub const DATA: Self = Self(*b"data");
    /// iTunes metadata items
    pub const TOOL: Self = Self([0xA9, b't', b'o', b'o']);
    pub const COMMENT: Self = Self([0xA9, b'c', b'm', b't']);

    // Sample entries and their configuration boxes
    pub const AVC1: Self = Self(*b"avc1");
    pub const AVC3: Self = Self(*b"avc3");
    pub const AVCC: Self = Self(*b"avcC");
    pub const HVC1: Self = Self(*b"hvc1");
    pub const HEV1: Self = Self(*b"hev1");
    pub const HVCC: Self = Self(*b"hvcC");
    pub const AV01: Self = Self(*b"av01");
    pub const AV1C: Self = Self(*b"av1C");
    pub const VP09: Self = Self(*b"vp09");
    pub const VPCC: Self = Self(*b"vpcC");
    pub const MP4A: Self = Self(*b"mp4a");
    pub const ESDS: Self = Self(*b"esds");
    pub const OPUS: Self = Self(*b"Opus");
    pub const DOPS: Self = Self(*b"dOps");
    pub const PASP: Self = Self(*b"pasp");
    pub const COLR: Self = Self(*b"colr");

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Printable name; 0xA9 is the Mac Roman `©` of iTunes metadata items.
    pub fn name(&self) -> String {
        self.0
            .iter()
            .map(|&b| match b {
                0xA9 => '©',
                0x20..=0x7E => b as char,
                _ => '?',
            })
            .collect()
    }

    /// Whether `fourcc` could be a box type: printable ASCII or 0xA9.
    pub fn is_plausible(fourcc: &[u8]) -> bool {
        fourcc.len() == 4 && fourcc.iter().all(|&b| b == 0xA9 || (0x20..0x7F).contains(&b))
    }

    /// Boxes whose payload is a sequence of child boxes.
    pub fn is_container(&self) -> bool {
        matches!(
            *self,
            Self::MOOV
                | Self::TRAK
                | Self::EDTS
                | Self::MDIA
                | Self::MINF
                | Self::DINF
                | Self::STBL
                | Self::UDTA
                | Self::MVEX
                | Self::MOOF
                | Self::ILST
                | Self::META
        )
    }

    /// Containers that start with a version/flags word before their children.
    pub fn is_full_container(&self) -> bool {
        *self == Self::META
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Handler type for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Hint,
    Meta,
    Text,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"hint" => Self::Hint,
            b"meta" => Self::Meta,
            b"text" => Self::Text,
            _ => Self::Unknown(bytes),
        }
    }

    pub fn as_bytes(&self) -> [u8; 4] {
        match self {
            Self::Video => *b"vide",
            Self::Audio => *b"soun",
            Self::Hint => *b"hint",
            Self::Meta => *b"meta",
            Self::Text => *b"text",
            Self::Unknown(bytes) => *bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_type_display() {
        assert_eq!(BoxType::MOOV.to_string(), "moov");
        assert_eq!(BoxType([0xFF, 0, 0, 0]).to_string(), "????");
    }

    #[test]
    fn test_itunes_item_names() {
        assert_eq!(BoxType::TOOL.to_string(), "©too");
        assert_eq!(BoxType::COMMENT.name(), "©cmt");
        assert!(BoxType::is_plausible(&BoxType::TOOL.0));
        assert!(!BoxType::is_plausible(&[0, 0, 0, 8]));
    }

    #[test]
    fn test_container_classification() {
        assert!(BoxType::STBL.is_container());
        assert!(BoxType::META.is_full_container());
        assert!(!BoxType::MDAT.is_container());
        assert!(!BoxType::STSD.is_container());
    }

    #[test]
    fn test_handler_roundtrip() {
        assert_eq!(HandlerType::from_bytes(*b"soun"), HandlerType::Audio);
        assert_eq!(HandlerType::Video.as_bytes(), *b"vide");
        assert_eq!(
            HandlerType::from_bytes(*b"subt"),
            HandlerType::Unknown(*b"subt")
        );
    }
}

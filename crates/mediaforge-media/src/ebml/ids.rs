//! Matroska element table.
//!
//! Element ids keep their length-marker bits, as they appear on the wire
//! (Segment is `0x18538067`, not `0x08538067`).

use phf::phf_map;
use std::fmt;

/// Matroska element id, marker bits included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EbmlId(pub u64);

impl EbmlId {
    pub const EBML: Self = Self(0x1A45DFA3);
    pub const DOC_TYPE: Self = Self(0x4282);
    pub const VOID: Self = Self(0xEC);
    pub const SEGMENT: Self = Self(0x18538067);
    pub const SEEK_HEAD: Self = Self(0x114D9B74);
    pub const INFO: Self = Self(0x1549A966);
    pub const TIMESTAMP_SCALE: Self = Self(0x2AD7B1);
    pub const DURATION: Self = Self(0x4489);
    pub const MUXING_APP: Self = Self(0x4D80);
    pub const WRITING_APP: Self = Self(0x5741);
    pub const TRACKS: Self = Self(0x1654AE6B);
    pub const TRACK_ENTRY: Self = Self(0xAE);
    pub const TRACK_NUMBER: Self = Self(0xD7);
    pub const TRACK_TYPE: Self = Self(0x83);
    pub const CODEC_ID: Self = Self(0x86);
    pub const CODEC_PRIVATE: Self = Self(0x63A2);
    pub const DEFAULT_DURATION: Self = Self(0x23E383);
    pub const VIDEO: Self = Self(0xE0);
    pub const PIXEL_WIDTH: Self = Self(0xB0);
    pub const PIXEL_HEIGHT: Self = Self(0xBA);
    pub const DISPLAY_WIDTH: Self = Self(0x54B0);
    pub const DISPLAY_HEIGHT: Self = Self(0x54BA);
    pub const COLOUR: Self = Self(0x55B0);
    pub const MATRIX_COEFFICIENTS: Self = Self(0x55B1);
    pub const RANGE: Self = Self(0x55B9);
    pub const TRANSFER_CHARACTERISTICS: Self = Self(0x55BA);
    pub const PRIMARIES: Self = Self(0x55BB);
    pub const AUDIO: Self = Self(0xE1);
    pub const SAMPLING_FREQUENCY: Self = Self(0xB5);
    pub const CHANNELS: Self = Self(0x9F);
    pub const CLUSTER: Self = Self(0x1F43B675);
    pub const TIMESTAMP: Self = Self(0xE7);
    pub const SIMPLE_BLOCK: Self = Self(0xA3);
    pub const BLOCK_GROUP: Self = Self(0xA0);
    pub const BLOCK: Self = Self(0xA1);
    pub const BLOCK_DURATION: Self = Self(0x9B);
    pub const REFERENCE_BLOCK: Self = Self(0xFB);
    pub const CUES: Self = Self(0x1C53BB6B);
    pub const TAGS: Self = Self(0x1254C367);

    /// Table entry for this id, if it is a known element.
    pub fn info(self) -> Option<&'static ElementInfo> {
        ELEMENTS.get(&self.0)
    }
}

impl fmt::Display for EbmlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// How an element's payload is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Uint,
    Int,
    Float,
    /// ASCII string
    String,
    Utf8,
    /// Nanoseconds since 2001-01-01, signed
    Date,
    Binary,
    /// Payload skipped
    Void,
    /// Master element
    Children,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementInfo {
    pub name: &'static str,
    pub element_type: ElementType,
}

macro_rules! el {
    ($name:literal, $ty:ident) => {
        ElementInfo {
            name: $name,
            element_type: ElementType::$ty,
        }
    };
}

/// Known elements keyed by id.
pub static ELEMENTS: phf::Map<u64, ElementInfo> = phf_map! {
    // EBML header
    0x1A45DFA3u64 => el!("EBML", Children),
    0x4286u64 => el!("EBMLVersion", Uint),
    0x42F7u64 => el!("EBMLReadVersion", Uint),
    0x42F2u64 => el!("EBMLMaxIDLength", Uint),
    0x42F3u64 => el!("EBMLMaxSizeLength", Uint),
    0x4282u64 => el!("DocType", String),
    0x4287u64 => el!("DocTypeVersion", Uint),
    0x4285u64 => el!("DocTypeReadVersion", Uint),
    0x4281u64 => el!("DocTypeExtension", Children),
    0x4283u64 => el!("DocTypeExtensionName", String),
    0x4284u64 => el!("DocTypeExtensionVersion", Uint),

    // Global
    0xECu64 => el!("Void", Void),
    0xBFu64 => el!("CRC-32", Binary),

    0x18538067u64 => el!("Segment", Children),

    // Meta seek
    0x114D9B74u64 => el!("SeekHead", Children),
    0x4DBBu64 => el!("Seek", Children),
    0x53ABu64 => el!("SeekID", Binary),
    0x53ACu64 => el!("SeekPosition", Uint),

    // Segment information
    0x1549A966u64 => el!("Info", Children),
    0x73A4u64 => el!("SegmentUUID", Binary),
    0x2AD7B1u64 => el!("TimestampScale", Uint),
    0x4489u64 => el!("Duration", Float),
    0x4461u64 => el!("DateUTC", Date),
    0x7BA9u64 => el!("Title", Utf8),
    0x4D80u64 => el!("MuxingApp", Utf8),
    0x5741u64 => el!("WritingApp", Utf8),
    0x7384u64 => el!("SegmentFilename", Utf8),
    0x3CB923u64 => el!("PrevUUID", Binary),
    0x3C83ABu64 => el!("PrevFilename", Utf8),
    0x3EB923u64 => el!("NextUUID", Binary),
    0x3E83BBu64 => el!("NextFilename", Utf8),
    0x4444u64 => el!("SegmentFamily", Binary),
    0x6924u64 => el!("ChapterTranslate", Children),
    0x69A5u64 => el!("ChapterTranslateID", Binary),
    0x69BFu64 => el!("ChapterTranslateCodec", Uint),
    0x69FCu64 => el!("ChapterTranslateEditionUID", Uint),

    // Cluster
    0x1F43B675u64 => el!("Cluster", Children),
    0xE7u64 => el!("Timestamp", Uint),
    0xA7u64 => el!("Position", Uint),
    0xABu64 => el!("PrevSize", Uint),
    0xA3u64 => el!("SimpleBlock", Binary),
    0xA0u64 => el!("BlockGroup", Children),
    0xA1u64 => el!("Block", Binary),
    0x9Bu64 => el!("BlockDuration", Uint),
    0xFBu64 => el!("ReferenceBlock", Int),
    0x75A2u64 => el!("DiscardPadding", Int),
    0x5854u64 => el!("SilentTracks", Children),
    0x58D7u64 => el!("SilentTrackNumber", Uint),
    0xA2u64 => el!("BlockVirtual", Binary),
    0x75A1u64 => el!("BlockAdditions", Children),
    0xA6u64 => el!("BlockMore", Children),
    0xA5u64 => el!("BlockAdditional", Binary),
    0xEEu64 => el!("BlockAddID", Uint),
    0xFAu64 => el!("ReferencePriority", Uint),
    0xFDu64 => el!("ReferenceVirtual", Int),
    0xA4u64 => el!("CodecState", Binary),
    0x8Eu64 => el!("Slices", Children),
    0xE8u64 => el!("TimeSlice", Children),
    0xCCu64 => el!("LaceNumber", Uint),
    0xCDu64 => el!("FrameNumber", Uint),
    0xCBu64 => el!("BlockAdditionID", Uint),
    0xCEu64 => el!("Delay", Uint),
    0xCFu64 => el!("SliceDuration", Uint),
    0xC8u64 => el!("ReferenceFrame", Children),
    0xC9u64 => el!("ReferenceOffset", Uint),
    0xCAu64 => el!("ReferenceTimestamp", Uint),
    0xAFu64 => el!("EncryptedBlock", Binary),

    // Tracks
    0x1654AE6Bu64 => el!("Tracks", Children),
    0xAEu64 => el!("TrackEntry", Children),
    0xD7u64 => el!("TrackNumber", Uint),
    0x73C5u64 => el!("TrackUID", Uint),
    0x83u64 => el!("TrackType", Uint),
    0xB9u64 => el!("FlagEnabled", Uint),
    0x88u64 => el!("FlagDefault", Uint),
    0x55AAu64 => el!("FlagForced", Uint),
    0x9Cu64 => el!("FlagLacing", Uint),
    0x23E383u64 => el!("DefaultDuration", Uint),
    0x23314Fu64 => el!("TrackTimestampScale", Float),
    0x536Eu64 => el!("Name", Utf8),
    0x22B59Cu64 => el!("Language", String),
    0x86u64 => el!("CodecID", String),
    0x63A2u64 => el!("CodecPrivate", Binary),
    0x258688u64 => el!("CodecName", Utf8),
    0x56AAu64 => el!("CodecDelay", Uint),
    0x56BBu64 => el!("SeekPreRoll", Uint),
    0x55EEu64 => el!("MaxBlockAdditionID", Uint),
    0x55ABu64 => el!("FlagHearingImpaired", Uint),
    0x55ACu64 => el!("FlagVisualImpaired", Uint),
    0x55ADu64 => el!("FlagTextDescriptions", Uint),
    0x55AEu64 => el!("FlagOriginal", Uint),
    0x55AFu64 => el!("FlagCommentary", Uint),
    0x6DE7u64 => el!("MinCache", Uint),
    0x6DF8u64 => el!("MaxCache", Uint),
    0x537Fu64 => el!("TrackOffset", Int),
    0x41E4u64 => el!("BlockAdditionMapping", Children),
    0x41F0u64 => el!("BlockAddIDValue", Uint),
    0x41A4u64 => el!("BlockAddIDName", String),
    0x41E7u64 => el!("BlockAddIDType", Uint),
    0x41EDu64 => el!("BlockAddIDExtraData", Binary),
    0x22B59Du64 => el!("LanguageBCP47", String),
    0x7446u64 => el!("AttachmentLink", Uint),
    0x3A9697u64 => el!("CodecSettings", Utf8),
    0x3B4040u64 => el!("CodecInfoURL", String),
    0x26B240u64 => el!("CodecDownloadURL", String),
    0xAAu64 => el!("CodecDecodeAll", Uint),
    0x6FABu64 => el!("TrackOverlay", Uint),
    0x6624u64 => el!("TrackTranslate", Children),
    0x66A5u64 => el!("TrackTranslateTrackID", Binary),
    0x66BFu64 => el!("TrackTranslateCodec", Uint),
    0x66FCu64 => el!("TrackTranslateEditionUID", Uint),
    0xC0u64 => el!("TrickTrackUID", Uint),
    0xC1u64 => el!("TrickTrackSegmentUID", Binary),
    0xC6u64 => el!("TrickTrackFlag", Uint),
    0xC7u64 => el!("TrickMasterTrackUID", Uint),
    0xC4u64 => el!("TrickMasterTrackSegmentUID", Binary),

    // Video
    0xE0u64 => el!("Video", Children),
    0x9Au64 => el!("FlagInterlaced", Uint),
    0xB0u64 => el!("PixelWidth", Uint),
    0xBAu64 => el!("PixelHeight", Uint),
    0x54AAu64 => el!("PixelCropBottom", Uint),
    0x54BBu64 => el!("PixelCropTop", Uint),
    0x54CCu64 => el!("PixelCropLeft", Uint),
    0x54DDu64 => el!("PixelCropRight", Uint),
    0x54B0u64 => el!("DisplayWidth", Uint),
    0x54BAu64 => el!("DisplayHeight", Uint),
    0x54B2u64 => el!("DisplayUnit", Uint),
    0x53C0u64 => el!("AlphaMode", Uint),
    0x9Du64 => el!("FieldOrder", Uint),
    0x53B8u64 => el!("StereoMode", Uint),
    0x53B9u64 => el!("OldStereoMode", Uint),
    0x54B3u64 => el!("AspectRatioType", Uint),
    0x2EB524u64 => el!("UncompressedFourCC", Binary),
    0x2FB523u64 => el!("GammaValue", Float),
    0x2383E3u64 => el!("FrameRate", Float),

    // Projection
    0x7670u64 => el!("Projection", Children),
    0x7671u64 => el!("ProjectionType", Uint),
    0x7672u64 => el!("ProjectionPrivate", Binary),
    0x7673u64 => el!("ProjectionPoseYaw", Float),
    0x7674u64 => el!("ProjectionPosePitch", Float),
    0x7675u64 => el!("ProjectionPoseRoll", Float),

    // Colour
    0x55B0u64 => el!("Colour", Children),
    0x55B1u64 => el!("MatrixCoefficients", Uint),
    0x55B2u64 => el!("BitsPerChannel", Uint),
    0x55B3u64 => el!("ChromaSubsamplingHorz", Uint),
    0x55B4u64 => el!("ChromaSubsamplingVert", Uint),
    0x55B5u64 => el!("CbSubsamplingHorz", Uint),
    0x55B6u64 => el!("CbSubsamplingVert", Uint),
    0x55B7u64 => el!("ChromaSitingHorz", Uint),
    0x55B8u64 => el!("ChromaSitingVert", Uint),
    0x55B9u64 => el!("Range", Uint),
    0x55BAu64 => el!("TransferCharacteristics", Uint),
    0x55BBu64 => el!("Primaries", Uint),
    0x55BCu64 => el!("MaxCLL", Uint),
    0x55BDu64 => el!("MaxFALL", Uint),
    0x55D0u64 => el!("MasteringMetadata", Children),
    0x55D1u64 => el!("PrimaryRChromaticityX", Float),
    0x55D2u64 => el!("PrimaryRChromaticityY", Float),
    0x55D3u64 => el!("PrimaryGChromaticityX", Float),
    0x55D4u64 => el!("PrimaryGChromaticityY", Float),
    0x55D5u64 => el!("PrimaryBChromaticityX", Float),
    0x55D6u64 => el!("PrimaryBChromaticityY", Float),
    0x55D7u64 => el!("WhitePointChromaticityX", Float),
    0x55D8u64 => el!("WhitePointChromaticityY", Float),
    0x55D9u64 => el!("LuminanceMax", Float),
    0x55DAu64 => el!("LuminanceMin", Float),

    // Audio
    0xE1u64 => el!("Audio", Children),
    0xB5u64 => el!("SamplingFrequency", Float),
    0x78B5u64 => el!("OutputSamplingFrequency", Float),
    0x9Fu64 => el!("Channels", Uint),
    0x6264u64 => el!("BitDepth", Uint),
    0x52F1u64 => el!("Emphasis", Uint),
    0x7D7Bu64 => el!("ChannelPositions", Binary),

    // Track operations
    0xE2u64 => el!("TrackOperation", Children),
    0xE3u64 => el!("TrackCombinePlanes", Children),
    0xE4u64 => el!("TrackPlane", Children),
    0xE5u64 => el!("TrackPlaneUID", Uint),
    0xE6u64 => el!("TrackPlaneType", Uint),
    0xE9u64 => el!("TrackJoinBlocks", Children),
    0xEDu64 => el!("TrackJoinUID", Uint),

    // Content encoding
    0x6D80u64 => el!("ContentEncodings", Children),
    0x6240u64 => el!("ContentEncoding", Children),
    0x5031u64 => el!("ContentEncodingOrder", Uint),
    0x5032u64 => el!("ContentEncodingScope", Uint),
    0x5033u64 => el!("ContentEncodingType", Uint),
    0x5034u64 => el!("ContentCompression", Children),
    0x4254u64 => el!("ContentCompAlgo", Uint),
    0x4255u64 => el!("ContentCompSettings", Binary),
    0x5035u64 => el!("ContentEncryption", Children),
    0x47E1u64 => el!("ContentEncAlgo", Uint),
    0x47E2u64 => el!("ContentEncKeyID", Binary),
    0x47E7u64 => el!("ContentEncAESSettings", Children),
    0x47E8u64 => el!("AESSettingsCipherMode", Uint),
    0x47E3u64 => el!("ContentSignature", Binary),
    0x47E4u64 => el!("ContentSigKeyID", Binary),
    0x47E5u64 => el!("ContentSigAlgo", Uint),
    0x47E6u64 => el!("ContentSigHashAlgo", Uint),

    // Cueing data
    0x1C53BB6Bu64 => el!("Cues", Children),
    0xBBu64 => el!("CuePoint", Children),
    0xB3u64 => el!("CueTime", Uint),
    0xB7u64 => el!("CueTrackPositions", Children),
    0xF7u64 => el!("CueTrack", Uint),
    0xF1u64 => el!("CueClusterPosition", Uint),
    0xF0u64 => el!("CueRelativePosition", Uint),
    0x5378u64 => el!("CueBlockNumber", Uint),
    0xB2u64 => el!("CueDuration", Uint),
    0xEAu64 => el!("CueCodecState", Uint),
    0xDBu64 => el!("CueReference", Children),
    0x96u64 => el!("CueRefTime", Uint),
    0x97u64 => el!("CueRefCluster", Uint),
    0x535Fu64 => el!("CueRefNumber", Uint),
    0xEBu64 => el!("CueRefCodecState", Uint),

    // Chapters
    0x1043A770u64 => el!("Chapters", Children),
    0x45B9u64 => el!("EditionEntry", Children),
    0xB6u64 => el!("ChapterAtom", Children),
    0x73C4u64 => el!("ChapterUID", Uint),
    0x91u64 => el!("ChapterTimeStart", Uint),
    0x92u64 => el!("ChapterTimeEnd", Uint),
    0x80u64 => el!("ChapterDisplay", Children),
    0x85u64 => el!("ChapString", Utf8),
    0x437Cu64 => el!("ChapLanguage", String),
    0x437Du64 => el!("ChapLanguageBCP47", String),
    0x437Eu64 => el!("ChapCountry", String),
    0x45BCu64 => el!("EditionUID", Uint),
    0x45BDu64 => el!("EditionFlagHidden", Uint),
    0x45DBu64 => el!("EditionFlagDefault", Uint),
    0x45DDu64 => el!("EditionFlagOrdered", Uint),
    0x4520u64 => el!("EditionDisplay", Children),
    0x4521u64 => el!("EditionString", Utf8),
    0x45E4u64 => el!("EditionLanguageIETF", String),
    0x5654u64 => el!("ChapterStringUID", Utf8),
    0x98u64 => el!("ChapterFlagHidden", Uint),
    0x4598u64 => el!("ChapterFlagEnabled", Uint),
    0x6E67u64 => el!("ChapterSegmentUUID", Binary),
    0x4588u64 => el!("ChapterSkipType", Uint),
    0x6EBCu64 => el!("ChapterSegmentEditionUID", Uint),
    0x63C3u64 => el!("ChapterPhysicalEquiv", Uint),
    0x8Fu64 => el!("ChapterTrack", Children),
    0x89u64 => el!("ChapterTrackUID", Uint),
    0x6944u64 => el!("ChapProcess", Children),
    0x6955u64 => el!("ChapProcessCodecID", Uint),
    0x450Du64 => el!("ChapProcessPrivate", Binary),
    0x6911u64 => el!("ChapProcessCommand", Children),
    0x6922u64 => el!("ChapProcessTime", Uint),
    0x6933u64 => el!("ChapProcessData", Binary),

    // Tagging
    0x1254C367u64 => el!("Tags", Children),
    0x7373u64 => el!("Tag", Children),
    0x63C0u64 => el!("Targets", Children),
    0x68CAu64 => el!("TargetTypeValue", Uint),
    0x63C5u64 => el!("TagTrackUID", Uint),
    0x67C8u64 => el!("SimpleTag", Children),
    0x45A3u64 => el!("TagName", Utf8),
    0x4487u64 => el!("TagString", Utf8),
    0x447Au64 => el!("TagLanguage", String),
    0x4484u64 => el!("TagDefault", Uint),
    0x4485u64 => el!("TagBinary", Binary),
    0x63CAu64 => el!("TargetType", String),
    0x63C9u64 => el!("TagEditionUID", Uint),
    0x63C4u64 => el!("TagChapterUID", Uint),
    0x63C6u64 => el!("TagAttachmentUID", Uint),
    0x447Bu64 => el!("TagLanguageBCP47", String),
    0x44B4u64 => el!("TagDefaultBogus", Uint),

    // Attachments
    0x1941A469u64 => el!("Attachments", Children),
    0x61A7u64 => el!("AttachedFile", Children),
    0x467Eu64 => el!("FileDescription", Utf8),
    0x466Eu64 => el!("FileName", Utf8),
    0x4660u64 => el!("FileMediaType", String),
    0x465Cu64 => el!("FileData", Binary),
    0x46AEu64 => el!("FileUID", Uint),
    0x4675u64 => el!("FileReferral", Binary),
    0x4661u64 => el!("FileUsedStartTime", Uint),
    0x4662u64 => el!("FileUsedEndTime", Uint),
};

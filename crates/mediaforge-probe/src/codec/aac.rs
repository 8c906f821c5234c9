//! AAC framing: ADTS headers, AudioSpecificConfig and `esds` descriptors.

use bytes::Bytes;

use crate::bitreader::BitReader;
use crate::error::{ProbeError, Result};

/// Sampling frequencies by sampling_frequency_index (ISO/IEC 14496-3 1.6.3.4)
pub const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// PCM samples per AAC frame
pub const SAMPLES_PER_FRAME: u32 = 1024;

/// Index of `sample_rate` in [`SAMPLING_FREQUENCIES`], if it has one.
pub fn sampling_frequency_index(sample_rate: u32) -> Option<u8> {
    SAMPLING_FREQUENCIES
        .iter()
        .position(|&f| f == sample_rate)
        .map(|i| i as u8)
}

/// Fixed and variable parts of an ADTS header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// Audio object type (profile + 1), 2 = AAC LC
    pub audio_object_type: u8,
    pub sampling_frequency_index: u8,
    pub sample_rate: u32,
    pub channel_configuration: u8,
    /// Frame length including the header
    pub frame_length: usize,
    /// 7, or 9 when a CRC follows the header
    pub header_length: usize,
}

impl AdtsHeader {
    /// Two-byte AudioSpecificConfig equivalent to this header.
    pub fn audio_specific_config(&self) -> Bytes {
        build_audio_specific_config(
            self.audio_object_type,
            self.sampling_frequency_index,
            self.channel_configuration,
        )
    }

    /// `mp4a.40.<object type>`
    pub fn codec_string(&self) -> String {
        get_aac_codec_string(self.audio_object_type)
    }
}

/// Parse the ADTS header at the start of `data`.
pub fn parse_adts_header(data: &[u8]) -> Result<AdtsHeader> {
    if data.len() < 7 {
        return Err(ProbeError::Truncated {
            field: "adts_header",
            bit_offset: data.len() as u64 * 8,
        });
    }

    let mut r = BitReader::new(data);
    if r.read_bits(12, "syncword")? != 0xFFF {
        return Err(ProbeError::invalid("ADTS syncword not found"));
    }
    r.skip_bits(3, "id_layer")?;
    let protection_absent = r.read_flag("protection_absent")?;
    let profile = r.read_bits(2, "profile")? as u8;
    let sampling_frequency_index = r.read_bits(4, "sampling_frequency_index")? as u8;
    r.skip_bits(1, "private_bit")?;
    let channel_configuration = r.read_bits(3, "channel_configuration")? as u8;
    r.skip_bits(4, "originality")?;
    let frame_length = r.read_bits(13, "frame_length")? as usize;

    let sample_rate = *SAMPLING_FREQUENCIES
        .get(sampling_frequency_index as usize)
        .ok_or_else(|| {
            ProbeError::invalid(format!(
                "reserved sampling frequency index {}",
                sampling_frequency_index
            ))
        })?;

    let header_length = if protection_absent { 7 } else { 9 };
    if frame_length < header_length {
        return Err(ProbeError::invalid(format!(
            "ADTS frame length {} shorter than its header",
            frame_length
        )));
    }

    Ok(AdtsHeader {
        audio_object_type: profile + 1,
        sampling_frequency_index,
        sample_rate,
        channel_configuration,
        frame_length,
        header_length,
    })
}

/// One ADTS frame within a PES payload
#[derive(Debug, Clone)]
pub struct AdtsFrame {
    pub header: AdtsHeader,
    /// Raw AAC payload without the ADTS header
    pub payload: Bytes,
}

/// Split a buffer of back-to-back ADTS frames.
///
/// A trailing partial frame is an error: a PES packet always carries whole
/// frames.
pub fn split_adts_frames(data: &Bytes) -> Result<Vec<AdtsFrame>> {
    let mut frames = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let header = parse_adts_header(&data[pos..])?;
        let end = pos + header.frame_length;
        if end > data.len() {
            return Err(ProbeError::invalid(format!(
                "ADTS frame of {} bytes exceeds remaining {}",
                header.frame_length,
                data.len() - pos
            )));
        }
        frames.push(AdtsFrame {
            header,
            payload: data.slice(pos + header.header_length..end),
        });
        pos = end;
    }

    Ok(frames)
}

/// Decoded AudioSpecificConfig (leading fields only)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub audio_object_type: u8,
    pub sample_rate: u32,
    pub channel_configuration: u8,
}

pub fn build_audio_specific_config(
    audio_object_type: u8,
    sampling_frequency_index: u8,
    channel_configuration: u8,
) -> Bytes {
    let bits: u16 = ((audio_object_type as u16 & 0x1F) << 11)
        | ((sampling_frequency_index as u16 & 0x0F) << 7)
        | ((channel_configuration as u16 & 0x0F) << 3);
    Bytes::copy_from_slice(&bits.to_be_bytes())
}

pub fn parse_audio_specific_config(data: &[u8]) -> Result<AudioSpecificConfig> {
    let mut r = BitReader::new(data);

    let mut audio_object_type = r.read_bits(5, "audio_object_type")? as u8;
    if audio_object_type == 31 {
        audio_object_type = 32 + r.read_bits(6, "audio_object_type_ext")? as u8;
    }

    let index = r.read_bits(4, "sampling_frequency_index")?;
    let sample_rate = if index == 0x0F {
        r.read_bits(24, "sampling_frequency")?
    } else {
        *SAMPLING_FREQUENCIES.get(index as usize).ok_or_else(|| {
            ProbeError::invalid(format!("reserved sampling frequency index {}", index))
        })?
    };

    let channel_configuration = r.read_bits(4, "channel_configuration")? as u8;

    Ok(AudioSpecificConfig {
        audio_object_type,
        sample_rate,
        channel_configuration,
    })
}

pub fn get_aac_codec_string(audio_object_type: u8) -> String {
    format!("mp4a.40.{}", audio_object_type)
}

/// Fields of an `esds` ES_Descriptor relevant to track setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsDescriptor {
    /// 0x40 = MPEG-4 audio, 0x69/0x6B = MP3
    pub object_type_indication: u8,
    pub decoder_specific_info: Option<Bytes>,
}

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_DESCRIPTOR_TAG: u8 = 0x04;
const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;

/// Parse an `esds` payload (version/flags included).
pub fn parse_esds(data: &[u8]) -> Result<EsDescriptor> {
    let mut pos = 4; // version + flags

    let (tag, _) = read_descriptor_header(data, &mut pos)?;
    if tag != ES_DESCRIPTOR_TAG {
        return Err(ProbeError::invalid(format!(
            "esds starts with descriptor tag {:#04x}",
            tag
        )));
    }

    let flags = *data
        .get(pos + 2)
        .ok_or_else(|| ProbeError::invalid("esds truncated in ES_Descriptor"))?;
    pos += 3; // ES_ID + flags
    if flags & 0x80 != 0 {
        pos += 2; // dependsOn_ES_ID
    }
    if flags & 0x40 != 0 {
        let url_len = *data
            .get(pos)
            .ok_or_else(|| ProbeError::invalid("esds truncated in URL"))? as usize;
        pos += 1 + url_len;
    }
    if flags & 0x20 != 0 {
        pos += 2; // OCR_ES_Id
    }

    let (tag, _) = read_descriptor_header(data, &mut pos)?;
    if tag != DECODER_CONFIG_DESCRIPTOR_TAG {
        return Err(ProbeError::invalid(format!(
            "expected DecoderConfigDescriptor, found tag {:#04x}",
            tag
        )));
    }
    let object_type_indication = *data
        .get(pos)
        .ok_or_else(|| ProbeError::invalid("esds truncated in DecoderConfigDescriptor"))?;
    pos += 13;

    let mut decoder_specific_info = None;
    if pos < data.len() {
        let (tag, len) = read_descriptor_header(data, &mut pos)?;
        if tag == DECODER_SPECIFIC_INFO_TAG {
            let end = pos + len;
            if end > data.len() {
                return Err(ProbeError::invalid("DecoderSpecificInfo exceeds esds"));
            }
            decoder_specific_info = Some(Bytes::copy_from_slice(&data[pos..end]));
        }
    }

    Ok(EsDescriptor {
        object_type_indication,
        decoder_specific_info,
    })
}

/// Descriptor tag and expandable size (up to four 7-bit groups).
fn read_descriptor_header(data: &[u8], pos: &mut usize) -> Result<(u8, usize)> {
    let tag = *data
        .get(*pos)
        .ok_or_else(|| ProbeError::invalid("esds truncated at descriptor tag"))?;
    *pos += 1;

    let mut len = 0usize;
    for _ in 0..4 {
        let b = *data
            .get(*pos)
            .ok_or_else(|| ProbeError::invalid("esds truncated at descriptor size"))?;
        *pos += 1;
        len = (len << 7) | (b & 0x7F) as usize;
        if b & 0x80 == 0 {
            break;
        }
    }

    Ok((tag, len))
}

//! Decoder configuration from sample descriptions.
//!
//! Extracts what the MPEG-TS muxer needs to rebuild elementary streams:
//! the H.264 parameter sets and NAL length size from `avcC`, and the AAC
//! AudioSpecificConfig from the `esds` descriptor chain.

use super::atoms::BoxType;
use super::boxes::{PayloadReader, SampleDescription};
use crate::{Error, Result};

/// AAC sampling frequencies indexed by `sampling_frequency_index`.
pub const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Codec of a track, with the configuration needed to mux it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codec {
    H264(AvcConfig),
    Aac(AacConfig),
    Mp3,
    /// Anything the muxer cannot carry; holds the sample entry format.
    Other(String),
}

impl Codec {
    /// Short codec name.
    pub fn name(&self) -> &str {
        match self {
            Self::H264(_) => "h264",
            Self::Aac(_) => "aac",
            Self::Mp3 => "mp3",
            Self::Other(format) => format,
        }
    }

    /// Resolve the codec from a track's first sample description.
    pub fn from_description(description: &SampleDescription) -> Result<Self> {
        let format = description.format;
        let config = description.codec_config.as_ref();

        let codec = match (&format.0, config) {
            (b"avc1" | b"avc3", Some((box_type, data))) if *box_type == BoxType(*b"avcC") => {
                Self::H264(AvcConfig::parse(data)?)
            }
            (b"mp4a", Some((box_type, data))) if *box_type == BoxType(*b"esds") => {
                let es = EsDescriptor::parse(data)?;
                match es.object_type {
                    // MPEG-4 audio and the MPEG-2 AAC profiles
                    0x40 | 0x66 | 0x67 | 0x68 => match es.audio_config {
                        Some(config) => Self::Aac(config),
                        None => {
                            return Err(Error::malformed(
                                "esds for AAC has no AudioSpecificConfig",
                            ))
                        }
                    },
                    0x69 | 0x6B => Self::Mp3,
                    other => Self::Other(format!("mp4a/0x{:02x}", other)),
                }
            }
            (b".mp3", _) => Self::Mp3,
            _ => Self::Other(format.as_str().to_string()),
        };
        Ok(codec)
    }
}

/// H.264 decoder configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    pub profile: u8,
    pub compatibility: u8,
    pub level: u8,
    /// Size in bytes of the length prefix before each NAL unit.
    pub nal_length_size: u8,
    pub sps: Vec<Vec<u8>>,
    pub pps: Vec<Vec<u8>>,
}

impl AvcConfig {
    /// Parse an `avcC` payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(data, BoxType(*b"avcC"));
        let version = r.u8()?;
        if version != 1 {
            return Err(Error::malformed(format!(
                "avcC configuration version {}",
                version
            )));
        }
        let profile = r.u8()?;
        let compatibility = r.u8()?;
        let level = r.u8()?;
        let nal_length_size = (r.u8()? & 0x03) + 1;
        if nal_length_size == 3 {
            return Err(Error::malformed("avcC NAL length size of 3 bytes"));
        }

        let sps_count = r.u8()? & 0x1F;
        let mut sps = Vec::with_capacity(sps_count as usize);
        for _ in 0..sps_count {
            let len = r.u16()? as usize;
            sps.push(r.bytes(len)?.to_vec());
        }

        let pps_count = r.u8()?;
        let mut pps = Vec::with_capacity(pps_count as usize);
        for _ in 0..pps_count {
            let len = r.u16()? as usize;
            pps.push(r.bytes(len)?.to_vec());
        }

        Ok(Self {
            profile,
            compatibility,
            level,
            nal_length_size,
            sps,
            pps,
        })
    }
}

/// Fields of an AAC AudioSpecificConfig that an ADTS header carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AacConfig {
    /// Audio object type (2 = AAC LC).
    pub object_type: u8,
    pub frequency_index: u8,
    pub channel_config: u8,
}

impl AacConfig {
    /// Parse an AudioSpecificConfig.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut bits = BitReader::new(data);
        let mut object_type = bits.read(5)? as u8;
        if object_type == 31 {
            object_type = 32 + bits.read(6)? as u8;
        }

        let mut frequency_index = bits.read(4)? as u8;
        if frequency_index == 15 {
            let rate = bits.read(24)?;
            frequency_index = nearest_frequency_index(rate);
        }
        if frequency_index as usize >= AAC_SAMPLE_RATES.len() {
            return Err(Error::malformed(format!(
                "AAC sampling frequency index {}",
                frequency_index
            )));
        }

        let channel_config = bits.read(4)? as u8;

        Ok(Self {
            object_type,
            frequency_index,
            channel_config,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        AAC_SAMPLE_RATES[self.frequency_index as usize]
    }
}

fn nearest_frequency_index(rate: u32) -> u8 {
    AAC_SAMPLE_RATES
        .iter()
        .enumerate()
        .min_by_key(|(_, r)| r.abs_diff(rate))
        .map(|(i, _)| i as u8)
        .unwrap_or(4)
}

/// The parts of an `esds` descriptor chain used for muxing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsDescriptor {
    pub object_type: u8,
    pub avg_bitrate: u32,
    pub audio_config: Option<AacConfig>,
}

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_TAG: u8 = 0x04;
const DECODER_SPECIFIC_TAG: u8 = 0x05;

impl EsDescriptor {
    /// Parse an `esds` payload (full box header included).
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut r = PayloadReader::new(data, BoxType(*b"esds"));
        r.skip(4)?; // version + flags

        let (tag, len) = read_descriptor_header(&mut r)?;
        if tag != ES_DESCRIPTOR_TAG {
            return Err(Error::malformed(format!("esds starts with tag 0x{:02x}", tag)));
        }
        let mut es = PayloadReader::new(r.bytes(len.min(r.remaining()))?, BoxType(*b"esds"));
        es.skip(2)?; // ES_ID
        let flags = es.u8()?;
        if flags & 0x80 != 0 {
            es.skip(2)?; // dependsOn_ES_ID
        }
        if flags & 0x40 != 0 {
            let url_len = es.u8()? as usize;
            es.skip(url_len)?;
        }
        if flags & 0x20 != 0 {
            es.skip(2)?; // OCR_ES_Id
        }

        while es.remaining() >= 2 {
            let (tag, len) = read_descriptor_header(&mut es)?;
            let body = es.bytes(len.min(es.remaining()))?;
            if tag != DECODER_CONFIG_TAG {
                continue;
            }

            let mut dc = PayloadReader::new(body, BoxType(*b"esds"));
            let object_type = dc.u8()?;
            dc.skip(1 + 3 + 4)?; // streamType, bufferSizeDB, maxBitrate
            let avg_bitrate = dc.u32()?;

            let mut audio_config = None;
            while dc.remaining() >= 2 {
                let (tag, len) = read_descriptor_header(&mut dc)?;
                let info = dc.bytes(len.min(dc.remaining()))?;
                if tag == DECODER_SPECIFIC_TAG && !info.is_empty() {
                    audio_config = Some(AacConfig::parse(info)?);
                    break;
                }
            }

            return Ok(Self {
                object_type,
                avg_bitrate,
                audio_config,
            });
        }

        Err(Error::malformed("esds has no DecoderConfigDescriptor"))
    }
}

/// Tag byte plus the 1-4 byte expandable length.
fn read_descriptor_header(r: &mut PayloadReader<'_>) -> Result<(u8, usize)> {
    let tag = r.u8()?;
    let mut len = 0usize;
    for _ in 0..4 {
        let byte = r.u8()?;
        len = (len << 7) | (byte & 0x7F) as usize;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok((tag, len))
}

/// MSB-first bit reader.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read(&mut self, count: usize) -> Result<u32> {
        if self.pos + count > self.data.len() * 8 {
            return Err(Error::malformed("AudioSpecificConfig truncated"));
        }
        let mut value = 0u32;
        for _ in 0..count {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | bit as u32;
            self.pos += 1;
        }
        Ok(value)
    }
}

//! Elementary stream framing for MPEG-TS.
//!
//! MP4 stores H.264 as length-prefixed NAL units with the parameter sets
//! out of band, and AAC as raw frames. A transport stream needs Annex B
//! start codes with in-band SPS/PPS, and ADTS-framed AAC.

use crate::mp4::{AacConfig, Codec};
use crate::{Error, Result};

/// PMT stream type for H.264 video.
pub const STREAM_TYPE_H264: u8 = 0x1B;
/// PMT stream type for ADTS-framed AAC.
pub const STREAM_TYPE_AAC: u8 = 0x0F;
/// PMT stream type for MPEG-1 audio.
pub const STREAM_TYPE_MPEG_AUDIO: u8 = 0x03;

const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
/// Access unit delimiter, primary_pic_type = 7 (any slice type).
const ACCESS_UNIT_DELIMITER: [u8; 6] = [0x00, 0x00, 0x00, 0x01, 0x09, 0xF0];
const NAL_TYPE_AUD: u8 = 9;

const ADTS_HEADER_SIZE: usize = 7;
const ADTS_MAX_FRAME: usize = (1 << 13) - 1;

/// How sample payloads of one track are rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EsFormat {
    /// H.264 to Annex B.
    AnnexB {
        nal_length_size: u8,
        /// SPS and PPS with start codes, emitted before sync samples.
        parameter_sets: Vec<u8>,
    },
    /// AAC frames behind ADTS headers.
    Adts(AacConfig),
    /// Payload is already self-framing.
    Passthrough,
}

impl EsFormat {
    /// Stream type and framing for a codec, or `UnsupportedCodec`.
    pub fn for_codec(codec: &Codec) -> Result<(u8, Self)> {
        match codec {
            Codec::H264(avc) => {
                let mut parameter_sets = Vec::new();
                for nal in avc.sps.iter().chain(avc.pps.iter()) {
                    parameter_sets.extend_from_slice(&START_CODE);
                    parameter_sets.extend_from_slice(nal);
                }
                Ok((
                    STREAM_TYPE_H264,
                    Self::AnnexB {
                        nal_length_size: avc.nal_length_size,
                        parameter_sets,
                    },
                ))
            }
            Codec::Aac(config) => Ok((STREAM_TYPE_AAC, Self::Adts(*config))),
            Codec::Mp3 => Ok((STREAM_TYPE_MPEG_AUDIO, Self::Passthrough)),
            Codec::Other(name) => Err(Error::unsupported(name.clone())),
        }
    }

    /// Append the transport-ready form of one sample to `out`.
    pub fn convert(&self, sample: &[u8], is_sync: bool, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::AnnexB {
                nal_length_size,
                parameter_sets,
            } => {
                out.extend_from_slice(&ACCESS_UNIT_DELIMITER);
                if is_sync {
                    out.extend_from_slice(parameter_sets);
                }
                for nal in nal_units(sample, *nal_length_size as usize)? {
                    if nal.first().map(|b| b & 0x1F) == Some(NAL_TYPE_AUD) {
                        continue;
                    }
                    out.extend_from_slice(&START_CODE);
                    out.extend_from_slice(nal);
                }
                Ok(())
            }
            Self::Adts(config) => {
                out.extend_from_slice(&adts_header(config, sample.len())?);
                out.extend_from_slice(sample);
                Ok(())
            }
            Self::Passthrough => {
                out.extend_from_slice(sample);
                Ok(())
            }
        }
    }
}

/// Split a length-prefixed access unit into NAL units. Empty NAL units are
/// dropped.
fn nal_units(data: &[u8], length_size: usize) -> Result<Vec<&[u8]>> {
    let mut units = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let prefix = data
            .get(pos..pos + length_size)
            .ok_or_else(|| Error::malformed("truncated NAL length prefix"))?;
        let len = prefix.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
        pos += length_size;
        let nal = data
            .get(pos..pos + len)
            .ok_or_else(|| Error::malformed("NAL unit overruns sample"))?;
        if !nal.is_empty() {
            units.push(nal);
        }
        pos += len;
    }
    Ok(units)
}

/// 7-byte ADTS header (no CRC) for a raw frame of `payload_len` bytes.
pub fn adts_header(config: &AacConfig, payload_len: usize) -> Result<[u8; ADTS_HEADER_SIZE]> {
    let frame_len = payload_len + ADTS_HEADER_SIZE;
    if frame_len > ADTS_MAX_FRAME {
        return Err(Error::malformed(format!(
            "AAC frame of {} bytes does not fit ADTS",
            payload_len
        )));
    }
    // ADTS can only signal the four base profiles; SBR/PS streams use LC
    let profile = match config.object_type {
        1..=4 => config.object_type - 1,
        _ => 1,
    };
    let freq = config.frequency_index & 0x0F;
    let channels = config.channel_config & 0x07;

    Ok([
        0xFF,
        // MPEG-4, layer 0, no CRC
        0xF1,
        (profile << 6) | (freq << 2) | (channels >> 2),
        ((channels & 0x03) << 6) | ((frame_len >> 11) as u8 & 0x03),
        (frame_len >> 3) as u8,
        (((frame_len & 0x07) as u8) << 5) | 0x1F,
        0xFC,
    ])
}

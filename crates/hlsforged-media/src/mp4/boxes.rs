//! Typed payloads for the leaf boxes the sample tables are built from.
//!
//! Every decoder reads through [`PayloadReader`], which checks lengths
//! before each read, so a truncated payload surfaces as
//! [`Error::MalformedContainer`] instead of a panic.

use super::atoms::BoxType;
use crate::{Error, Result};
use bytes::Buf;

/// Decoded content of a box.
#[derive(Debug, Clone)]
pub enum BoxPayload {
    /// Box whose children were walked.
    Container,
    /// Box kept only as a byte range.
    Opaque,
    MovieHeader(MovieHeader),
    TrackHeader(TrackHeader),
    MediaHeader(MediaHeader),
    Handler([u8; 4]),
    SampleDescription(SampleDescription),
    TimeToSample(Vec<TimeToSampleEntry>),
    CompositionOffsets(Vec<CompositionOffsetEntry>),
    SampleToChunk(Vec<SampleToChunkEntry>),
    SampleSizes(SampleSizes),
    ChunkOffsets(Vec<u64>),
    SyncSamples(Vec<u32>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MovieHeader {
    pub timescale: u32,
    pub duration: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrackHeader {
    pub track_id: u32,
    pub duration: u64,
    /// Integer part of the 16.16 presentation width.
    pub width: u32,
    /// Integer part of the 16.16 presentation height.
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MediaHeader {
    pub timescale: u32,
    pub duration: u64,
}

/// First entry of an `stsd` box.
#[derive(Debug, Clone)]
pub struct SampleDescription {
    pub entry_count: u32,
    /// Sample entry format, e.g. `avc1` or `mp4a`.
    pub format: BoxType,
    pub visual: Option<VisualEntry>,
    pub audio: Option<AudioEntry>,
    /// Decoder configuration child box (`avcC` or `esds`) and its payload.
    pub codec_config: Option<(BoxType, Vec<u8>)>,
}

#[derive(Debug, Clone, Copy)]
pub struct VisualEntry {
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct AudioEntry {
    pub channels: u16,
    pub sample_size: u16,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeToSampleEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositionOffsetEntry {
    pub sample_count: u32,
    pub offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleToChunkEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

#[derive(Debug, Clone, Default)]
pub struct SampleSizes {
    /// Non-zero when every sample has this size.
    pub uniform_size: u32,
    pub sample_count: u32,
    /// Per-sample sizes when `uniform_size` is zero.
    pub sizes: Vec<u32>,
}

impl SampleSizes {
    /// Expand into one size per sample.
    pub fn expand(&self) -> Vec<u32> {
        if self.uniform_size != 0 {
            vec![self.uniform_size; self.sample_count as usize]
        } else {
            self.sizes.clone()
        }
    }
}

/// Bounds-checked big-endian cursor over a box payload.
pub(crate) struct PayloadReader<'a> {
    buf: &'a [u8],
    box_type: BoxType,
}

impl<'a> PayloadReader<'a> {
    pub(crate) fn new(buf: &'a [u8], box_type: BoxType) -> Self {
        Self { buf, box_type }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(Error::malformed(format!(
                "{} payload truncated: need {} bytes, {} left",
                self.box_type,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    pub(crate) fn fourcc(&mut self) -> Result<[u8; 4]> {
        self.ensure(4)?;
        let mut out = [0u8; 4];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.buf.advance(n);
        Ok(())
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Version byte of a full box; the 24-bit flags are skipped.
    fn full_box_version(&mut self) -> Result<u8> {
        let version = self.u8()?;
        self.skip(3)?;
        Ok(version)
    }

    /// Read an entry count and check the table fits in what is left.
    fn entry_count(&mut self, entry_size: usize) -> Result<usize> {
        let count = self.u32()? as usize;
        let needed = count.checked_mul(entry_size).ok_or_else(|| {
            Error::malformed(format!("{} entry count {} overflows", self.box_type, count))
        })?;
        if needed > self.remaining() {
            return Err(Error::malformed(format!(
                "{} declares {} entries but only {} bytes remain",
                self.box_type,
                count,
                self.remaining()
            )));
        }
        Ok(count)
    }
}

/// Decode the payload of a leaf box.
pub(crate) fn decode(box_type: BoxType, data: &[u8]) -> Result<BoxPayload> {
    let mut r = PayloadReader::new(data, box_type);
    let payload = match box_type {
        BoxType::MVHD => BoxPayload::MovieHeader(parse_mvhd(&mut r)?),
        BoxType::TKHD => BoxPayload::TrackHeader(parse_tkhd(&mut r)?),
        BoxType::MDHD => BoxPayload::MediaHeader(parse_mdhd(&mut r)?),
        BoxType::HDLR => {
            r.full_box_version()?;
            r.skip(4)?; // pre_defined
            BoxPayload::Handler(r.fourcc()?)
        }
        BoxType::STSD => BoxPayload::SampleDescription(parse_stsd(&mut r)?),
        BoxType::STTS => {
            r.full_box_version()?;
            let count = r.entry_count(8)?;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                entries.push(TimeToSampleEntry {
                    sample_count: r.u32()?,
                    sample_delta: r.u32()?,
                });
            }
            BoxPayload::TimeToSample(entries)
        }
        BoxType::CTTS => {
            let version = r.full_box_version()?;
            let count = r.entry_count(8)?;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                let sample_count = r.u32()?;
                // Version 0 offsets are unsigned, but writers routinely store
                // negative values there too.
                let offset = if version == 0 {
                    r.u32()? as i32
                } else {
                    r.i32()?
                };
                entries.push(CompositionOffsetEntry {
                    sample_count,
                    offset,
                });
            }
            BoxPayload::CompositionOffsets(entries)
        }
        BoxType::STSC => {
            r.full_box_version()?;
            let count = r.entry_count(12)?;
            let mut entries = Vec::with_capacity(count);
            for _ in 0..count {
                entries.push(SampleToChunkEntry {
                    first_chunk: r.u32()?,
                    samples_per_chunk: r.u32()?,
                    sample_description_index: r.u32()?,
                });
            }
            BoxPayload::SampleToChunk(entries)
        }
        BoxType::STSZ => {
            r.full_box_version()?;
            let uniform_size = r.u32()?;
            let sample_count = r.u32()?;
            let mut sizes = Vec::new();
            if uniform_size == 0 {
                if (sample_count as usize).saturating_mul(4) > r.remaining() {
                    return Err(Error::malformed(format!(
                        "stsz declares {} samples but only {} bytes remain",
                        sample_count,
                        r.remaining()
                    )));
                }
                sizes.reserve(sample_count as usize);
                for _ in 0..sample_count {
                    sizes.push(r.u32()?);
                }
            }
            BoxPayload::SampleSizes(SampleSizes {
                uniform_size,
                sample_count,
                sizes,
            })
        }
        BoxType::STCO => {
            r.full_box_version()?;
            let count = r.entry_count(4)?;
            let mut offsets = Vec::with_capacity(count);
            for _ in 0..count {
                offsets.push(r.u32()? as u64);
            }
            BoxPayload::ChunkOffsets(offsets)
        }
        BoxType::CO64 => {
            r.full_box_version()?;
            let count = r.entry_count(8)?;
            let mut offsets = Vec::with_capacity(count);
            for _ in 0..count {
                offsets.push(r.u64()?);
            }
            BoxPayload::ChunkOffsets(offsets)
        }
        BoxType::STSS => {
            r.full_box_version()?;
            let count = r.entry_count(4)?;
            let mut samples = Vec::with_capacity(count);
            for _ in 0..count {
                samples.push(r.u32()?);
            }
            BoxPayload::SyncSamples(samples)
        }
        _ => BoxPayload::Opaque,
    };
    Ok(payload)
}

fn parse_mvhd(r: &mut PayloadReader<'_>) -> Result<MovieHeader> {
    let version = r.full_box_version()?;
    if version == 1 {
        r.skip(16)?;
        Ok(MovieHeader {
            timescale: r.u32()?,
            duration: r.u64()?,
        })
    } else {
        r.skip(8)?;
        Ok(MovieHeader {
            timescale: r.u32()?,
            duration: r.u32()? as u64,
        })
    }
}

fn parse_tkhd(r: &mut PayloadReader<'_>) -> Result<TrackHeader> {
    let version = r.full_box_version()?;
    let (track_id, duration) = if version == 1 {
        r.skip(16)?;
        let track_id = r.u32()?;
        r.skip(4)?;
        (track_id, r.u64()?)
    } else {
        r.skip(8)?;
        let track_id = r.u32()?;
        r.skip(4)?;
        (track_id, r.u32()? as u64)
    };

    // reserved(8) layer(2) alternate_group(2) volume(2) reserved(2) matrix(36)
    let (width, height) = if r.remaining() >= 60 {
        r.skip(52)?;
        (r.u32()? >> 16, r.u32()? >> 16)
    } else {
        (0, 0)
    };

    Ok(TrackHeader {
        track_id,
        duration,
        width,
        height,
    })
}

fn parse_mdhd(r: &mut PayloadReader<'_>) -> Result<MediaHeader> {
    let version = r.full_box_version()?;
    if version == 1 {
        r.skip(16)?;
        Ok(MediaHeader {
            timescale: r.u32()?,
            duration: r.u64()?,
        })
    } else {
        r.skip(8)?;
        Ok(MediaHeader {
            timescale: r.u32()?,
            duration: r.u32()? as u64,
        })
    }
}

/// Size of the fixed visual sample entry fields after the box header.
const VISUAL_ENTRY_FIELDS: usize = 78;

fn parse_stsd(r: &mut PayloadReader<'_>) -> Result<SampleDescription> {
    r.full_box_version()?;
    let entry_count = r.u32()?;
    if entry_count == 0 {
        return Err(Error::malformed("stsd has no sample entries"));
    }

    let entry_size = r.u32()? as usize;
    let format = BoxType::from_bytes(r.fourcc()?);
    if entry_size < 8 {
        return Err(Error::malformed(format!(
            "sample entry {} has invalid size {}",
            format, entry_size
        )));
    }
    let body = r.bytes(entry_size - 8)?;
    let mut entry = PayloadReader::new(body, format);

    let mut description = SampleDescription {
        entry_count,
        format,
        visual: None,
        audio: None,
        codec_config: None,
    };

    match &format.0 {
        b"avc1" | b"avc3" | b"hvc1" | b"hev1" | b"mp4v" => {
            entry.skip(24)?;
            let width = entry.u16()?;
            let height = entry.u16()?;
            entry.skip(VISUAL_ENTRY_FIELDS - 28)?;
            description.visual = Some(VisualEntry { width, height });
        }
        b"mp4a" | b".mp3" | b"ac-3" | b"ec-3" => {
            entry.skip(8)?;
            let version = entry.u16()?;
            entry.skip(6)?;
            let channels = entry.u16()?;
            let sample_size = entry.u16()?;
            entry.skip(4)?;
            let sample_rate = entry.u32()? >> 16;
            // QuickTime sound description extensions
            match version {
                1 => entry.skip(16)?,
                2 => entry.skip(36)?,
                _ => {}
            }
            description.audio = Some(AudioEntry {
                channels,
                sample_size,
                sample_rate,
            });
        }
        _ => return Ok(description),
    }

    description.codec_config = find_codec_config(&mut entry)?;
    Ok(description)
}

/// Scan the child boxes of a sample entry for decoder configuration.
fn find_codec_config(r: &mut PayloadReader<'_>) -> Result<Option<(BoxType, Vec<u8>)>> {
    while r.remaining() >= 8 {
        let size = r.u32()? as usize;
        let box_type = BoxType::from_bytes(r.fourcc()?);
        if size < 8 || size - 8 > r.remaining() {
            // Trailing garbage after the sample entry is common; stop here.
            break;
        }
        let body = r.bytes(size - 8)?;
        match &box_type.0 {
            b"avcC" | b"hvcC" | b"esds" => return Ok(Some((box_type, body.to_vec()))),
            b"wave" => {
                let mut inner = PayloadReader::new(body, box_type);
                if let Some(found) = find_codec_config(&mut inner)? {
                    return Ok(Some(found));
                }
            }
            _ => {}
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn test_stts_decode() {
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        buf.put_u32(2);
        buf.put_u32(10);
        buf.put_u32(1000);
        buf.put_u32(1);
        buf.put_u32(500);

        let payload = decode(BoxType::STTS, &buf).unwrap();
        assert_matches!(payload, BoxPayload::TimeToSample(entries) => {
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0], TimeToSampleEntry { sample_count: 10, sample_delta: 1000 });
            assert_eq!(entries[1].sample_delta, 500);
        });
    }

    #[test]
    fn test_entry_count_exceeding_payload_is_malformed() {
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        buf.put_u32(1_000_000);
        buf.put_u32(1);
        buf.put_u32(1);

        let err = decode(BoxType::STTS, &buf).unwrap_err();
        assert_matches!(err, Error::MalformedContainer(_));
    }

    #[test]
    fn test_truncated_header_is_malformed() {
        let err = decode(BoxType::MDHD, &[0, 0, 0, 0, 1, 2]).unwrap_err();
        assert_matches!(err, Error::MalformedContainer(msg) if msg.contains("mdhd"));
    }

    #[test]
    fn test_ctts_negative_offsets() {
        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_slice(&[0, 0, 0]);
        buf.put_u32(1);
        buf.put_u32(3);
        buf.put_i32(-1024);

        let payload = decode(BoxType::CTTS, &buf).unwrap();
        assert_matches!(payload, BoxPayload::CompositionOffsets(entries) => {
            assert_eq!(entries[0].offset, -1024);
            assert_eq!(entries[0].sample_count, 3);
        });
    }

    #[test]
    fn test_uniform_stsz_expands() {
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        buf.put_u32(512);
        buf.put_u32(3);

        let payload = decode(BoxType::STSZ, &buf).unwrap();
        assert_matches!(payload, BoxPayload::SampleSizes(sizes) => {
            assert_eq!(sizes.expand(), vec![512, 512, 512]);
        });
    }

    #[test]
    fn test_co64_decode() {
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        buf.put_u32(1);
        buf.put_u64(0x1_0000_0000);

        let payload = decode(BoxType::CO64, &buf).unwrap();
        assert_matches!(payload, BoxPayload::ChunkOffsets(offsets) => {
            assert_eq!(offsets, vec![0x1_0000_0000]);
        });
    }

    #[test]
    fn test_empty_stsd_is_malformed() {
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        buf.put_u32(0);
        assert_matches!(
            decode(BoxType::STSD, &buf),
            Err(Error::MalformedContainer(_))
        );
    }
}

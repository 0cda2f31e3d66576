//! MPEG-TS multiplexer.
//!
//! Writes one self-contained segment: PAT, PMT, then one PES unit per
//! sample, interleaved across tracks by decode time. Timestamps are the
//! samples' absolute decode/presentation times on the 90 kHz clock plus a
//! fixed delay, so consecutive segments continue each other's timeline and
//! a segment's bytes depend only on its plan.

use super::es::EsFormat;
use super::packet::{AdaptationFlags, PacketWriter, FIRST_ES_PID, PAT_PID, PMT_PID};
use super::pes::{build_pes, TIMESTAMP_MASK};
use super::psi::{pat_section, pmt_section, PmtStream};
use crate::bucket::OutputChain;
use crate::mp4::{Container, Track};
use crate::select::SegmentPlan;
use crate::time::{self, CLOCK_90KHZ};
use crate::{Error, Result};
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;

/// Offset added to every PTS/DTS so presentation never precedes the PCR.
pub const PRESENTATION_DELAY: u64 = 63_000;

const VIDEO_STREAM_ID: u8 = 0xE0;
const AUDIO_STREAM_ID: u8 = 0xC0;
/// PES stream ids 0xE0..=0xEF.
const MAX_VIDEO_STREAMS: u8 = 16;
/// PES stream ids 0xC0..=0xDF.
const MAX_AUDIO_STREAMS: u8 = 32;

/// Counters from one mux run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxStats {
    pub packets: usize,
    /// PES units written, one per sample.
    pub samples: usize,
    /// Sample payload bytes read from the source.
    pub source_bytes: u64,
}

/// One elementary stream of the output.
#[derive(Debug)]
struct Stream<'a> {
    track: &'a Track,
    samples: Range<usize>,
    pid: u16,
    stream_id: u8,
    stream_type: u8,
    format: EsFormat,
}

impl Stream<'_> {
    fn next_dts(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let dts = self.track.samples.decode_time(self.samples.start);
        Some(time::rescale(dts, self.track.timescale, CLOCK_90KHZ))
    }
}

/// Multiplexer for one segment plan.
#[derive(Debug)]
pub struct TsMuxer<'a> {
    file_size: u64,
    streams: Vec<Stream<'a>>,
    pcr_pid: u16,
}

impl<'a> TsMuxer<'a> {
    /// Set up streams for every track in `plan`.
    ///
    /// Fails with `UnsupportedCodec` when a selected track cannot be carried.
    pub fn new(container: &'a Container, plan: &SegmentPlan) -> Result<Self> {
        let mut streams = Vec::with_capacity(plan.tracks.len());
        let mut video_count = 0u8;
        let mut audio_count = 0u8;
        let mut pcr_pid = None;

        for (i, selection) in plan.tracks.iter().enumerate() {
            let track = container
                .track(selection.track_id)
                .ok_or(Error::TrackNotFound(selection.track_id))?;
            let (stream_type, format) = EsFormat::for_codec(&track.codec)?;

            let stream_id = if track.is_video() {
                if video_count == MAX_VIDEO_STREAMS {
                    return Err(Error::unsupported(format!(
                        "more than {} video streams in one program",
                        MAX_VIDEO_STREAMS
                    )));
                }
                video_count += 1;
                VIDEO_STREAM_ID + (video_count - 1)
            } else {
                if audio_count == MAX_AUDIO_STREAMS {
                    return Err(Error::unsupported(format!(
                        "more than {} audio streams in one program",
                        MAX_AUDIO_STREAMS
                    )));
                }
                audio_count += 1;
                AUDIO_STREAM_ID + (audio_count - 1)
            };
            let pid = FIRST_ES_PID + i as u16;
            if selection.track_id == plan.anchor_track_id {
                pcr_pid = Some(pid);
            }

            streams.push(Stream {
                track,
                samples: selection.samples.clone(),
                pid,
                stream_id,
                stream_type,
                format,
            });
        }

        if streams.is_empty() {
            return Err(Error::EmptySelection);
        }

        Ok(Self {
            file_size: container.file_size,
            pcr_pid: pcr_pid.unwrap_or(FIRST_ES_PID),
            streams,
        })
    }

    /// PID carrying the program clock.
    pub fn pcr_pid(&self) -> u16 {
        self.pcr_pid
    }

    /// PMT entries in PID order.
    pub fn pmt_streams(&self) -> Vec<PmtStream> {
        self.streams
            .iter()
            .map(|s| PmtStream {
                stream_type: s.stream_type,
                pid: s.pid,
            })
            .collect()
    }

    /// Read the selected samples from `source` and write the segment.
    pub fn write<R: Read + Seek>(mut self, source: &mut R, out: &mut OutputChain) -> Result<MuxStats> {
        let mut writer = PacketWriter::new();
        writer.write_section(out, PAT_PID, &pat_section(PMT_PID))?;
        writer.write_section(out, PMT_PID, &pmt_section(self.pcr_pid, &self.pmt_streams()))?;

        let mut stats = MuxStats::default();
        let mut data = Vec::new();
        let mut payload = Vec::new();

        while let Some(pos) = self.next_stream() {
            let stream = &mut self.streams[pos];
            let index = stream.samples.start;
            stream.samples.start += 1;

            let Some(sample) = stream.track.samples.get(index) else {
                continue;
            };

            let end = sample.offset.checked_add(sample.size as u64);
            if end.map_or(true, |end| end > self.file_size) {
                return Err(Error::source_read(format!(
                    "track {} sample {} at offset {} size {} runs past end of source ({} bytes)",
                    stream.track.track_id, index, sample.offset, sample.size, self.file_size
                )));
            }
            data.resize(sample.size as usize, 0);
            source.seek(SeekFrom::Start(sample.offset))?;
            source.read_exact(&mut data)?;

            payload.clear();
            stream.format.convert(&data, sample.is_keyframe, &mut payload)?;

            let timescale = stream.track.timescale;
            let dts = time::rescale(sample.dts, timescale, CLOCK_90KHZ);
            let pts = time::rescale(sample.pts(), timescale, CLOCK_90KHZ).max(dts);
            let is_video = stream.track.is_video();

            let pes = build_pes(
                stream.stream_id,
                (pts + PRESENTATION_DELAY) & TIMESTAMP_MASK,
                Some((dts + PRESENTATION_DELAY) & TIMESTAMP_MASK),
                &payload,
                !is_video,
            );

            let is_pcr = stream.pid == self.pcr_pid;
            let adaptation = (is_video || is_pcr).then(|| AdaptationFlags {
                random_access: is_video && sample.is_keyframe,
                pcr: is_pcr.then_some(dts & TIMESTAMP_MASK),
            });
            writer.write_pes(out, stream.pid, &pes, adaptation)?;

            stats.samples += 1;
            stats.source_bytes += sample.size as u64;
        }

        stats.packets = writer.packets();
        tracing::debug!(
            packets = stats.packets,
            samples = stats.samples,
            source_bytes = stats.source_bytes,
            "Muxed transport stream"
        );
        Ok(stats)
    }

    /// Stream holding the earliest pending sample; video first on ties.
    fn next_stream(&self) -> Option<usize> {
        self.streams
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.next_dts().map(|dts| ((dts, !s.track.is_video(), i), i)))
            .min_by_key(|(key, _)| *key)
            .map(|(_, i)| i)
    }
}

/// Mux `plan` into `out`.
///
/// The chain is consumed and only handed back on success, so a failed mux
/// never leaks a partial segment.
pub fn mux<R: Read + Seek>(
    container: &Container,
    plan: &SegmentPlan,
    source: &mut R,
    mut out: OutputChain,
) -> Result<OutputChain> {
    TsMuxer::new(container, plan)?.write(source, &mut out)?;
    Ok(out)
}

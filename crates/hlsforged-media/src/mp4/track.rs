//! Track resolution from a `trak` subtree.

use super::atoms::{BoxTree, BoxType, HandlerType};
use super::boxes::BoxPayload;
use super::codec::Codec;
use super::sample_table::{SampleTable, SampleTableBuilder};
use crate::time;
use crate::{Error, Result};

/// One track of the container with its expanded sample table.
#[derive(Debug, Clone)]
pub struct Track {
    /// Track ID from tkhd.
    pub track_id: u32,
    /// Handler type (video, audio, etc.).
    pub handler_type: HandlerType,
    /// Media timescale (time units per second).
    pub timescale: u32,
    /// Codec and decoder configuration.
    pub codec: Codec,
    /// Video width (if video track).
    pub width: u32,
    /// Video height (if video track).
    pub height: u32,
    /// Audio sample rate (if audio track).
    pub sample_rate: u32,
    /// Audio channel count (if audio track).
    pub channels: u16,
    /// Expanded sample table.
    pub samples: SampleTable,
}

impl Track {
    /// Build a track from the `trak` box at `trak` in `tree`, read from a
    /// source of `file_size` bytes.
    pub fn resolve(tree: &BoxTree, trak: usize, file_size: u64) -> Result<Self> {
        let tkhd = tree
            .find_child(trak, BoxType::TKHD)
            .and_then(|i| match &tree.get(i)?.payload {
                BoxPayload::TrackHeader(h) => Some(*h),
                _ => None,
            })
            .ok_or_else(|| Error::malformed("trak without tkhd"))?;

        let mdia = tree
            .find_child(trak, BoxType::MDIA)
            .ok_or_else(|| Error::malformed(format!("track {} has no mdia", tkhd.track_id)))?;

        let mdhd = tree
            .find_child(mdia, BoxType::MDHD)
            .and_then(|i| match &tree.get(i)?.payload {
                BoxPayload::MediaHeader(h) => Some(*h),
                _ => None,
            })
            .ok_or_else(|| Error::malformed(format!("track {} has no mdhd", tkhd.track_id)))?;
        if mdhd.timescale == 0 {
            return Err(Error::malformed(format!(
                "track {} has a zero timescale",
                tkhd.track_id
            )));
        }

        let handler_type = tree
            .find_child(mdia, BoxType::HDLR)
            .and_then(|i| match &tree.get(i)?.payload {
                BoxPayload::Handler(code) => Some(HandlerType::from_bytes(*code)),
                _ => None,
            })
            .ok_or_else(|| Error::malformed(format!("track {} has no hdlr", tkhd.track_id)))?;

        let stbl = tree
            .find_path(mdia, &[BoxType::MINF, BoxType::STBL])
            .ok_or_else(|| Error::malformed(format!("track {} has no stbl", tkhd.track_id)))?;

        let mut builder = SampleTableBuilder::new();
        builder.set_source_size(file_size);
        let mut description = None;

        for &child in tree.children(stbl) {
            let Some(node) = tree.get(child) else {
                continue;
            };
            match &node.payload {
                BoxPayload::SampleDescription(d) => description = Some(d.clone()),
                BoxPayload::TimeToSample(entries) => builder.set_stts(entries.clone()),
                BoxPayload::CompositionOffsets(entries) => builder.set_ctts(entries.clone()),
                BoxPayload::SampleToChunk(entries) => builder.set_stsc(entries.clone()),
                BoxPayload::SampleSizes(sizes) => builder.set_stsz(sizes.clone()),
                BoxPayload::ChunkOffsets(offsets) => builder.set_chunk_offsets(offsets.clone()),
                BoxPayload::SyncSamples(samples) => builder.set_sync_samples(samples.clone()),
                _ => {}
            }
        }

        let description = description
            .ok_or_else(|| Error::malformed(format!("track {} has no stsd", tkhd.track_id)))?;
        let codec = Codec::from_description(&description)?;
        let samples = builder.build().map_err(|e| match e {
            Error::MalformedContainer(msg) => {
                Error::malformed(format!("track {}: {}", tkhd.track_id, msg))
            }
            other => other,
        })?;

        let (width, height) = match description.visual {
            Some(v) => (v.width as u32, v.height as u32),
            None => (tkhd.width, tkhd.height),
        };
        let (sample_rate, channels) = match (&codec, description.audio) {
            (Codec::Aac(aac), Some(a)) => (aac.sample_rate(), a.channels),
            (_, Some(a)) => (a.sample_rate, a.channels),
            _ => (0, 0),
        };

        Ok(Self {
            track_id: tkhd.track_id,
            handler_type,
            timescale: mdhd.timescale,
            codec,
            width,
            height,
            sample_rate,
            channels,
            samples,
        })
    }

    pub fn is_video(&self) -> bool {
        self.handler_type.is_video()
    }

    pub fn is_audio(&self) -> bool {
        self.handler_type.is_audio()
    }

    /// Duration in track timescale units (sum of sample durations).
    pub fn duration(&self) -> u64 {
        self.samples.total_duration()
    }

    /// Get duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        time::ticks_to_secs(self.duration(), self.timescale)
    }

    /// Average bitrate over the whole track, in bits per second.
    pub fn average_bitrate(&self) -> u64 {
        let duration = self.duration();
        if duration == 0 {
            return 0;
        }
        let bits = self.samples.total_bytes() as u128 * 8 * self.timescale as u128;
        (bits / duration as u128) as u64
    }
}

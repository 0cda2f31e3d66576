//! MP4 container parsing.
//!
//! This module reads the box tree of a progressive MP4 file and resolves
//! each track's sample tables into flat per-sample arrays. Sample payloads
//! are never loaded here; the muxer reads them from the source on demand.

mod atoms;
mod boxes;
mod builder;
mod codec;
mod reader;
mod sample_table;
mod track;

pub use atoms::{BoxHeader, BoxNode, BoxTree, BoxType, HandlerType};
pub use boxes::{
    AudioEntry, BoxPayload, CompositionOffsetEntry, MediaHeader, MovieHeader, SampleDescription,
    SampleSizes, SampleToChunkEntry, TimeToSampleEntry, TrackHeader, VisualEntry,
};
pub use builder::{Mp4Builder, SampleSpec, TrackSpec};
pub use codec::{AacConfig, AvcConfig, Codec, EsDescriptor, AAC_SAMPLE_RATES};
pub use reader::{Mp4Reader, MAX_DEPTH};
pub use sample_table::{SampleEntry, SampleTable, SampleTableBuilder};
pub use track::Track;

use crate::time;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// Parsed MP4 file: its box tree and every usable track.
#[derive(Debug, Clone)]
pub struct Container {
    /// Movie timescale (time units per second).
    pub timescale: u32,
    /// Movie duration in timescale units.
    pub duration: u64,
    /// Size of the source in bytes.
    pub file_size: u64,
    /// Whether the file has faststart (moov before mdat).
    pub has_faststart: bool,
    /// Tracks in file order.
    pub tracks: Vec<Track>,
    tree: BoxTree,
}

impl Container {
    /// Parse an MP4 file from the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file))
    }

    /// Parse an MP4 file from a reader.
    pub fn parse<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut reader = Mp4Reader::new(reader)?;
        let tree = reader.read_tree()?;
        Self::from_tree(tree, reader.file_size())
    }

    /// Resolve tracks from an already-read box tree.
    ///
    /// Tracks whose tables are missing or inconsistent are skipped with a
    /// warning; the container is only rejected when none is usable.
    pub fn from_tree(tree: BoxTree, file_size: u64) -> Result<Self> {
        let moov = tree
            .find_root(BoxType::MOOV)
            .ok_or_else(|| Error::malformed("no moov box"))?;

        let mvhd = tree
            .find_child(moov, BoxType::MVHD)
            .and_then(|i| match &tree.get(i)?.payload {
                BoxPayload::MovieHeader(h) => Some(*h),
                _ => None,
            })
            .ok_or_else(|| Error::malformed("moov without mvhd"))?;

        let mut tracks: Vec<Track> = Vec::new();
        for trak in tree.children_of_type(moov, BoxType::TRAK) {
            match Track::resolve(&tree, trak, file_size) {
                Ok(track) if tracks.iter().any(|t| t.track_id == track.track_id) => {
                    tracing::warn!(track_id = track.track_id, "Skipping duplicate track id");
                }
                Ok(track) => {
                    tracing::debug!(
                        track_id = track.track_id,
                        handler = track.handler_type.as_str(),
                        codec = track.codec.name(),
                        samples = track.samples.len(),
                        "Resolved track"
                    );
                    tracks.push(track);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unusable track");
                }
            }
        }

        if tracks.is_empty() {
            return Err(Error::malformed("no usable tracks"));
        }

        let moov_offset = tree.get(moov).map(|n| n.offset).unwrap_or(0);
        let has_faststart = match tree.find_root(BoxType::MDAT).and_then(|i| tree.get(i)) {
            Some(mdat) => moov_offset < mdat.offset,
            None => true,
        };

        Ok(Self {
            timescale: mvhd.timescale,
            duration: mvhd.duration,
            file_size,
            has_faststart,
            tracks,
            tree,
        })
    }

    /// The box tree the tracks were resolved from.
    pub fn tree(&self) -> &BoxTree {
        &self.tree
    }

    /// Look up a track by id.
    pub fn track(&self, track_id: u32) -> Option<&Track> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    /// First video track, if any.
    pub fn video_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.is_video())
    }

    /// First audio track, if any.
    pub fn audio_track(&self) -> Option<&Track> {
        self.tracks.iter().find(|t| t.is_audio())
    }

    /// Get the duration in seconds.
    ///
    /// Uses the longest track when the movie header carries no duration.
    pub fn duration_secs(&self) -> f64 {
        if self.duration > 0 && self.timescale > 0 {
            return time::ticks_to_secs(self.duration, self.timescale);
        }
        self.tracks
            .iter()
            .map(|t| t.duration_secs())
            .fold(0.0, f64::max)
    }

    /// Calculate the maximum keyframe interval of the first video track.
    ///
    /// Returns `None` if there is no video track or fewer than 2 keyframes.
    pub fn max_keyframe_interval_secs(&self) -> Option<f64> {
        let video = self.video_track()?;
        let samples = &video.samples;
        samples
            .sync_indices()
            .windows(2)
            .map(|w| samples.decode_time(w[1]) - samples.decode_time(w[0]))
            .max()
            .map(|ticks| time::ticks_to_secs(ticks, video.timescale))
    }

    /// Per-track description for probing.
    pub fn summary(&self) -> Vec<TrackSummary> {
        self.tracks
            .iter()
            .map(|t| TrackSummary {
                track_id: t.track_id,
                kind: t.handler_type.as_str().to_string(),
                codec: t.codec.name().to_string(),
                timescale: t.timescale,
                duration_secs: t.duration_secs(),
                sample_count: t.samples.len(),
                sync_sample_count: t.samples.sync_indices().len(),
                bitrate: t.average_bitrate(),
                width: t.width,
                height: t.height,
                sample_rate: t.sample_rate,
                channels: t.channels,
            })
            .collect()
    }
}

/// Flattened track description.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct TrackSummary {
    pub track_id: u32,
    pub kind: String,
    pub codec: String,
    pub timescale: u32,
    pub duration_secs: f64,
    pub sample_count: usize,
    pub sync_sample_count: usize,
    /// Average bitrate in bits per second.
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

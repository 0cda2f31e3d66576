//! Segment selection.
//!
//! Turns [`SplitOptions`] into per-track sample ranges. One track is the
//! anchor: the first selected video track, or the first selected track when
//! there is no video. The anchor seeks to the sync sample at or before the
//! requested start (the first sync sample after it when none precedes it,
//! which drifts forward). Every other track starts at the anchor's start
//! rescaled to its own timescale, so all streams begin within one sample of
//! each other.
//!
//! Ends are handled the same way: the anchor stops before the first sample
//! at or after the requested end, and the other tracks stop at that
//! sample's time. Two requests whose ranges meet at a sync sample therefore
//! split every track at the same sample.

use crate::mp4::{Container, Track};
use crate::split::SplitOptions;
use crate::time;
use crate::{Error, Result};
use std::ops::Range;
use std::time::Duration;

/// Samples chosen from one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSelection {
    pub track_id: u32,
    /// Sample indices to emit, in decode order.
    pub samples: Range<usize>,
}

/// Output of the selector: what to mux, track by track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPlan {
    /// Selected tracks, in container order.
    pub tracks: Vec<TrackSelection>,
    /// Track whose sync samples define the boundaries.
    pub anchor_track_id: u32,
    /// Decode time of the anchor's first sample.
    pub start: Duration,
    /// Decode time one past the anchor's last sample.
    pub end: Duration,
}

impl SegmentPlan {
    /// Total number of samples across all tracks.
    pub fn sample_count(&self) -> usize {
        self.tracks.iter().map(|t| t.samples.len()).sum()
    }

    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// Select the samples a request covers.
pub fn select(container: &Container, options: &SplitOptions) -> Result<SegmentPlan> {
    let tracks = choose_tracks(container, options)?;
    let anchor = anchor_track(&tracks).ok_or(Error::EmptySelection)?;
    let anchor_samples = &anchor.samples;

    let start_ticks = options
        .start
        .map(|start| time::duration_to_ticks(start, anchor.timescale))
        .unwrap_or(0);
    if start_ticks >= anchor_samples.total_duration() {
        return Err(Error::EmptySelection);
    }
    let first = anchor_samples
        .sync_at_or_before(start_ticks)
        .or_else(|| anchor_samples.sync_at_or_after(start_ticks))
        .ok_or(Error::EmptySelection)?;

    let last = match options.end {
        Some(end) => anchor_samples.first_at_or_after(time::duration_to_ticks(end, anchor.timescale)),
        None => anchor_samples.len(),
    };
    if first >= last {
        return Err(Error::EmptySelection);
    }

    let anchor_start = anchor_samples.decode_time(first);
    let anchor_end = anchor_samples.decode_time(last);

    let selections: Vec<TrackSelection> = tracks
        .iter()
        .map(|track| {
            let samples = if track.track_id == anchor.track_id {
                first..last
            } else {
                let from = time::rescale(anchor_start, anchor.timescale, track.timescale);
                let begin = follower_boundary(track, from);
                let finish = if options.end.is_some() {
                    let to = time::rescale(anchor_end, anchor.timescale, track.timescale);
                    follower_boundary(track, to)
                } else {
                    track.samples.len()
                };
                begin..finish.max(begin)
            };
            TrackSelection {
                track_id: track.track_id,
                samples,
            }
        })
        .collect();

    let plan = SegmentPlan {
        tracks: selections,
        anchor_track_id: anchor.track_id,
        start: time::ticks_to_duration(anchor_start, anchor.timescale),
        end: time::ticks_to_duration(anchor_end, anchor.timescale),
    };

    tracing::debug!(
        anchor = anchor.track_id,
        start = ?plan.start,
        end = ?plan.end,
        samples = plan.sample_count(),
        "Selected segment"
    );

    Ok(plan)
}

/// First sample of a non-anchor track at `ticks`. Video tracks only start
/// on sync samples.
fn follower_boundary(track: &Track, ticks: u64) -> usize {
    if track.is_video() {
        track
            .samples
            .sync_at_or_after(ticks)
            .unwrap_or(track.samples.len())
    } else {
        track.samples.first_at_or_after(ticks)
    }
}

/// The anchor among already-chosen tracks.
pub fn anchor_track<'a>(tracks: &[&'a Track]) -> Option<&'a Track> {
    tracks
        .iter()
        .find(|t| t.is_video())
        .or_else(|| tracks.first())
        .copied()
}

/// Resolve which tracks a request covers.
///
/// An explicit `tracks` list wins. Otherwise one video and one audio track
/// are picked, by `bitrate` when given, else the first of each kind.
pub fn choose_tracks<'a>(container: &'a Container, options: &SplitOptions) -> Result<Vec<&'a Track>> {
    if let Some(ids) = &options.tracks {
        if let Some(&missing) = ids.iter().find(|&&id| container.track(id).is_none()) {
            return Err(Error::TrackNotFound(missing));
        }
        return Ok(container
            .tracks
            .iter()
            .filter(|t| ids.contains(&t.track_id))
            .collect());
    }

    let pick = |candidates: Vec<&'a Track>| -> Option<&'a Track> {
        match options.bitrate {
            None => candidates.first().copied(),
            Some(limit) => candidates
                .iter()
                .filter(|t| t.average_bitrate() <= limit)
                .max_by_key(|t| t.average_bitrate())
                .or_else(|| candidates.iter().min_by_key(|t| t.average_bitrate()))
                .copied(),
        }
    };

    let video = pick(container.tracks.iter().filter(|t| t.is_video()).collect());
    let audio = pick(container.tracks.iter().filter(|t| t.is_audio()).collect());

    let mut chosen: Vec<&Track> = container
        .tracks
        .iter()
        .filter(|t| {
            video.map_or(false, |v| v.track_id == t.track_id)
                || audio.map_or(false, |a| a.track_id == t.track_id)
        })
        .collect();

    if chosen.is_empty() {
        chosen.extend(container.tracks.first());
    }
    Ok(chosen)
}

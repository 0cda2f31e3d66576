//! Playlist structures and segment boundaries.

use crate::bucket::OutputChain;
use crate::mp4::Container;
use crate::select::{self, SegmentPlan};
use crate::split::SplitOptions;
use crate::time;
use crate::{Error, Result};
use std::fmt;
use std::time::Duration;

/// Default segment length in seconds.
pub const DEFAULT_SEGMENT_LENGTH: u32 = 8;

/// Playlist generator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistConfig {
    /// Target segment length in seconds (at least 1).
    pub segment_length: u32,
    /// Segment URI without query, e.g. `video.ts` or `http://host/video.ts`.
    pub segment_uri: String,
}

impl PlaylistConfig {
    pub fn new(segment_length: u32, segment_uri: impl Into<String>) -> Self {
        Self {
            segment_length: segment_length.max(1),
            segment_uri: segment_uri.into(),
        }
    }
}

/// One segment of a media playlist.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct PlaylistEntry {
    pub index: usize,
    /// Decode time of the segment's first anchor sample.
    pub start: Duration,
    /// Decode time one past its last anchor sample.
    pub end: Duration,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Options that request exactly this segment.
    pub options: SplitOptions,
    pub uri: String,
}

/// VOD media playlist.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Playlist {
    /// Target duration in whole seconds.
    pub target_duration: u32,
    /// Track selection shared by every segment.
    pub options: SplitOptions,
    pub entries: Vec<PlaylistEntry>,
}

impl Playlist {
    /// Split the media into segments of about `segment_length` seconds.
    ///
    /// Boundaries are sync samples of the anchor track (see
    /// [`select::anchor_track`]). Each boundary is the first sync sample at
    /// or after the previous boundary plus the segment length; the final
    /// segment takes whatever remains. Time range options in `options` are
    /// ignored, only the track selection applies.
    pub fn generate(container: &Container, options: &SplitOptions, config: &PlaylistConfig) -> Result<Self> {
        let variant = options.variant();
        let tracks = select::choose_tracks(container, &variant)?;
        let anchor = select::anchor_track(&tracks).ok_or(Error::EmptySelection)?;
        let samples = &anchor.samples;
        let timescale = anchor.timescale;

        let first = samples
            .sync_at_or_before(0)
            .or_else(|| samples.sync_at_or_after(0))
            .ok_or(Error::EmptySelection)?;

        let step = config.segment_length.max(1) as u64 * timescale as u64;
        let mut boundaries = vec![first];
        let mut current = first;
        loop {
            let target = samples.decode_time(current) + step;
            if target >= samples.total_duration() {
                break;
            }
            match samples.sync_at_or_after(target) {
                Some(next) if next > current => {
                    boundaries.push(next);
                    current = next;
                }
                _ => break,
            }
        }

        let count = boundaries.len();
        let entries: Vec<PlaylistEntry> = boundaries
            .iter()
            .enumerate()
            .map(|(index, &from)| {
                let to = boundaries.get(index + 1).copied().unwrap_or(samples.len());
                let start = time::ticks_to_duration(samples.decode_time(from), timescale);
                let end = time::ticks_to_duration(samples.decode_time(to), timescale);
                let options = variant.with_range(
                    (index > 0).then_some(start),
                    (index + 1 < count).then_some(end),
                );
                let query = options.to_query();
                let uri = if query.is_empty() {
                    config.segment_uri.clone()
                } else {
                    format!("{}?{}", config.segment_uri, query)
                };
                PlaylistEntry {
                    index,
                    start,
                    end,
                    duration_secs: time::ticks_to_secs(
                        samples.decode_time(to) - samples.decode_time(from),
                        timescale,
                    ),
                    options,
                    uri,
                }
            })
            .collect();

        let longest = entries.iter().map(|e| e.duration_secs).fold(0.0, f64::max);
        let target_duration = (longest.ceil() as u32).max(config.segment_length);

        tracing::debug!(
            anchor = anchor.track_id,
            segments = entries.len(),
            target_duration,
            "Generated playlist"
        );

        Ok(Self {
            target_duration,
            options: variant,
            entries,
        })
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.entries.len()
    }

    /// Sum of segment durations in seconds.
    pub fn total_duration_secs(&self) -> f64 {
        self.entries.iter().map(|e| e.duration_secs).sum()
    }

    /// Plan for segment `index`, as an independent request for it would
    /// select.
    pub fn segment_plan(&self, container: &Container, index: usize) -> Result<SegmentPlan> {
        let entry = self.entries.get(index).ok_or(Error::EmptySelection)?;
        select::select(container, &entry.options)
    }

    /// Render to M3U8.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Render into an output chain.
    pub fn write_to(&self, out: &mut OutputChain) -> Result<()> {
        out.write(self.render().as_bytes())
    }
}

impl fmt::Display for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        writeln!(f, "#EXT-X-VERSION:3")?;
        writeln!(f, "#EXT-X-TARGETDURATION:{}", self.target_duration)?;
        writeln!(f, "#EXT-X-MEDIA-SEQUENCE:0")?;
        writeln!(f, "#EXT-X-PLAYLIST-TYPE:VOD")?;

        for entry in &self.entries {
            writeln!(f, "#EXTINF:{:.6},", entry.duration_secs)?;
            writeln!(f, "{}", entry.uri)?;
        }

        writeln!(f, "#EXT-X-ENDLIST")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::{Mp4Builder, TrackSpec};
    use assert_matches::assert_matches;
    use std::io::Cursor;

    fn container(tracks: Vec<TrackSpec>) -> Container {
        let builder = tracks.into_iter().fold(Mp4Builder::new(), |b, t| b.track(t));
        Container::parse(Cursor::new(builder.build())).unwrap()
    }

    #[test]
    fn test_thirty_seconds_in_two_second_segments() {
        // 30 s at 25 fps, keyframe every second
        let container = container(vec![TrackSpec::h264(1, 25_000, 1000, 750, 25)]);
        let playlist = Playlist::generate(
            &container,
            &SplitOptions::default(),
            &PlaylistConfig::new(2, "video.ts"),
        )
        .unwrap();

        assert_eq!(playlist.segment_count(), 15);
        assert!(playlist.entries.iter().all(|e| (e.duration_secs - 2.0).abs() < 1e-9));
        assert_eq!(playlist.target_duration, 2);
        assert!((playlist.total_duration_secs() - 30.0).abs() < 1e-9);

        assert_eq!(playlist.entries[0].uri, "video.ts?end=2");
        assert_eq!(playlist.entries[1].uri, "video.ts?start=2&end=4");
        assert_eq!(playlist.entries[14].uri, "video.ts?start=28");
    }

    #[test]
    fn test_remainder_goes_to_last_segment() {
        // 7 s with keyframes every 3 s
        let container = container(vec![TrackSpec::h264(1, 25_000, 1000, 175, 75)]);
        let playlist = Playlist::generate(
            &container,
            &SplitOptions::default(),
            &PlaylistConfig::new(2, "v.ts"),
        )
        .unwrap();

        let durations: Vec<f64> = playlist.entries.iter().map(|e| e.duration_secs).collect();
        assert_eq!(durations, vec![3.0, 3.0, 1.0]);
        assert_eq!(playlist.target_duration, 3);
    }

    #[test]
    fn test_single_segment_when_shorter_than_length() {
        let container = container(vec![TrackSpec::h264(1, 25_000, 1000, 50, 25)]);
        let playlist = Playlist::generate(
            &container,
            &SplitOptions::default(),
            &PlaylistConfig::new(8, "v.ts"),
        )
        .unwrap();
        assert_eq!(playlist.segment_count(), 1);
        assert_eq!(playlist.entries[0].uri, "v.ts");
        assert_eq!(playlist.target_duration, 8);
    }

    #[test]
    fn test_track_options_carried_into_uris() {
        let container = container(vec![
            TrackSpec::h264(1, 25_000, 1000, 100, 25),
            TrackSpec::aac(2, 48_000, 188),
        ]);
        let options = SplitOptions::parse("tracks=1,2&start=1&end=2").unwrap();
        let playlist =
            Playlist::generate(&container, &options, &PlaylistConfig::new(2, "v.ts")).unwrap();

        assert_eq!(playlist.options.start, None);
        assert_eq!(playlist.segment_count(), 2);
        assert_eq!(playlist.entries[0].uri, "v.ts?end=2&tracks=1,2");
        assert_eq!(playlist.entries[1].uri, "v.ts?start=2&tracks=1,2");
    }

    #[test]
    fn test_segment_plans_partition_the_media() {
        let container = container(vec![
            TrackSpec::h264(1, 30_000, 1001, 300, 30),
            TrackSpec::aac(2, 44_100, 431),
        ]);
        let playlist = Playlist::generate(
            &container,
            &SplitOptions::default(),
            &PlaylistConfig::new(3, "v.ts"),
        )
        .unwrap();

        let plans: Vec<SegmentPlan> = (0..playlist.segment_count())
            .map(|k| playlist.segment_plan(&container, k).unwrap())
            .collect();
        for pair in plans.windows(2) {
            for t in 0..2 {
                assert_eq!(pair[0].tracks[t].samples.end, pair[1].tracks[t].samples.start);
            }
        }
        assert_eq!(plans[0].tracks[0].samples.start, 0);
        assert_eq!(plans.last().unwrap().tracks[0].samples.end, 300);
        assert_eq!(plans.last().unwrap().tracks[1].samples.end, 431);

        for (entry, plan) in playlist.entries.iter().zip(&plans) {
            assert_eq!(entry.start, plan.start);
            assert_eq!(entry.end, plan.end);
        }
        assert_matches!(playlist.segment_plan(&container, 99), Err(Error::EmptySelection));
    }

    #[test]
    fn test_render() {
        let container = container(vec![TrackSpec::h264(1, 25_000, 1000, 100, 25)]);
        let playlist = Playlist::generate(
            &container,
            &SplitOptions::default(),
            &PlaylistConfig::new(2, "v.ts"),
        )
        .unwrap();

        let expected = "#EXTM3U\n\
                        #EXT-X-VERSION:3\n\
                        #EXT-X-TARGETDURATION:2\n\
                        #EXT-X-MEDIA-SEQUENCE:0\n\
                        #EXT-X-PLAYLIST-TYPE:VOD\n\
                        #EXTINF:2.000000,\n\
                        v.ts?end=2\n\
                        #EXTINF:2.000000,\n\
                        v.ts?start=2\n\
                        #EXT-X-ENDLIST\n";
        assert_eq!(playlist.render(), expected);

        let mut out = OutputChain::default();
        playlist.write_to(&mut out).unwrap();
        assert_eq!(&out.to_bytes()[..], expected.as_bytes());
    }
}

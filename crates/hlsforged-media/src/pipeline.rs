//! Request preparation: playlist or segment, decided once per request.

use crate::bucket::OutputChain;
use crate::hls::{Playlist, PlaylistConfig};
use crate::mp4::Container;
use crate::select::{self, SegmentPlan};
use crate::split::SplitOptions;
use crate::ts;
use crate::Result;
use std::io::{Read, Seek};

/// Content type of M3U8 playlists.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
/// Content type of TS segments.
pub const SEGMENT_CONTENT_TYPE: &str = "video/MP2T";

/// What a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Playlist,
    Segment,
}

impl RequestKind {
    /// Playlist when the path mentions `m3u8`, segment otherwise.
    pub fn from_path(path: &str) -> Self {
        if path.contains("m3u8") {
            Self::Playlist
        } else {
            Self::Segment
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Playlist => PLAYLIST_CONTENT_TYPE,
            Self::Segment => SEGMENT_CONTENT_TYPE,
        }
    }
}

/// A request resolved against a container, ready to render.
#[derive(Debug, Clone)]
pub enum Prepared {
    Playlist(Playlist),
    Segment(SegmentPlan),
}

impl Prepared {
    /// Generate the playlist, or select the segment's samples.
    pub fn prepare(
        container: &Container,
        kind: RequestKind,
        options: &SplitOptions,
        playlist: &PlaylistConfig,
    ) -> Result<Self> {
        match kind {
            RequestKind::Playlist => Ok(Self::Playlist(Playlist::generate(container, options, playlist)?)),
            RequestKind::Segment => Ok(Self::Segment(select::select(container, options)?)),
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Playlist(_) => RequestKind::Playlist,
            Self::Segment(_) => RequestKind::Segment,
        }
    }

    /// Action label reported to the view counter.
    pub fn action(&self) -> String {
        match self {
            Self::Playlist(playlist) => format!("ios_playlist&segments={}", playlist.segment_count()),
            Self::Segment(_) => "ios_view".to_string(),
        }
    }

    /// Write the response body into `out`, handing it back only on success.
    pub fn render<R: Read + Seek>(
        &self,
        container: &Container,
        source: &mut R,
        mut out: OutputChain,
    ) -> Result<OutputChain> {
        match self {
            Self::Playlist(playlist) => {
                playlist.write_to(&mut out)?;
                Ok(out)
            }
            Self::Segment(plan) => ts::mux(container, plan, source, out),
        }
    }
}

//! HLS playlist generation.
//!
//! This module generates M3U8 media playlists whose segments are TS
//! requests against the same MP4 file.

mod playlist;

pub use playlist::{Playlist, PlaylistConfig, PlaylistEntry, DEFAULT_SEGMENT_LENGTH};

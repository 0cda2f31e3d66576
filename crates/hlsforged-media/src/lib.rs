//! Hlsforged-Media: MP4 parsing, MPEG-TS muxing and HLS playlists
//!
//! This crate turns progressive MP4 files into HTTP Live Streaming content
//! on request. Nothing is precomputed: every playlist and segment is derived
//! from the file's sample tables when it is asked for.
//!
//! # Modules
//!
//! - `mp4` - MP4 box tree, sample tables, avcC/esds
//! - `split` - request options (time range, tracks, bitrate)
//! - `select` - per-track sample ranges for a request
//! - `ts` - MPEG-TS segments (PAT/PMT, PES, Annex B, ADTS)
//! - `hls` - M3U8 playlists
//! - `bucket` - output buffer chain
//! - `pipeline` - playlist-or-segment dispatch
//!
//! # Flow
//!
//! 1. Parse the moov box into tracks with flat per-sample arrays
//! 2. Parse the query into [`SplitOptions`]
//! 3. For a playlist, cut the anchor track at sync samples roughly every
//!    `segment_length` seconds and list one TS request per segment
//! 4. For a segment, select the samples of every track and mux them
//!
//! A segment requested on its own selects exactly the samples continuous
//! segmentation would have put there, so it is byte-identical.

pub mod bucket;
pub mod error;
pub mod hls;
pub mod mp4;
pub mod pipeline;
pub mod select;
pub mod split;
pub mod time;
pub mod ts;

pub use bucket::OutputChain;
pub use error::{Error, Outcome, Result};
pub use hls::{Playlist, PlaylistConfig};
pub use mp4::Container;
pub use pipeline::{Prepared, RequestKind};
pub use select::SegmentPlan;
pub use split::SplitOptions;

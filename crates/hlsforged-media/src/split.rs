//! Split options: the normalized selection carried by a request query.
//!
//! Recognized keys are `start` and `end` (decimal seconds), `bitrate`
//! (bits per second) and `tracks` (comma-separated track ids). Unknown keys
//! are ignored. A malformed value drops just that option.

use crate::time;
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Normalized selection parameters for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct SplitOptions {
    /// Requested start, from the beginning of the media.
    pub start: Option<Duration>,
    /// Requested end, from the beginning of the media.
    pub end: Option<Duration>,
    /// Variant selector: upper bound on a track's average bitrate.
    pub bitrate: Option<u64>,
    /// Explicit track subset, sorted and deduplicated.
    pub tracks: Option<Vec<u32>>,
}

impl SplitOptions {
    /// Parse a raw query string such as `start=10&end=20&tracks=1,2`.
    ///
    /// Fails with [`Error::EmptySelection`] only when the parsed range
    /// cannot contain any sample (`end <= start`).
    pub fn parse(query: &str) -> Result<Self> {
        let mut options = Self::default();

        for pair in query.trim_start_matches('?').split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
            let value = percent_decode(raw);

            match key {
                "start" => match time::parse_secs(&value) {
                    Some(start) => options.start = Some(start),
                    None => drop_option(key, &value),
                },
                "end" => match time::parse_secs(&value) {
                    Some(end) => options.end = Some(end),
                    None => drop_option(key, &value),
                },
                "bitrate" => match value.parse::<u64>() {
                    Ok(bitrate) if bitrate > 0 => options.bitrate = Some(bitrate),
                    _ => drop_option(key, &value),
                },
                "tracks" => match parse_track_list(&value) {
                    Some(tracks) => options.tracks = Some(tracks),
                    None => drop_option(key, &value),
                },
                _ => {}
            }
        }

        // A zero start is the same selection as no start.
        if options.start == Some(Duration::ZERO) {
            options.start = None;
        }

        if let Some(end) = options.end {
            if end <= options.start.unwrap_or(Duration::ZERO) {
                return Err(Error::EmptySelection);
            }
        }

        Ok(options)
    }

    /// Options covering the whole media with the same track selection.
    pub fn variant(&self) -> Self {
        Self {
            start: None,
            end: None,
            bitrate: self.bitrate,
            tracks: self.tracks.clone(),
        }
    }

    /// The same track selection restricted to `[start, end)`.
    pub fn with_range(&self, start: Option<Duration>, end: Option<Duration>) -> Self {
        Self {
            start: start.filter(|s| !s.is_zero()),
            end,
            ..self.variant()
        }
    }

    pub fn is_whole_file(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Canonical query form: fixed key order, exact decimal times.
    pub fn to_query(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        if let Some(start) = self.start {
            parts.push(format!("start={}", time::format_secs(start)));
        }
        if let Some(end) = self.end {
            parts.push(format!("end={}", time::format_secs(end)));
        }
        if let Some(tracks) = &self.tracks {
            let ids: Vec<String> = tracks.iter().map(|id| id.to_string()).collect();
            parts.push(format!("tracks={}", ids.join(",")));
        }
        if let Some(bitrate) = self.bitrate {
            parts.push(format!("bitrate={}", bitrate));
        }
        parts.join("&")
    }

    /// Stable hash of the normalized options, hex encoded.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_query().as_bytes());
        hex::encode(&hasher.finalize()[..16])
    }
}

fn drop_option(key: &str, value: &str) {
    tracing::warn!(key, value, "Dropping malformed split option");
}

fn parse_track_list(value: &str) -> Option<Vec<u32>> {
    let mut ids = value
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.trim().parse::<u32>().ok())
        .collect::<Option<Vec<u32>>>()?;
    if ids.is_empty() {
        return None;
    }
    ids.sort_unstable();
    ids.dedup();
    Some(ids)
}

/// Decode `%XX` escapes and `+`; invalid escapes are kept verbatim.
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

//! View-count reporting.
//!
//! After a playlist or segment is generated the handler reports what was
//! served. Storage of the counts is not part of this crate.

use std::path::Path;

/// One successful request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewEvent<'a> {
    pub file: &'a Path,
    /// Hash of the normalized split options.
    pub options_hash: &'a str,
    /// `ios_playlist&segments=<n>` or `ios_view`.
    pub action: &'a str,
}

/// Receiver of view events.
pub trait ViewCounter: Send + Sync {
    fn record(&self, event: &ViewEvent<'_>);
}

/// Logs each event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingViewCounter;

impl ViewCounter for TracingViewCounter {
    fn record(&self, event: &ViewEvent<'_>) {
        tracing::info!(
            file = %event.file.display(),
            hash = event.options_hash,
            action = event.action,
            "View"
        );
    }
}

/// Discards events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopViewCounter;

impl ViewCounter for NoopViewCounter {
    fn record(&self, _event: &ViewEvent<'_>) {}
}

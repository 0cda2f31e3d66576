//! Error types for hlsforged-media.

use std::io;
use thiserror::Error;

/// Result type for hlsforged-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for hlsforged-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or inconsistent boxes in the MP4 container.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    /// A requested track id is not present among the parsed tracks.
    #[error("Track not found: {0}")]
    TrackNotFound(u32),

    /// The requested range contains no samples.
    #[error("Selection contains no samples")]
    EmptySelection,

    /// A read went past the end of the source, or the source failed.
    #[error("Source read failure: {0}")]
    SourceReadFailure(String),

    /// Generated output exceeded the configured cap.
    #[error("Output exceeded buffer limit of {limit} bytes")]
    BufferLimitExceeded { limit: usize },

    /// A selected track carries a codec that cannot be muxed to MPEG-TS.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),
}

impl Error {
    /// Create a malformed container error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedContainer(msg.into())
    }

    /// Create a source read error.
    pub fn source_read(msg: impl Into<String>) -> Self {
        Self::SourceReadFailure(msg.into())
    }

    /// Create an unsupported codec error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedCodec(msg.into())
    }

    /// Map this error onto the response category used by the HTTP layer.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::EmptySelection | Self::UnsupportedCodec(_) => Outcome::UnsupportedMedia,
            Self::TrackNotFound(_) => Outcome::NotFound,
            Self::MalformedContainer(_)
            | Self::SourceReadFailure(_)
            | Self::BufferLimitExceeded { .. } => Outcome::ServerError,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::SourceReadFailure(err.to_string())
    }
}

/// Response category for a finished request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    NotFound,
    Forbidden,
    UnsupportedMedia,
    ServerError,
}

impl Outcome {
    /// HTTP status code for this outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NotFound => 404,
            Self::Forbidden => 403,
            Self::UnsupportedMedia => 415,
            Self::ServerError => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::malformed("no moov").to_string(),
            "Malformed container: no moov"
        );
        assert_eq!(Error::TrackNotFound(7).to_string(), "Track not found: 7");
        assert_eq!(
            Error::BufferLimitExceeded { limit: 1024 }.to_string(),
            "Output exceeded buffer limit of 1024 bytes"
        );
    }

    #[test]
    fn test_io_error_maps_to_source_read() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::SourceReadFailure(_)));
    }

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(Error::EmptySelection.outcome(), Outcome::UnsupportedMedia);
        assert_eq!(Error::TrackNotFound(2).outcome(), Outcome::NotFound);
        assert_eq!(Error::malformed("x").outcome(), Outcome::ServerError);
        assert_eq!(Error::source_read("x").outcome(), Outcome::ServerError);
        assert_eq!(
            Error::BufferLimitExceeded { limit: 1 }.outcome().status_code(),
            500
        );
        assert_eq!(Outcome::UnsupportedMedia.status_code(), 415);
    }
}

//! Request dispatch.
//!
//! This is the seam an HTTP server calls into: it resolves a request URI
//! to an MP4 file under a root directory, generates the playlist or TS
//! segment, and hands back the body with the status it maps to. Nothing
//! here touches a socket.

use crate::cache::ContainerCache;
use crate::config::{Config, HlsConfig};
use crate::view_count::{TracingViewCounter, ViewCounter, ViewEvent};
use hlsforged_media::{Container, OutputChain, Outcome, PlaylistConfig, Prepared, RequestKind, SplitOptions};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Name of the version response header.
pub const VERSION_HEADER: &str = "X-Mod-HLS";

/// Value of the version response header.
pub fn version_header_value() -> String {
    format!("hlsforged/{}", env!("CARGO_PKG_VERSION"))
}

/// Errors from request handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("File not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Access denied: {0:?}")]
    Forbidden(PathBuf),

    #[error("Not a regular file: {0:?}")]
    NotAFile(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Media(#[from] hlsforged_media::Error),
}

impl HandlerError {
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::NotFound(_) | Self::NotAFile(_) => Outcome::NotFound,
            Self::Forbidden(_) => Outcome::Forbidden,
            Self::Io(_) => Outcome::ServerError,
            Self::Media(e) => e.outcome(),
        }
    }
}

/// A parsed request URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// URI path, e.g. `/videos/movie.m3u8`.
    pub path: String,
    /// Raw query string without the `?`.
    pub query: String,
    pub kind: RequestKind,
    /// MP4 file the request is served from.
    pub media_path: PathBuf,
}

impl Request {
    /// Split `uri` and map its path to an `.mp4` file under `root`.
    pub fn parse(uri: &str, root: &Path) -> Result<Self, HandlerError> {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        let relative = Path::new(path.trim_start_matches('/'));

        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(HandlerError::Forbidden(relative.to_path_buf()));
        }
        if relative.file_name().is_none() {
            return Err(HandlerError::NotFound(root.join(relative)));
        }

        Ok(Self {
            path: path.to_string(),
            query: query.to_string(),
            kind: RequestKind::from_path(path),
            media_path: root.join(relative).with_extension("mp4"),
        })
    }
}

/// Response handed to the HTTP layer.
#[derive(Debug)]
pub struct Response {
    pub outcome: Outcome,
    pub content_type: Option<&'static str>,
    pub headers: Vec<(&'static str, String)>,
    pub body: OutputChain,
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.outcome.status_code()
    }

    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    fn error(outcome: Outcome) -> Self {
        Self {
            outcome,
            content_type: None,
            headers: vec![(VERSION_HEADER, version_header_value())],
            body: OutputChain::new(1, 0),
        }
    }
}

/// Serves playlist and segment requests.
pub struct Handler {
    hls: HlsConfig,
    cache: Option<ContainerCache>,
    views: Arc<dyn ViewCounter>,
}

impl Handler {
    pub fn new(config: &Config) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| ContainerCache::new(config.cache.max_entries, config.cache.ttl_secs));
        Self {
            hls: config.hls.clone(),
            cache,
            views: Arc::new(TracingViewCounter),
        }
    }

    /// Replace the view counter.
    pub fn with_view_counter(mut self, views: Arc<dyn ViewCounter>) -> Self {
        self.views = views;
        self
    }

    /// Handle a request; failures become an empty response with their outcome.
    pub fn handle(&self, request: &Request) -> Response {
        match self.try_handle(request) {
            Ok(response) => response,
            Err(e) => {
                let outcome = e.outcome();
                match outcome {
                    Outcome::ServerError => tracing::error!(path = %request.path, error = %e, "Request failed"),
                    _ => tracing::warn!(path = %request.path, error = %e, "Request rejected"),
                }
                Response::error(outcome)
            }
        }
    }

    /// Handle a request, returning the error instead of mapping it.
    pub fn try_handle(&self, request: &Request) -> Result<Response, HandlerError> {
        let started = Instant::now();
        let path = &request.media_path;

        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => HandlerError::NotFound(path.clone()),
            io::ErrorKind::PermissionDenied => HandlerError::Forbidden(path.clone()),
            _ => HandlerError::Io(e),
        })?;
        if !metadata.is_file() {
            return Err(HandlerError::NotAFile(path.clone()));
        }

        let options = SplitOptions::parse(&request.query)?;
        let container = self.container(path)?;

        let playlist = PlaylistConfig::new(self.hls.segment_length, self.hls.segment_uri(&request.path));
        let prepared = Prepared::prepare(&container, request.kind, &options, &playlist)?;

        let mut source = BufReader::new(File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => HandlerError::Forbidden(path.clone()),
            _ => HandlerError::Io(e),
        })?);
        let body = prepared.render(&container, &mut source, self.hls.output_chain())?;

        let hash = options.hash();
        let action = prepared.action();
        self.views.record(&ViewEvent {
            file: path,
            options_hash: &hash,
            action: &action,
        });

        tracing::info!(
            path = %request.path,
            kind = ?request.kind,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Served"
        );

        Ok(Response {
            outcome: Outcome::Ok,
            content_type: Some(request.kind.content_type()),
            headers: vec![(VERSION_HEADER, version_header_value())],
            body,
        })
    }

    fn container(&self, path: &Path) -> Result<Arc<Container>, HandlerError> {
        match &self.cache {
            Some(cache) => cache.get_or_load(path, |p| Container::open(p).map_err(HandlerError::from)),
            None => Ok(Arc::new(Container::open(path)?)),
        }
    }
}

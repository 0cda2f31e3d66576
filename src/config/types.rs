use hlsforged_media::bucket::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_SIZE};
use hlsforged_media::hls::DEFAULT_SEGMENT_LENGTH;
use hlsforged_media::OutputChain;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub hls: HlsConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HlsConfig {
    /// Target segment length in seconds (at least 1)
    #[serde(default = "default_segment_length")]
    pub segment_length: u32,

    /// Segment URIs relative to the playlist; otherwise prefixed with `base_url`
    #[serde(default = "default_true")]
    pub relative: bool,

    #[serde(default)]
    pub base_url: String,

    /// Capacity of each output buffer in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Cap on a single response body in bytes
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
}

fn default_segment_length() -> u32 {
    DEFAULT_SEGMENT_LENGTH
}
fn default_true() -> bool {
    true
}
fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}
fn default_max_buffer_size() -> usize {
    DEFAULT_MAX_SIZE
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            segment_length: default_segment_length(),
            relative: true,
            base_url: String::new(),
            buffer_size: default_buffer_size(),
            max_buffer_size: default_max_buffer_size(),
        }
    }
}

impl HlsConfig {
    /// An empty output chain with the configured limits.
    pub fn output_chain(&self) -> OutputChain {
        OutputChain::new(self.buffer_size, self.max_buffer_size)
    }

    /// URI of the TS resource for a request path such as `/dir/movie.m3u8`.
    pub fn segment_uri(&self, request_path: &str) -> String {
        let without_ext = match request_path.rfind('.') {
            Some(dot) if !request_path[dot..].contains('/') => &request_path[..dot],
            _ => request_path,
        };
        if self.relative {
            let name = without_ext.rsplit('/').next().unwrap_or(without_ext);
            format!("{}.ts", name)
        } else {
            format!(
                "{}/{}.ts",
                self.base_url.trim_end_matches('/'),
                without_ext.trim_start_matches('/')
            )
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_max_entries() -> usize {
    64
}
fn default_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./hlsforged.toml",
        "./config.toml",
        "~/.config/hlsforged/config.toml",
        "/etc/hlsforged/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let hls = &config.hls;

    if hls.segment_length < 1 {
        anyhow::bail!("hls.segment_length must be equal or more than 1");
    }

    if hls.buffer_size == 0 {
        anyhow::bail!("hls.buffer_size cannot be 0");
    }

    if hls.max_buffer_size < hls.buffer_size {
        anyhow::bail!(
            "hls.max_buffer_size ({}) is smaller than hls.buffer_size ({})",
            hls.max_buffer_size,
            hls.buffer_size
        );
    }

    if !hls.relative && hls.base_url.is_empty() {
        anyhow::bail!("hls.base_url is required when hls.relative is false");
    }

    if config.cache.enabled && config.cache.max_entries == 0 {
        tracing::warn!("Container cache is enabled with max_entries = 0; nothing will be cached");
    }

    Ok(())
}

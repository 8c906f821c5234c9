mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Smallest reservation that still holds a movie header and one track.
const MIN_HEADER_LENGTH: usize = 512;

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

    let default_paths = ["./mediaforge.toml", "~/.config/mediaforge/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.input.chunk_size == 0 {
        anyhow::bail!("input.chunk_size cannot be 0");
    }

    if config.mux.header_length < MIN_HEADER_LENGTH {
        anyhow::bail!(
            "mux.header_length must be at least {} bytes, got {}",
            MIN_HEADER_LENGTH,
            config.mux.header_length
        );
    }

    if let Some(ref tool) = config.mux.tool {
        if tool.is_empty() {
            tracing::warn!("mux.tool is empty; the tool item will be written without text");
        }
    }

    Ok(())
}

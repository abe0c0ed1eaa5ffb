//! TOML-backed settings loading.
//!
//! The config file maps one-to-one onto [`Settings`]; every key is
//! optional and falls back to the protocol defaults. Command-line flags
//! are applied on top by `main`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use windlass_core::Settings;

/// Config file looked for when `--config` is not given.
pub fn default_path() -> PathBuf {
    PathBuf::from("windlass.toml")
}

/// Load settings from a TOML file.
pub fn load(path: &Path) -> anyhow::Result<Settings> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(settings)
}

/// Load the default config file if it exists, defaults otherwise.
pub fn load_or_default() -> anyhow::Result<Settings> {
    let path = default_path();
    if path.exists() {
        load(&path)
    } else {
        Ok(Settings::default())
    }
}

//! Centralized application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/trickster/` | `~/.local/share/trickster/` |
//! | Config | `~/Library/Application Support/trickster/` | `~/.config/trickster/` |
//!
//! Environment overrides for tests and custom deployments:
//! - `TRICKSTER_DATA_DIR` overrides [`data_dir`]
//! - `TRICKSTER_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory (conversation records, logs).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TRICKSTER_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("trickster"))
        .unwrap_or_else(|| PathBuf::from("/tmp/trickster-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TRICKSTER_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("trickster"))
        .unwrap_or_else(|| PathBuf::from("/tmp/trickster-config"))
}

/// Per-conversation record directory (`data_dir()/contexts/`).
#[must_use]
pub fn contexts_dir() -> PathBuf {
    data_dir().join("contexts")
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

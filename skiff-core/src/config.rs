//! Session configuration, loadable from TOML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SkiffError;

/// Tunables of one connection's dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds a blocking wait may take before it fails with `Timeout`.
    pub read_timeout_secs: u64,
    /// Receive window advertised for channels we accept.
    pub channel_window: u32,
    /// Maximum data payload advertised for channels we accept.
    pub channel_packet_size: u32,
    /// Ceiling on linked plus pending channels.
    pub max_channels: usize,
    /// Accept forwarded X11 connections.
    pub x11_forwarding: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: 60,
            channel_window: 256 * 1024,
            channel_packet_size: 32768,
            max_channels: 1024,
            x11_forwarding: false,
        }
    }
}

impl SessionConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SkiffError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_toml_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

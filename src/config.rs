//! Configuration loading.
//!
//! Settings come from `config.json` in the platform config directory
//! (`~/.config/g3link` on Linux), then environment variables override
//! individual fields. A missing file is not an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

use crate::ws;

const CONFIG_FILE: &str = "config.json";

/// Connection settings for one device.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Device hostname or address, optionally with a port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Path of the WebSocket endpoint on the device.
    pub websocket_path: String,
    /// WebSocket subprotocol requested during the handshake.
    pub subprotocol: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: None,
            websocket_path: "/websocket".to_string(),
            subprotocol: "g3api".to_string(),
        }
    }
}

impl Config {
    /// Directory holding `config.json`.
    ///
    /// `G3_CONFIG_DIR` overrides the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("G3_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("g3link"))
    }

    /// Load `config.json` from [`Self::config_dir`] (defaults if absent),
    /// then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            log::debug!("[G3] No config file at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load an explicit config file. No environment overrides are applied.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Override fields from `G3_HOSTNAME`, `G3_WEBSOCKET_PATH` and
    /// `G3_SUBPROTOCOL`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(hostname) = var("G3_HOSTNAME").filter(|h| !h.is_empty()) {
            self.hostname = Some(hostname);
        }

        if let Some(path) = var("G3_WEBSOCKET_PATH") {
            self.websocket_path = path;
        }

        if let Some(subprotocol) = var("G3_SUBPROTOCOL") {
            self.subprotocol = subprotocol;
        }
    }

    /// WebSocket URL of the configured device.
    pub fn websocket_url(&self) -> Result<String> {
        let hostname = self
            .hostname
            .as_deref()
            .filter(|h| !h.is_empty())
            .context("No device hostname configured (set G3_HOSTNAME or pass --host)")?;
        Ok(ws::websocket_url(hostname, &self.websocket_path))
    }
}

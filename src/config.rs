//! Typed application configuration.
//!
//! Exactly three recognized keys — `compiler`, `opt_level`, `flags` — with
//! defaults applied once at load time. A missing or unreadable store is not
//! an error: the defaults are used and the next [`AppConfig::save`] writes a
//! fresh file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Persisted configuration. Unknown keys in the store are ignored; missing
/// keys fall back to their defaults field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Compiler binary to invoke.
    pub compiler: String,
    /// Optimization flag passed through verbatim.
    pub opt_level: String,
    /// Extra flags appended to every compile.
    pub flags: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            compiler: "g++".to_string(),
            opt_level: "-O0".to_string(),
            flags: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot write configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Location of the configuration file, `~/.asmlens/config.json`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".asmlens").join("config.json"))
}

impl AppConfig {
    /// Load the configuration from the default location, falling back to
    /// defaults when the store is missing or unreadable.
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path with the same degradation rules.
    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                debug!(path = %path.display(), %err, "no readable config, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(config) => config,
            Err(err) => {
                debug!(path = %path.display(), %err, "malformed config, using defaults");
                Self::default()
            }
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        match config_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    /// Persist to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

//! Application configuration (TOML)
//!
//! ```toml
//! [timer]
//! pomodoro_minutes = 25
//! break_minutes = 5
//! cycles = 4
//!
//! [audio]
//! sample_rate = 44100
//! block_size = 512
//! noise_seconds = 4.0
//! master_volume = 0.5
//! smoothing_seconds = 0.1
//!
//! [storage]
//! state_file = "/home/me/.local/share/focus-companion/state.json"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Every section and key is optional.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "focus-companion";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub timer: TimerConfig,
    pub audio: AudioConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Durations used when no session state has been persisted yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub pomodoro_minutes: u32,
    pub break_minutes: u32,
    pub cycles: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            pomodoro_minutes: 25,
            break_minutes: 5,
            cycles: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate for offline rendering (live output uses the device rate)
    pub sample_rate: u32,
    pub block_size: usize,
    /// Length of the looped noise buffer behind each ambient bed
    pub noise_seconds: f32,
    pub master_volume: f32,
    /// Time constant of gain retargets
    pub smoothing_seconds: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 512,
            noise_seconds: 4.0,
            master_volume: 0.5,
            smoothing_seconds: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub state_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            state_file: base.join(APP_DIR).join("state.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// `<config_dir>/focus-companion/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

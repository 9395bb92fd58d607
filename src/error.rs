//! Error types
//!
//! Each subsystem has its own error enum and `Result` alias. The core
//! operations on the mix engine and the session state never surface these to
//! their callers (failures are logged and recovered locally); they appear on
//! the edges: opening an output device, reading config, file persistence,
//! WAV rendering.

use std::path::PathBuf;
use thiserror::Error;

/// Audio device and context failures
#[derive(Debug, Error)]
pub enum AudioError {
    /// No output device available on the default host
    #[error("no audio output device found")]
    NoDevice,

    #[error("failed to query output device: {0}")]
    Device(String),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    /// Playback refused by the host (the context stays suspended)
    #[error("playback blocked: {0}")]
    PlaybackBlocked(String),

    #[error("audio context is closed")]
    Closed,
}

pub type AudioResult<T> = std::result::Result<T, AudioError>;

/// Persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Configuration file failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Offline rendering failures
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write WAV: {0}")]
    Wav(#[from] hound::Error),

    #[error("nothing to render: the mix has no active sounds")]
    EmptyMix,
}

/// Top-level error for the binary
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

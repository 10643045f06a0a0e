//! Audio device layer error types.

use thiserror::Error;

use crate::track::TrackError;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no audio output devices found")]
    NoDevices,

    #[error("audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to get device config: {0}")]
    ConfigError(String),

    #[error("failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("failed to start audio stream: {0}")]
    StreamPlayError(String),

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("engine init failed: {0}")]
    Engine(#[from] TrackError),
}

pub type AudioResult<T> = Result<T, AudioError>;

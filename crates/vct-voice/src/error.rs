//! Error types for the voice session pipeline.

use thiserror::Error;

pub type TowerResult<T> = Result<T, TowerError>;

#[derive(Error, Debug)]
pub enum TowerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<cpal::DevicesError> for TowerError {
    fn from(err: cpal::DevicesError) -> Self {
        TowerError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for TowerError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        TowerError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for TowerError {
    fn from(err: cpal::BuildStreamError) -> Self {
        TowerError::AudioStream(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for TowerError {
    fn from(err: cpal::PlayStreamError) -> Self {
        TowerError::AudioStream(err.to_string())
    }
}

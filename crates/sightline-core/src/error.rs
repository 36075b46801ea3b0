//! Error types for the Sightline narration pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type SightResult<T> = Result<T, SightError>;

/// Errors that can occur in the narration pipeline
#[derive(Error, Debug)]
pub enum SightError {
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Frame encoding error: {0}")]
    FrameEncoding(String),

    #[error("Vision analysis error: {0}")]
    Analysis(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Channel receive error: {0}")]
    ChannelReceive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for SightError {
    fn from(err: image::ImageError) -> Self {
        SightError::FrameEncoding(err.to_string())
    }
}

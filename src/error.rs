use std::path::PathBuf;

use thiserror::Error;

/// Sotto's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Sotto's crate-wide error type.
///
/// Every variant here is recoverable at the process level: the sidecar stays up and the
/// next request may retry. Nothing in this taxonomy should ever take the service down.
#[derive(Debug, Error)]
pub enum Error {
    /// Model artifacts are missing or unusable (weights or vocabulary file absent).
    ///
    /// The model stays unloaded; the next load call re-checks the model directory.
    #[error("model configuration error: {0}")]
    Config(String),

    /// The model could not be constructed on any provider.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// The requested audio path does not exist. Reported before any model interaction.
    #[error("audio file not found: {}", .0.display())]
    AudioNotFound(PathBuf),

    /// The WAVE container carries samples we cannot decode.
    ///
    /// Reported before any chunk is emitted; only 16-bit and 32-bit signed integer PCM
    /// are supported.
    #[error("unsupported audio format: {0}")]
    UnsupportedAudioFormat(String),

    /// Unexpected failure while decoding or recognizing a chunk.
    #[error("recognition failed: {0}")]
    Recognition(String),

    /// The caller aborted the transcription between chunks.
    #[error("transcription cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(err.into())
    }
}

//! Error types for Songtrax.

use thiserror::Error;

/// Result type alias using Songtrax's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Songtrax.
#[derive(Error, Debug)]
pub enum Error {
    // Positioning errors
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position transport error: {0}")]
    PositionTransport(String),

    // Backend errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] HttpError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Sample data errors
    #[error("Malformed grid data: {0}")]
    MalformedGridData(String),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    // Audio errors
    #[error("Playback unavailable: {0}")]
    PlaybackUnavailable(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// HTTP-specific errors.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request failed with status {status}: {message}")]
    StatusError { status: u16, message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Returns true if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Http(HttpError::ConnectionFailed(_) | HttpError::Timeout)
                | Self::Http(HttpError::StatusError { status: 500..=599, .. })
        )
    }

    /// Returns true if the operation that raised this error can be retried
    /// or skipped without tearing down the process.
    ///
    /// Everything except internal invariant violations qualifies.
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

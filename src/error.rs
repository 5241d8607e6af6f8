use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while annotating a video.
#[derive(Debug, Error)]
pub enum AnnotError {
    /// The video file does not exist or is not readable
    #[error("video not found: {path}")]
    NotFound { path: PathBuf },

    /// Missing or invalid startup configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The inference endpoint returned a non-success status
    #[error("inference service returned {status}: [{code}] {message}")]
    RemoteService {
        status: u16,
        code: String,
        message: String,
    },

    /// Network, timeout, or malformed-response fault reaching the endpoint
    #[error("transport error: {0}")]
    Transport(String),

    /// Failed to write one of the output files; the other format is still attempted
    #[error("failed to write {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

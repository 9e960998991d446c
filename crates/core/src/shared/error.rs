use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the sink engine and its writer backends.
///
/// Packet delivery never produces one of these; only the control path does.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("stream {index} rejected: {reason}")]
    InvalidCapability { index: usize, reason: String },
    #[error("stream {0} is not registered")]
    UnknownStream(usize),
    #[error("stream {0} is already registered")]
    StreamExists(usize),
    #[error("backend failed to initialize: {0}")]
    BackendInit(String),
    #[error("writer worker failed: {0}")]
    Worker(String),
    #[error("no backend loaded")]
    NoBackendLoaded,
    #[error("unknown backend: {0}")]
    UnknownBackend(String),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("ffmpeg: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),
}

impl SinkError {
    pub fn invalid_capability(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidCapability {
            index,
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

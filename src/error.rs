use std::time::Duration;
use thiserror::Error;

/// Errors that reject a whole `sync` call before any request is issued.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("input mismatch: {urls} urls but {paths} destination paths")]
    InputMismatch { urls: usize, paths: usize },
}

/// Failure of a single fetch. Recorded in that request's outcome; never aborts the batch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Displays only the reason phrase, e.g. "Not Found".
    #[error("{text}")]
    HttpStatus { code: u16, text: &'static str },

    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("fetch task aborted: {0}")]
    Aborted(String),
}

impl FetchError {
    /// Short machine-friendly name used in the JSON report.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Timeout(_) => "timeout",
            FetchError::HttpStatus { .. } => "http_status",
            FetchError::Filesystem(_) => "filesystem",
            FetchError::HashMismatch { .. } => "hash_mismatch",
            FetchError::Aborted(_) => "aborted",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Network(e.to_string())
    }
}

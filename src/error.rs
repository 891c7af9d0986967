//! Error types for the analysis tracker

/// Result type for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Error types for tracker and API operations
#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("No credential available, please log in")]
    MissingCredential,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TrackerError {
    /// Whether the next poll tick may succeed where this one failed.
    ///
    /// Transport and server hiccups are retried on the next tick; a missing
    /// credential or broken configuration never recovers on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TrackerError::Http(_) | TrackerError::Json(_) | TrackerError::Status { .. }
        )
    }
}

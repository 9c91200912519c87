use thiserror::Error;

/// Failures surfaced by one poll cycle.
///
/// `Transport` and `Format` are fatal for the process: there is no in-loop
/// retry, an external supervisor restarts the ingester (which also
/// re-bootstraps session cookies from scratch).
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed upstream payload: {0}")]
    Format(String),

    #[error("storage error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Format(err.to_string())
    }
}

impl IngestError {
    /// Transport-class failure (network error or non-success status).
    pub fn is_transport(&self) -> bool {
        matches!(self, IngestError::Transport(_) | IngestError::Status { .. })
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

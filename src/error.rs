//! Error types shared by the library modules.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    /// Missing credentials or model files, unknown strategy, unfitted vocabulary.
    #[error("configuration error: {0}")]
    Config(String),

    /// The embedding or generation backend failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// Query and stored vectors come from different providers.
    #[error("vector length mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl RagError {
    /// True for errors caused by configuration rather than runtime conditions.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::DimensionMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

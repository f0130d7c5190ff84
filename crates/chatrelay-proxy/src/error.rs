//! Error types for the relay core.

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors that can occur while relaying or maintaining credentials.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Network/HTTP transport error.
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream answered with a status the caller did not expect.
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// Operator authentication failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Challenge token could not be obtained.
    #[error("Challenge error: {0}")]
    Challenge(String),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Serialization(e.to_string())
    }
}

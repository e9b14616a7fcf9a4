//! Error types for the PHD2 remote-control client

/// Errors that can occur when talking to PHD2
#[derive(Debug, thiserror::Error)]
pub enum Phd2Error {
    #[error("Not connected to PHD2")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("{message}")]
    Rpc { code: i32, message: String },

    #[error("Not settling")]
    NotSettling,

    #[error("No equipment profile named '{0}'")]
    ProfileNotFound(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to send message: {0}")]
    SendError(String),

    #[error("Failed to receive response")]
    ReceiveError,
}

/// Result type alias for PHD2 operations
pub type Result<T> = std::result::Result<T, Phd2Error>;

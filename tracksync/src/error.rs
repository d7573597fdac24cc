//! Error types for the track synchronization engine

/// Result type alias for tracksync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to the station server
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed before a status was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Push channel transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server answered with a non-200 status
    #[error("Server rejected request with status {status}: {body}")]
    Status { status: u16, body: String },

    /// Configuration error (from trackconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a server rejection error
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Status code of a server rejection, if this is one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the server reported an internal error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_some_and(crate::transport::is_server_error)
    }
}

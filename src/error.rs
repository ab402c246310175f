use thiserror::Error;

/// Result type for speaker operations
pub type Result<T> = std::result::Result<T, DutchDutchError>;

/// Errors that can occur when talking to the speaker pair
#[derive(Error, Debug)]
pub enum DutchDutchError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HTTP probe error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The speaker did not answer the HTTP probe
    #[error("{0} is unreachable")]
    Unreachable(String),

    /// Connection was closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// The session has no steady connection to send on
    #[error("Not connected")]
    NotConnected,

    /// Request timed out waiting for response
    #[error("Request timeout")]
    Timeout,

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or unexpected payload from the speaker
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Requested preset name has never been reported by the speaker
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    /// Anything not anticipated, e.g. a listener task that panicked
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

/// Coarse classification used to decide how a failure is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Probe, connect, send or receive failed; the session goes unavailable
    Connectivity,
    /// Malformed frame or missing keys; the cycle is skipped and state retained
    Protocol,
    /// Caller asked for something the device does not know about
    Domain,
    /// Handled like a connectivity failure
    Unexpected,
}

impl DutchDutchError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WebSocket(_)
            | Self::Http(_)
            | Self::Unreachable(_)
            | Self::ConnectionClosed
            | Self::NotConnected
            | Self::Timeout => ErrorKind::Connectivity,
            Self::Json(_) | Self::InvalidResponse(_) => ErrorKind::Protocol,
            Self::UnknownPreset(_) => ErrorKind::Domain,
            Self::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// Whether the session must be torn down and bootstrapped again
    pub fn requires_reconnect(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connectivity | ErrorKind::Unexpected)
    }

    pub(crate) fn missing(what: &str) -> Self {
        Self::InvalidResponse(format!("missing {}", what))
    }
}

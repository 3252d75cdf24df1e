//! Client error types.

use thiserror::Error;

use crate::credentials::RenewalError;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced to callers of the request pipeline.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No response reached the client (connect failure, timeout, reset).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server rejected the credential, and the one automatic retry is spent.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Credential renewal failed; the session has been terminated.
    #[error("Renewal failed: {0}")]
    Renewal(#[from] RenewalError),

    /// Non-2xx response other than 401.
    #[error("API error (status={status}, code={code:?}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// A response body did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Request body could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed server URL or request path.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Server URL scheme cannot be mapped to an event transport.
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Operation needs a logged-in session.
    #[error("Not logged in")]
    NotLoggedIn,
}

impl ClientError {
    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Check if this error ended the session (a new login is required).
    pub fn requires_relogin(&self) -> bool {
        match self {
            Self::Unauthorized { .. } | Self::NotLoggedIn => true,
            Self::Renewal(e) => e.requires_relogin(),
            _ => false,
        }
    }

    /// Check if this error is transient and the call may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Reasons an inbound event frame is dropped.
///
/// Never raised to the embedding application; the channel logs and continues.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Frame is not valid JSON, lacks a tag, or its payload has the wrong shape.
    #[error("Malformed frame: {0}")]
    Decode(String),

    /// Tag is well-formed but not one this client understands.
    #[error("Unknown message tag: {0}")]
    UnknownTag(String),
}

impl FrameError {
    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = ClientError::Unauthorized {
            message: "invalid token".to_string(),
        };
        assert!(err.requires_relogin());
        assert!(!err.is_transient());

        let err = ClientError::Api {
            status: 503,
            code: None,
            message: "unavailable".to_string(),
        };
        assert!(err.is_transient());
        assert!(!err.requires_relogin());

        let err = ClientError::from(RenewalError::NoRefreshCredential);
        assert!(err.requires_relogin());
    }
}

//! Credential renewal error types.

use thiserror::Error;

/// Errors that can occur during a renewal episode.
///
/// Cloned to every waiter of the episode, so variants only carry owned strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenewalError {
    /// The store holds no refresh token - re-login required.
    #[error("No refresh credential available - re-login required")]
    NoRefreshCredential,

    /// The auth service answered with a non-success status.
    #[error("Renewal rejected (status={status}): {message}")]
    Rejected { status: u16, message: String },

    /// The renewal request never got a response.
    #[error("Network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("Invalid renewal response: {0}")]
    InvalidResponse(String),

    /// A structurally valid response lacked a token.
    #[error("Missing {0} in renewal response")]
    MissingToken(&'static str),

    /// The owning task was dropped before the episode resolved.
    #[error("Renewal abandoned before completion")]
    Abandoned,
}

impl RenewalError {
    /// Check if this failure ended the session.
    ///
    /// Every failure except abandonment clears the credential store.
    pub fn requires_relogin(&self) -> bool {
        !matches!(self, Self::Abandoned)
    }
}

impl From<reqwest::Error> for RenewalError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

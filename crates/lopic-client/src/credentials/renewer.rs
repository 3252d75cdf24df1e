//! Remote token renewal.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::error::RenewalError;
use super::types::TokenResponse;
use crate::http::envelope::{ErrorResponse, decode_body};

/// Performs the remote renewal call.
///
/// Implementations only talk to the auth service; storing the result and
/// fanning it out to waiters is the coordinator's job.
#[async_trait]
pub trait TokenRenewer: Send + Sync {
    /// Exchange a refresh token for a new token pair.
    async fn renew(&self, refresh_token: &str) -> Result<TokenResponse, RenewalError>;
}

#[derive(Serialize)]
struct RefreshTokenRequest<'a> {
    refresh_token: &'a str,
}

/// Renewal against the lopic `POST /api/auth/refresh` endpoint.
///
/// Uses a plain client, never the request pipeline, so a rejected refresh can
/// not recurse into another renewal.
pub struct HttpTokenRenewer {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTokenRenewer {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl TokenRenewer for HttpTokenRenewer {
    async fn renew(&self, refresh_token: &str) -> Result<TokenResponse, RenewalError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&RefreshTokenRequest { refresh_token })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let error = ErrorResponse::parse(&body);
            debug!(status = status.as_u16(), code = ?error.code, "Refresh endpoint rejected token");
            return Err(RenewalError::Rejected {
                status: status.as_u16(),
                message: error.message,
            });
        }

        let envelope = decode_body(&body);
        if !envelope.data.is_object() {
            return Err(RenewalError::InvalidResponse(
                "expected a token object".to_string(),
            ));
        }

        serde_json::from_value(envelope.data)
            .map_err(|e| RenewalError::InvalidResponse(e.to_string()))
    }
}

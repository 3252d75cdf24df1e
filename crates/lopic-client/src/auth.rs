//! Login and logout.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{LOGIN_PATH, LOGOUT_PATH};
use crate::credentials::{Credential, CredentialStore, TokenResponse};
use crate::error::{ClientError, Result};
use crate::http::{ApiClient, ApiRequest};
use crate::session::{SessionEvent, SessionEvents};

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LogoutRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token_response: TokenResponse,
    #[serde(default)]
    user: Value,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// User profile as returned by the server.
    pub user: Value,
    pub credential: Credential,
}

/// Starts and ends sessions.
#[derive(Clone)]
pub struct Authenticator {
    api: ApiClient,
    store: Arc<dyn CredentialStore>,
    events: SessionEvents,
}

impl Authenticator {
    pub fn new(api: ApiClient, store: Arc<dyn CredentialStore>, events: SessionEvents) -> Self {
        Self { api, store, events }
    }

    /// Exchange username and password for a credential.
    ///
    /// Sent without a credential, so a 401 here is a plain rejection and never
    /// starts a renewal.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        let request = ApiRequest::post(LOGIN_PATH)
            .json(&LoginRequest { username, password })?
            .skip_auth();
        let data: LoginData = self.api.execute(request).await?.into_data();

        let credential = Credential::from_token_response(data.token_response, Utc::now())
            .map_err(|e| ClientError::decode(e.to_string()))?;
        self.store.write(credential.clone());

        info!(username, access_expires_at = %credential.access_expires_at, "Logged in");
        self.events.publish(SessionEvent::LoggedIn {
            access_expires_at: credential.access_expires_at,
        });

        Ok(LoginOutcome {
            user: data.user,
            credential,
        })
    }

    /// End the session.
    ///
    /// The server is told to revoke the refresh token on a best-effort basis;
    /// the local credential is cleared either way.
    pub async fn logout(&self) {
        if let Some(credential) = self.store.read() {
            let result = match ApiRequest::post(LOGOUT_PATH).json(&LogoutRequest {
                refresh_token: &credential.refresh_token,
            }) {
                Ok(request) => self.api.execute::<Value>(request.skip_auth()).await.map(drop),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(error = %e, "Server-side logout failed (non-fatal)");
            }
        }

        self.store.clear();
        info!("Logged out");
        self.events.publish(SessionEvent::LoggedOut);
    }
}

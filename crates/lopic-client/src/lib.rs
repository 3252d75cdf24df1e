//! lopic-client: authenticated API access and real-time events for the lopic
//! image host.
//!
//! Every API call carries a short-lived access token. The client keeps that
//! token fresh without the caller noticing, and keeps one WebSocket open for
//! upload and deletion progress.
//!
//! ## Credentials
//!
//! - [`CredentialStore`] - Where the current access/refresh pair lives
//! - [`RefreshCoordinator`] - Single-flight renewal; concurrent callers share one refresh call
//! - [`ProactiveRenewal`] - Background renewal shortly before the access token expires
//!
//! ## HTTP
//!
//! - [`ApiClient`] - Attaches the token, renews and replays once on a 401
//! - [`DataResponse`] - The `{message, data}` envelope every response is normalized to
//!
//! ## Events
//!
//! - [`EventChannel`] - WebSocket connection with per-tag observers
//! - [`EventMessage`] - Closed set of server messages
//!
//! ## Session
//!
//! - [`SessionEvent`] - Login, renewal, termination and logout notifications
//!
//! The client never prompts or navigates. When renewal fails the store is
//! wiped and [`SessionEvent::Terminated`] is published; what happens next is up
//! to the application.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod http;
pub mod session;

use std::sync::Arc;

use tokio::sync::broadcast;

pub use auth::{Authenticator, LoginOutcome};
pub use config::{ClientConfig, ProxyConfig};
pub use credentials::{
    Credential, CredentialStore, FileCredentialStore, HttpTokenRenewer, MemoryCredentialStore,
    ProactiveRenewal, RefreshCoordinator, RenewalError, RenewalPhase, TokenRenewer,
};
pub use error::{ClientError, FrameError, Result};
pub use events::{ChannelEvent, EventChannel, EventMessage, EventTag, ListenerId};
pub use http::{ApiClient, ApiRequest, DataResponse};
pub use session::{SessionEvent, SessionEvents};

/// Everything needed to talk to one lopic server, wired together.
#[derive(Clone)]
pub struct LopicClient {
    config: Arc<ClientConfig>,
    store: Arc<dyn CredentialStore>,
    session: SessionEvents,
    api: ApiClient,
    auth: Authenticator,
    channel: Arc<EventChannel>,
}

impl LopicClient {
    /// Create a client renewing against the server's refresh endpoint.
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let http = http::build_http_client(&config);
        let endpoint = config.endpoint(config::REFRESH_PATH)?;
        let renewer = HttpTokenRenewer::new(http.clone(), endpoint);
        Ok(Self::assemble(config, store, http, Arc::new(renewer)))
    }

    /// Create a client with a custom renewal implementation.
    pub fn with_renewer(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        renewer: Arc<dyn TokenRenewer>,
    ) -> Self {
        let http = http::build_http_client(&config);
        Self::assemble(config, store, http, renewer)
    }

    fn assemble(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        http: reqwest::Client,
        renewer: Arc<dyn TokenRenewer>,
    ) -> Self {
        let session = SessionEvents::new();
        let coordinator = RefreshCoordinator::new(store.clone(), renewer, session.clone());
        let proactive = ProactiveRenewal::new(coordinator.clone(), config.renewal_buffer);
        let api = ApiClient::new(
            http,
            config.server_url.clone(),
            store.clone(),
            coordinator,
            proactive,
        );
        let auth = Authenticator::new(api.clone(), store.clone(), session.clone());
        let channel = Arc::new(EventChannel::new(&config, store.clone()));

        Self {
            config: Arc::new(config),
            store,
            session,
            api,
            auth,
            channel,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn events(&self) -> &Arc<EventChannel> {
        &self.channel
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Current credential, if logged in.
    pub fn credential(&self) -> Option<Credential> {
        self.store.read()
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        self.auth.login(username, password).await
    }

    /// Close the event channel and end the session.
    pub async fn logout(&self) {
        self.channel.disconnect().await;
        self.auth.logout().await;
    }

    /// Renew now, or join the renewal already in flight.
    pub async fn renew(&self) -> Result<String> {
        Ok(self.api.coordinator().renew().await?)
    }
}

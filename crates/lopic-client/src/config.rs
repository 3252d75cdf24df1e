//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;

pub const DEFAULT_USER_AGENT: &str = concat!("lopic-client/", env!("CARGO_PKG_VERSION"));

/// Path of the token renewal endpoint.
pub const REFRESH_PATH: &str = "/api/auth/refresh";
/// Path of the login endpoint.
pub const LOGIN_PATH: &str = "/api/auth/login";
/// Path of the logout endpoint.
pub const LOGOUT_PATH: &str = "/api/auth/logout";
/// Path of the real-time event endpoint.
pub const DEFAULT_EVENTS_PATH: &str = "/ws/upload";

/// Renew proactively when the access token expires within this window.
pub const DEFAULT_RENEWAL_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Proxy settings for the HTTP client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Disabled means no proxy at all, not even system/env proxies.
    pub enabled: bool,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Fall back to system/env proxies when no explicit URL is set.
    pub use_system_proxy: bool,
}

/// Configurable options for [`LopicClient`](crate::LopicClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the lopic server, e.g. `https://img.example.com/`.
    pub server_url: Url,

    /// Proactive renewal window before access-token expiry.
    pub renewal_buffer: Duration,

    /// Overall timeout for a single HTTP request. Zero disables it.
    pub request_timeout: Duration,

    /// Connection timeout for HTTP requests.
    pub connect_timeout: Duration,

    /// User agent string
    pub user_agent: String,

    /// Path of the event channel endpoint.
    pub events_path: String,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,
}

impl ClientConfig {
    /// Create a configuration for the given server with default settings.
    ///
    /// The server path is treated as a directory, so `https://host/lopic` and
    /// `https://host/lopic/` resolve API paths the same way.
    pub fn new(server_url: &str) -> Result<Self> {
        let mut server_url = Url::parse(server_url)?;
        if !server_url.path().ends_with('/') {
            let path = format!("{}/", server_url.path());
            server_url.set_path(&path);
        }

        Ok(Self {
            server_url,
            renewal_buffer: DEFAULT_RENEWAL_BUFFER,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            events_path: DEFAULT_EVENTS_PATH.to_owned(),
            proxy: None,
        })
    }

    pub fn with_renewal_buffer(mut self, buffer: Duration) -> Self {
        self.renewal_buffer = buffer;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_events_path(mut self, path: impl Into<String>) -> Self {
        self.events_path = path.into();
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Resolve an API path against the server URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.server_url.join(path.trim_start_matches('/'))?)
    }
}

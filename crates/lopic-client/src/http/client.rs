//! `reqwest::Client` construction.

use std::sync::Once;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{ClientConfig, ProxyConfig};

/// Install the aws-lc-rs rustls provider for HTTPS and `wss://`.
///
/// Safe to call repeatedly; only the first call does anything.
pub fn install_rustls_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            debug!("rustls CryptoProvider already installed by another crate");
        }
    });
}

/// Where outbound requests go.
#[derive(Debug)]
enum Route {
    /// reqwest defaults, honouring `HTTP(S)_PROXY` and system settings.
    System,
    /// Straight to the server, ignoring the environment.
    Direct,
    Proxy(reqwest::Proxy),
}

fn route(proxy: Option<&ProxyConfig>) -> Route {
    let Some(proxy) = proxy else {
        return Route::System;
    };
    if !proxy.enabled {
        return Route::Direct;
    }

    match proxy.url.as_deref() {
        Some(url) => match reqwest::Proxy::all(url) {
            Ok(via) => match (&proxy.username, &proxy.password) {
                (Some(username), Some(password)) => Route::Proxy(via.basic_auth(username, password)),
                _ => Route::Proxy(via),
            },
            Err(e) => {
                warn!(proxy_url = %url, error = %e, "Invalid proxy URL, connecting directly");
                Route::Direct
            }
        },
        None if proxy.use_system_proxy => Route::System,
        None => Route::Direct,
    }
}

/// Build the HTTP client shared by the request pipeline and the renewal call.
pub fn build_http_client(config: &ClientConfig) -> reqwest::Client {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.connect_timeout);
    if config.request_timeout > Duration::ZERO {
        builder = builder.timeout(config.request_timeout);
    }

    builder = match route(config.proxy.as_ref()) {
        Route::System => builder,
        Route::Direct => builder.no_proxy(),
        Route::Proxy(proxy) => builder.proxy(proxy),
    };

    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build configured HTTP client, using defaults");
        reqwest::Client::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(enabled: bool, url: Option<&str>, use_system_proxy: bool) -> ProxyConfig {
        ProxyConfig {
            enabled,
            url: url.map(str::to_string),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            use_system_proxy,
        }
    }

    #[test]
    fn test_route_selection() {
        assert!(matches!(route(None), Route::System));
        assert!(matches!(
            route(Some(&proxy(false, Some("http://127.0.0.1:8080"), true))),
            Route::Direct
        ));
        assert!(matches!(
            route(Some(&proxy(true, Some("http://127.0.0.1:8080"), false))),
            Route::Proxy(_)
        ));
        assert!(matches!(route(Some(&proxy(true, None, true))), Route::System));
        assert!(matches!(route(Some(&proxy(true, None, false))), Route::Direct));
    }

    #[test]
    fn test_invalid_proxy_url_connects_directly() {
        assert!(matches!(
            route(Some(&proxy(true, Some("::not a proxy::"), false))),
            Route::Direct
        ));

        let config = ClientConfig::new("http://localhost:6060")
            .unwrap()
            .with_proxy(proxy(true, Some("::not a proxy::"), false));
        let _client = build_http_client(&config);
    }
}

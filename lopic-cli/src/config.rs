use std::path::{Path, PathBuf};
use std::time::Duration;

use lopic_client::{ClientConfig, ProxyConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

const APP_DIR: &str = "lopic";
const CONFIG_FILE: &str = "config.toml";
const CREDENTIALS_FILE: &str = "credentials.json";
const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the lopic server
    pub server_url: String,

    /// Renew the access token this many seconds before it expires
    pub renewal_buffer_secs: u64,

    /// Overall request timeout in seconds, 0 disables it
    pub request_timeout_secs: u64,

    pub connect_timeout_secs: u64,

    /// Where the session is saved; defaults to the platform data directory
    pub credentials_file: Option<PathBuf>,

    /// Directory for rotated log files; console only when unset
    pub log_dir: Option<PathBuf>,

    /// Watch: first reconnect delay after the event channel drops
    pub reconnect_base_delay_ms: u64,

    /// Watch: upper bound for the reconnect delay
    pub reconnect_max_delay_ms: u64,

    /// Watch: give up after this many consecutive failed reconnects
    pub max_reconnect_attempts: u32,

    pub proxy: Option<ProxyConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:6060".to_string(),
            renewal_buffer_secs: 300,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            credentials_file: None,
            log_dir: None,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60_000,
            max_reconnect_attempts: 10,
            proxy: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = resolve_path(path);
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        let config = toml::from_str(&raw)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = resolve_path(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Overwrite the configuration file with the defaults.
    pub fn reset(path: Option<&Path>) -> Result<()> {
        Self::default().save(path)
    }

    /// Render for display. Secrets are redacted.
    pub fn show(&self) -> Result<String> {
        let mut shown = self.clone();
        if let Some(password) = shown.proxy.as_mut().and_then(|p| p.password.as_mut()) {
            *password = REDACTED.to_string();
        }
        Ok(toml::to_string_pretty(&shown)?)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_file.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join(CREDENTIALS_FILE)
        })
    }

    /// Build the client configuration, with `server` taking precedence over the file.
    pub fn client_config(&self, server: Option<&str>) -> Result<ClientConfig> {
        let mut config = ClientConfig::new(server.unwrap_or(&self.server_url))?
            .with_renewal_buffer(Duration::from_secs(self.renewal_buffer_secs))
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs));
        if let Some(proxy) = self.proxy.clone() {
            config = config.with_proxy(proxy);
        }
        Ok(config)
    }
}

fn resolve_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf).unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(CONFIG_FILE)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_load_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = AppConfig {
            server_url: "https://img.example.com".to_string(),
            renewal_buffer_secs: 120,
            ..AppConfig::default()
        };
        config.save(Some(&path)).unwrap();
        assert_eq!(AppConfig::load(Some(&path)).unwrap(), config);

        AppConfig::reset(Some(&path)).unwrap();
        assert_eq!(AppConfig::load(Some(&path)).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_url = \"https://img.example.com\"\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server_url, "https://img.example.com");
        assert_eq!(config.renewal_buffer_secs, 300);
    }

    #[test]
    fn test_show_redacts_proxy_password() {
        let config = AppConfig {
            proxy: Some(ProxyConfig {
                enabled: true,
                url: Some("http://127.0.0.1:8080".to_string()),
                username: Some("user".to_string()),
                password: Some("s3cret".to_string()),
                use_system_proxy: false,
            }),
            ..AppConfig::default()
        };

        let shown = config.show().unwrap();
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains(REDACTED));
        assert!(shown.contains("user"));
        // The saved file keeps the real value.
        assert_eq!(
            config.proxy.as_ref().and_then(|p| p.password.as_deref()),
            Some("s3cret")
        );
    }

    #[test]
    fn test_client_config_override() {
        let config = AppConfig::default();
        let client = config.client_config(Some("https://other.example.com")).unwrap();
        assert_eq!(client.server_url.as_str(), "https://other.example.com/");
        assert_eq!(client.renewal_buffer, Duration::from_secs(300));
        assert!(config.client_config(Some("nope")).is_err());
    }
}

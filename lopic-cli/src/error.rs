use lopic_client::ClientError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Prompt failed: {0}")]
    Prompt(#[from] inquire::InquireError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Session ended: {0}")]
    SessionEnded(String),

    #[error("Event channel lost after {0} reconnect attempts")]
    ReconnectExhausted(u32),
}

impl AppError {
    /// Check if the user has to log in again.
    pub fn requires_login(&self) -> bool {
        match self {
            Self::Client(e) => e.requires_relogin(),
            Self::SessionEnded(_) => true,
            _ => false,
        }
    }
}

use std::time::Duration;

use chrono::{Local, Utc};
use lopic_client::{
    ApiRequest, ChannelEvent, ClientError, DataResponse, EventMessage, EventTag, LopicClient,
    ProactiveRenewal, SessionEvent,
};
use serde_json::{Value, json};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, Result};

/// How often `watch` checks whether the access token is about to expire.
const RENEWAL_CHECK_INTERVAL: Duration = Duration::from_secs(60);

pub struct CommandExecutor {
    client: LopicClient,
    config: AppConfig,
}

impl CommandExecutor {
    pub fn new(client: LopicClient, config: AppConfig) -> Self {
        Self { client, config }
    }

    pub async fn login(&self, username: &str, password: Option<String>) -> Result<()> {
        let password = resolve_password(password, prompt_password)?;

        let outcome = self.client.login(username, &password).await?;
        println!(
            "✓ Logged in as {} (access token valid until {})",
            username,
            outcome
                .credential
                .access_expires_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
        );
        if !outcome.user.is_null() {
            println!("{}", serde_json::to_string_pretty(&outcome.user)?);
        }
        Ok(())
    }

    pub async fn logout(&self) -> Result<()> {
        if self.client.credential().is_none() {
            println!("Not logged in");
            return Ok(());
        }
        self.client.logout().await;
        println!("✓ Logged out");
        Ok(())
    }

    pub fn status(&self) -> Result<()> {
        println!("Server: {}", self.client.config().server_url);
        let Some(credential) = self.client.credential() else {
            println!("Session: not logged in");
            return Ok(());
        };

        let now = Utc::now();
        let remaining = credential.access_remaining(now);
        println!("Session: logged in");
        println!(
            "Access token expires: {} ({})",
            credential
                .access_expires_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            if remaining.num_seconds() > 0 {
                format!("in {}s", remaining.num_seconds())
            } else {
                "expired, renewed on next request".to_string()
            }
        );
        println!(
            "Refresh token expires: {}{}",
            credential
                .refresh_expires_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            if credential.is_refresh_expired(now) {
                " (expired, log in again)"
            } else {
                ""
            }
        );
        Ok(())
    }

    /// Send `request` with an optional JSON body and print the normalized response.
    pub async fn call(&self, request: ApiRequest, data: Option<&str>) -> Result<()> {
        let request = match data {
            Some(raw) => {
                let body: Value = serde_json::from_str(raw)
                    .map_err(|e| AppError::InvalidInput(format!("--data is not valid JSON: {e}")))?;
                request.with_body(body)
            }
            None => request,
        };

        debug!(method = %request.method, path = %request.path, "Calling API");
        let response: DataResponse<Value> = self.client.api().execute(request).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        Ok(())
    }

    /// Print event messages as JSON lines until interrupted or the session ends.
    ///
    /// The channel is reopened with the new token after every renewal and
    /// reconnected with exponential backoff when it drops.
    pub async fn watch(&self, tags: &[String]) -> Result<()> {
        let printed = parse_tags(tags)?;
        if self.client.credential().is_none() {
            return Err(ClientError::NotLoggedIn.into());
        }

        let channel = self.client.events().clone();
        for tag in printed {
            channel.add_listener(tag, |event: &ChannelEvent| {
                if let Some(message) = event.as_message() {
                    match render_message(message) {
                        Ok(line) => println!("{line}"),
                        Err(e) => warn!("Failed to render {} event: {}", message.tag(), e),
                    }
                }
            });
        }

        let (lifecycle_tx, mut lifecycle_rx) = mpsc::unbounded_channel();
        for tag in [EventTag::Open, EventTag::Close, EventTag::Error] {
            let tx = lifecycle_tx.clone();
            channel.add_listener(tag, move |event: &ChannelEvent| {
                let _ = tx.send(event.clone());
            });
        }
        drop(lifecycle_tx);

        let mut session = self.client.subscribe();
        let proactive = ProactiveRenewal::new(
            self.client.api().coordinator().clone(),
            self.client.config().renewal_buffer,
        );
        let mut renewal_check = tokio::time::interval(RENEWAL_CHECK_INTERVAL);
        renewal_check.set_missed_tick_behavior(MissedTickBehavior::Skip);

        channel.connect().await?;
        info!("Watching events from {}", self.client.config().server_url);

        let base_delay = self.config.reconnect_base_delay_ms;
        let mut delay = base_delay;
        let mut attempts: u32 = 0;
        let mut next_attempt: Option<Instant> = None;

        let result = loop {
            let deadline = next_attempt.unwrap_or_else(Instant::now);

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, closing event channel");
                    break Ok(());
                }

                Some(event) = lifecycle_rx.recv() => match event {
                    ChannelEvent::Open => {
                        info!("Event channel open");
                        attempts = 0;
                        delay = base_delay;
                        next_attempt = None;
                    }
                    ChannelEvent::Error { message } => warn!("Event channel error: {}", message),
                    ChannelEvent::Close { code, reason } => {
                        info!(?code, "Event channel closed: {}", reason);
                        if next_attempt.is_none() {
                            next_attempt = Some(Instant::now() + Duration::from_millis(delay));
                        }
                    }
                    ChannelEvent::Message(_) => {}
                },

                _ = tokio::time::sleep_until(deadline), if next_attempt.is_some() => {
                    next_attempt = None;
                    if channel.is_connected() {
                        continue;
                    }
                    if attempts >= self.config.max_reconnect_attempts {
                        error!("Max reconnect attempts reached");
                        break Err(AppError::ReconnectExhausted(attempts));
                    }
                    attempts += 1;
                    delay = delay.saturating_mul(2).min(self.config.reconnect_max_delay_ms);

                    match self.client.credential() {
                        Some(credential) if proactive.needs_renewal(&credential, Utc::now()) => {
                            if let Err(e) = self.client.renew().await {
                                break Err(e.into());
                            }
                        }
                        Some(_) => {}
                        None => break Err(ClientError::NotLoggedIn.into()),
                    }

                    info!(attempt = attempts, "Reconnecting event channel");
                    if let Err(e) = channel.connect().await {
                        break Err(e.into());
                    }
                }

                received = session.recv() => match received {
                    Ok(SessionEvent::Renewed { .. }) => {
                        info!("Credential renewed, reopening event channel");
                        if let Err(e) = channel.reconnect().await {
                            break Err(e.into());
                        }
                    }
                    Ok(SessionEvent::Terminated { reason }) => break Err(AppError::SessionEnded(reason)),
                    Ok(SessionEvent::LoggedOut) => {
                        break Err(AppError::SessionEnded("logged out".to_string()));
                    }
                    Ok(SessionEvent::LoggedIn { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => warn!("Missed {} session events", skipped),
                    Err(RecvError::Closed) => break Ok(()),
                },

                _ = renewal_check.tick() => {
                    if let Some(credential) = self.client.credential() {
                        proactive.check(&credential);
                    }
                }
            }
        };

        channel.disconnect().await;
        result
    }
}

/// Read the password without echoing it.
fn prompt_password() -> Result<String> {
    Ok(inquire::Password::new("Password:")
        .without_confirmation()
        .with_display_mode(inquire::PasswordDisplayMode::Hidden)
        .prompt()?)
}

fn resolve_password(
    given: Option<String>,
    prompt: impl FnOnce() -> Result<String>,
) -> Result<String> {
    let password = match given {
        Some(password) => password,
        None => prompt()?,
    };
    if password.is_empty() {
        return Err(AppError::InvalidInput("password must not be empty".to_string()));
    }
    Ok(password)
}

/// Message tags to print; all of them when none are given.
fn parse_tags(tags: &[String]) -> Result<Vec<EventTag>> {
    if tags.is_empty() {
        return Ok(EventTag::MESSAGE_TAGS.to_vec());
    }
    tags.iter()
        .map(|tag| {
            EventTag::from_wire(tag).ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "unknown event tag `{tag}`, expected one of: {}",
                    EventTag::MESSAGE_TAGS.map(|t| t.as_str()).join(", ")
                ))
            })
        })
        .collect()
}

fn render_message(message: &EventMessage) -> serde_json::Result<String> {
    let payload = match message {
        EventMessage::UploadStart(p) => serde_json::to_value(p),
        EventMessage::UploadProgress(p) => serde_json::to_value(p),
        EventMessage::UploadError(p) => serde_json::to_value(p),
        EventMessage::UploadComplete(p) => serde_json::to_value(p),
        EventMessage::UploadProcessingStart(p)
        | EventMessage::UploadProcessingComplete(p)
        | EventMessage::DeleteSuccess(p) => serde_json::to_value(p),
        EventMessage::UploadProcessingError(p)
        | EventMessage::DeleteError(p)
        | EventMessage::DeleteUserError(p) => serde_json::to_value(p),
        EventMessage::DeleteUserSuccess(p) => serde_json::to_value(p),
    }?;
    serde_json::to_string(&json!({
        "type": message.tag().as_str(),
        "payload": payload,
    }))
}

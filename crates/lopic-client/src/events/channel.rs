//! Persistent event connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::message::{ChannelEvent, EventTag, decode_frame};
use super::registry::{ListenerId, ListenerRegistry};
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::{ClientError, FrameError, Result};
use crate::http::install_rustls_provider;

/// Build the event endpoint URL for `server_url`.
///
/// `http` maps to `ws`, `https` to `wss`; the access token travels as the
/// `token` query parameter.
pub fn events_url(server_url: &Url, path: &str, access_token: &str) -> Result<Url> {
    let mut url = server_url.join(path.trim_start_matches('/'))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(ClientError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::UnsupportedScheme(url.scheme().to_string()))?;
    url.query_pairs_mut()
        .append_pair("token", &format!("Bearer {}", access_token));
    Ok(url)
}

struct ConnectionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// One WebSocket connection delivering tagged events to registered observers.
///
/// The token is read when connecting and never refreshed on a live
/// connection; call [`reconnect`](Self::reconnect) after a renewal.
pub struct EventChannel {
    server_url: Url,
    events_path: String,
    store: Arc<dyn CredentialStore>,
    registry: Arc<ListenerRegistry>,
    connected: Arc<AtomicBool>,
    connection: Mutex<Option<ConnectionHandle>>,
}

impl EventChannel {
    pub fn new(config: &ClientConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            server_url: config.server_url.clone(),
            events_path: config.events_path.clone(),
            store,
            registry: Arc::new(ListenerRegistry::new()),
            connected: Arc::new(AtomicBool::new(false)),
            connection: Mutex::new(None),
        }
    }

    /// Open the connection. No-op while a connection is open or opening.
    ///
    /// Only configuration problems are returned; transport failures reach the
    /// `error` and `close` observers.
    pub async fn connect(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if connection
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
        {
            trace!("Event channel already connected");
            return Ok(());
        }

        let token = self.store.access_token().ok_or(ClientError::NotLoggedIn)?;
        let url = events_url(&self.server_url, &self.events_path, &token)?;
        install_rustls_provider();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_connection(
            url,
            self.registry.clone(),
            self.connected.clone(),
            cancel.clone(),
        ));
        *connection = Some(ConnectionHandle { cancel, task });
        Ok(())
    }

    /// Close the connection. Idempotent.
    pub async fn disconnect(&self) {
        let handle = self.connection.lock().await.take();
        if let Some(handle) = handle {
            handle.cancel.cancel();
            if let Err(e) = handle.task.await {
                warn!(error = %e, "Event channel task ended abnormally");
            }
        }
    }

    /// Drop the current connection and open a new one with the current token.
    pub async fn reconnect(&self) -> Result<()> {
        self.disconnect().await;
        self.connect().await
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Register an observer for `tag`. Observers for one tag run in registration order.
    pub fn add_listener<F>(&self, tag: EventTag, callback: F) -> ListenerId
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.registry.add(tag, Arc::new(callback))
    }

    pub fn remove_listener(&self, tag: EventTag, id: ListenerId) -> bool {
        self.registry.remove(tag, id)
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.connection.get_mut().take() {
            handle.cancel.cancel();
        }
    }
}

async fn run_connection(
    url: Url,
    registry: Arc<ListenerRegistry>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    debug!(host = url.host_str().unwrap_or_default(), path = url.path(), "Connecting event channel");

    let connect_result = tokio::select! {
        _ = cancel.cancelled() => return,
        result = connect_async(url.as_str()) => result,
    };

    let stream = match connect_result {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!(error = %e, "Event channel connection failed");
            registry.dispatch(&ChannelEvent::Error {
                message: e.to_string(),
            });
            registry.dispatch(&ChannelEvent::Close {
                code: None,
                reason: e.to_string(),
            });
            return;
        }
    };

    info!("Event channel connected");
    connected.store(true, Ordering::SeqCst);
    registry.dispatch(&ChannelEvent::Open);

    let (mut write, mut read) = stream.split();
    let (code, reason) = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    trace!(error = %e, "Failed to send close frame");
                }
                break (Some(1000), "client disconnect".to_string());
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_frame(&registry, text.as_str()),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => handle_frame(&registry, text),
                    Err(e) => warn!(error = %e, "Dropping non-UTF-8 event frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Event channel closed by server");
                    break match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_string()),
                        None => (None, String::new()),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Event channel transport error");
                    registry.dispatch(&ChannelEvent::Error {
                        message: e.to_string(),
                    });
                    break (None, e.to_string());
                }
                None => break (None, "stream ended".to_string()),
            }
        }
    };

    connected.store(false, Ordering::SeqCst);
    info!(?code, %reason, "Event channel closed");
    registry.dispatch(&ChannelEvent::Close { code, reason });
}

fn handle_frame(registry: &ListenerRegistry, text: &str) {
    match decode_frame(text) {
        Ok(message) => {
            let tag = message.tag();
            let delivered = registry.dispatch(&ChannelEvent::Message(message));
            trace!(%tag, delivered, "Dispatched event");
        }
        Err(FrameError::UnknownTag(tag)) => debug!(%tag, "Ignoring event with unknown tag"),
        Err(e) => warn!(error = %e, "Dropping malformed event frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_url_scheme_and_token() {
        let server = Url::parse("https://img.example.com/").unwrap();
        let url = events_url(&server, "/ws/upload", "abc").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/ws/upload");
        let token: Vec<_> = url.query_pairs().collect();
        assert_eq!(token[0].0, "token");
        assert_eq!(token[0].1, "Bearer abc");

        let server = Url::parse("http://localhost:6060").unwrap();
        let url = events_url(&server, "/ws/upload", "abc").unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.port(), Some(6060));

        let server = Url::parse("ftp://example.com/").unwrap();
        assert!(matches!(
            events_url(&server, "/ws/upload", "abc"),
            Err(ClientError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[tokio::test]
    async fn test_connect_requires_credential() {
        let config = ClientConfig::new("http://127.0.0.1:9").unwrap();
        let channel = EventChannel::new(
            &config,
            Arc::new(crate::credentials::MemoryCredentialStore::new()),
        );
        assert!(matches!(channel.connect().await, Err(ClientError::NotLoggedIn)));
        assert!(!channel.is_connected());
        channel.disconnect().await;
    }
}

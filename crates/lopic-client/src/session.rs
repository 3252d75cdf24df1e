//! Session lifecycle events.
//!
//! The request layer never navigates or prompts on its own. It publishes these
//! events and the embedding application (the session owner) decides what to do,
//! e.g. show a login screen on [`SessionEvent::Terminated`] or reopen the event
//! channel on [`SessionEvent::Renewed`].

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Events broadcast when the session changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login stored a fresh credential.
    LoggedIn { access_expires_at: DateTime<Utc> },
    /// A renewal episode replaced the credential.
    Renewed { access_expires_at: DateTime<Utc> },
    /// Renewal failed; the credential store has been wiped.
    Terminated { reason: String },
    /// The user logged out explicitly.
    LoggedOut,
}

impl SessionEvent {
    /// Get a description of the event for logging.
    pub fn description(&self) -> String {
        match self {
            Self::LoggedIn { access_expires_at } => {
                format!("Logged in (access expires {})", access_expires_at)
            }
            Self::Renewed { access_expires_at } => {
                format!("Credential renewed (access expires {})", access_expires_at)
            }
            Self::Terminated { reason } => format!("Session terminated: {}", reason),
            Self::LoggedOut => "Logged out".to_string(),
        }
    }
}

/// Default channel capacity for session events.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Broadcaster for session events.
#[derive(Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    /// Create a new broadcaster with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new broadcaster with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish a session event.
    ///
    /// Returns the number of receivers that received the event, 0 without subscribers.
    pub fn publish(&self, event: SessionEvent) -> usize {
        tracing::debug!("Publishing session event: {}", event.description());
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let events = SessionEvents::new();
        assert_eq!(events.publish(SessionEvent::LoggedOut), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let events = SessionEvents::new();
        let mut first = events.subscribe();
        let mut second = events.subscribe();
        assert_eq!(events.subscriber_count(), 2);

        let delivered = events.publish(SessionEvent::Terminated {
            reason: "refresh rejected".to_string(),
        });
        assert_eq!(delivered, 2);

        for rx in [&mut first, &mut second] {
            match rx.recv().await.unwrap() {
                SessionEvent::Terminated { reason } => assert_eq!(reason, "refresh rejected"),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}

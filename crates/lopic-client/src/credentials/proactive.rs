//! Renewal ahead of expiry, piggybacked on outgoing traffic.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::coordinator::RefreshCoordinator;
use super::types::Credential;

/// Starts a background renewal when the access token is about to expire.
///
/// Shares the coordinator, and therefore the renewal state and waiter queue,
/// with the reactive 401 path.
#[derive(Clone)]
pub struct ProactiveRenewal {
    coordinator: RefreshCoordinator,
    buffer: chrono::Duration,
}

impl ProactiveRenewal {
    pub fn new(coordinator: RefreshCoordinator, buffer: Duration) -> Self {
        let buffer = chrono::Duration::from_std(buffer).unwrap_or(chrono::Duration::MAX);
        Self {
            coordinator,
            buffer,
        }
    }

    /// Check if `credential` is inside the renewal window at `now`.
    #[inline]
    pub fn needs_renewal(&self, credential: &Credential, now: DateTime<Utc>) -> bool {
        credential.access_expires_within(self.buffer, now)
    }

    /// Fire-and-forget check for one outgoing request.
    ///
    /// Returns `true` if this call started a renewal episode. Never waits and
    /// never fails; the outcome is logged by the episode itself.
    pub fn check(&self, credential: &Credential) -> bool {
        let now = Utc::now();
        if !self.needs_renewal(credential, now) {
            return false;
        }

        let started = self.coordinator.spawn_renewal();
        if started {
            debug!(
                remaining_secs = credential.access_remaining(now).num_seconds(),
                "Access token close to expiry, renewing in background"
            );
        }
        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::coordinator::RenewalPhase;
    use crate::credentials::coordinator::tests::{GatedRenewer, stale_credential};
    use crate::credentials::store::{CredentialStore, MemoryCredentialStore};
    use crate::session::SessionEvents;
    use std::sync::Arc;

    fn setup(credential: Credential) -> (ProactiveRenewal, RefreshCoordinator, Arc<GatedRenewer>) {
        let store: Arc<dyn CredentialStore> =
            Arc::new(MemoryCredentialStore::with_credential(credential));
        let renewer = Arc::new(GatedRenewer::succeeding("proactive"));
        let coordinator = RefreshCoordinator::new(store, renewer.clone(), SessionEvents::new());
        let trigger = ProactiveRenewal::new(coordinator.clone(), Duration::from_secs(300));
        (trigger, coordinator, renewer)
    }

    #[tokio::test]
    async fn test_far_from_expiry_does_nothing() {
        let mut credential = stale_credential();
        credential.access_expires_at = Utc::now() + chrono::Duration::minutes(10);
        let (trigger, coordinator, renewer) = setup(credential.clone());

        assert!(!trigger.check(&credential));
        assert_eq!(coordinator.phase(), RenewalPhase::Idle);
        tokio::task::yield_now().await;
        assert_eq!(renewer.calls(), 0);
    }

    #[tokio::test]
    async fn test_near_expiry_starts_background_renewal() {
        let credential = stale_credential();
        let (trigger, coordinator, renewer) = setup(credential.clone());

        assert!(trigger.check(&credential));
        assert_eq!(coordinator.phase(), RenewalPhase::Renewing);

        // A second request in the same window joins instead of starting another episode.
        assert!(!trigger.check(&credential));
        assert_eq!(coordinator.waiter_count(), 1);

        renewer.release();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while coordinator.is_renewing() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(renewer.calls(), 1);
    }

    #[tokio::test]
    async fn test_joins_reactive_episode_without_second_call() {
        let credential = stale_credential();
        let (trigger, coordinator, renewer) = setup(credential.clone());

        let reactive = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.renew().await })
        };
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while renewer.calls() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert!(!trigger.check(&credential));
        assert!(!coordinator.spawn_renewal());

        renewer.release();
        assert_eq!(reactive.await.unwrap().unwrap(), "proactive");
        assert_eq!(renewer.calls(), 1);
    }

    #[test]
    fn test_needs_renewal_window() {
        let now = Utc::now();
        let mut credential = stale_credential();
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let coordinator = RefreshCoordinator::new(
            store,
            Arc::new(GatedRenewer::succeeding("x")),
            SessionEvents::new(),
        );
        let trigger = ProactiveRenewal::new(coordinator, Duration::from_secs(300));

        credential.access_expires_at = now + chrono::Duration::seconds(299);
        assert!(trigger.needs_renewal(&credential, now));
        credential.access_expires_at = now + chrono::Duration::seconds(301);
        assert!(!trigger.needs_renewal(&credential, now));
        credential.access_expires_at = now - chrono::Duration::seconds(1);
        assert!(trigger.needs_renewal(&credential, now));
    }
}

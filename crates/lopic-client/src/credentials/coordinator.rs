//! Single-flight token renewal.
//!
//! A renewal *episode* runs `Idle -> Renewing -> Idle`. The first caller to
//! request renewal while idle starts the episode; everyone arriving while it is
//! in flight is queued as a waiter and receives the outcome, in the order they
//! joined. [`RefreshCoordinator::renew`] runs the episode on its own task, so
//! dropping any caller never loses a refresh the server already answered.
//!
//! The gate is a short synchronous critical section that never spans an
//! `.await`, so checking `Idle` and switching to `Renewing` is one step.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, trace, warn};

use super::error::RenewalError;
use super::renewer::TokenRenewer;
use super::store::CredentialStore;
use super::types::Credential;
use crate::session::{SessionEvent, SessionEvents};

/// Outcome delivered to every party of an episode: the new access token.
pub type RenewalOutcome = Result<String, RenewalError>;

/// Observable renewal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalPhase {
    Idle,
    Renewing,
}

enum State {
    Idle,
    Renewing {
        waiters: Vec<oneshot::Sender<RenewalOutcome>>,
    },
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    renewer: Arc<dyn TokenRenewer>,
    events: SessionEvents,
    state: Mutex<State>,
}

/// Coordinates renewal episodes for one credential store.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

/// Result of [`RefreshCoordinator::request_renewal`].
pub enum RenewalTicket {
    /// The caller owns the episode and must drive it with [`RenewalEpisode::run`].
    Owner(RenewalEpisode),
    /// An episode is already in flight; await its outcome.
    Waiter(RenewalWaiter),
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        renewer: Arc<dyn TokenRenewer>,
        events: SessionEvents,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                renewer,
                events,
                state: Mutex::new(State::Idle),
            }),
        }
    }

    pub fn phase(&self) -> RenewalPhase {
        match *self.inner.state.lock() {
            State::Idle => RenewalPhase::Idle,
            State::Renewing { .. } => RenewalPhase::Renewing,
        }
    }

    #[inline]
    pub fn is_renewing(&self) -> bool {
        self.phase() == RenewalPhase::Renewing
    }

    /// Number of callers queued behind the current episode.
    pub fn waiter_count(&self) -> usize {
        match &*self.inner.state.lock() {
            State::Idle => 0,
            State::Renewing { waiters } => waiters.len(),
        }
    }

    /// Become the owner of a new episode, or join the one in flight.
    pub fn request_renewal(&self) -> RenewalTicket {
        let mut state = self.inner.state.lock();
        match &mut *state {
            State::Idle => {
                *state = State::Renewing {
                    waiters: Vec::new(),
                };
                trace!("Starting renewal episode");
                RenewalTicket::Owner(RenewalEpisode {
                    coordinator: self.clone(),
                    settled: false,
                })
            }
            State::Renewing { waiters } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                trace!(position = waiters.len(), "Joined renewal episode in flight");
                RenewalTicket::Waiter(RenewalWaiter { rx })
            }
        }
    }

    /// Renew, or wait for the renewal already in flight.
    ///
    /// The episode runs on a spawned task and the caller waits like every other
    /// party, so cancelling the caller does not abandon the episode. Must be
    /// called within a tokio runtime.
    pub async fn renew(&self) -> RenewalOutcome {
        let (tx, rx) = oneshot::channel();
        let episode = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                State::Idle => {
                    *state = State::Renewing { waiters: vec![tx] };
                    trace!("Starting renewal episode");
                    Some(RenewalEpisode {
                        coordinator: self.clone(),
                        settled: false,
                    })
                }
                State::Renewing { waiters } => {
                    waiters.push(tx);
                    trace!(position = waiters.len(), "Joined renewal episode in flight");
                    None
                }
            }
        };

        if let Some(episode) = episode {
            tokio::spawn(episode.run());
        }
        RenewalWaiter { rx }.wait().await
    }

    /// Start an episode in the background if none is in flight.
    ///
    /// Returns `true` if this call started one. Must be called within a tokio runtime.
    pub fn spawn_renewal(&self) -> bool {
        match self.request_renewal() {
            RenewalTicket::Owner(episode) => {
                tokio::spawn(async move {
                    match episode.run().await {
                        Ok(_) => debug!("Token renewed proactively"),
                        Err(e) => warn!(error = %e, "Proactive token renewal failed"),
                    }
                });
                true
            }
            // Already renewing: the queued receiver is dropped right away.
            RenewalTicket::Waiter(_) => false,
        }
    }

    async fn perform(&self) -> Result<Credential, RenewalError> {
        let refresh_token = self
            .inner
            .store
            .read()
            .map(|c| c.refresh_token)
            .filter(|t| !t.is_empty())
            .ok_or(RenewalError::NoRefreshCredential)?;

        debug!("Requesting new access token");
        let response = self.inner.renewer.renew(&refresh_token).await?;
        Credential::from_token_response(response, Utc::now())
    }

    /// Reset to `Idle` and resolve every queued waiter in join order.
    fn settle(&self, outcome: &RenewalOutcome) {
        let waiters = {
            let mut state = self.inner.state.lock();
            match std::mem::replace(&mut *state, State::Idle) {
                State::Renewing { waiters } => waiters,
                State::Idle => Vec::new(),
            }
        };

        let total = waiters.len();
        for (position, tx) in waiters.into_iter().enumerate() {
            if tx.send(outcome.clone()).is_err() {
                trace!(position, "Renewal waiter went away before resolution");
            }
        }
        if total > 0 {
            debug!(waiters = total, ok = outcome.is_ok(), "Resolved renewal waiters");
        }
    }
}

/// Ownership of one renewal episode.
///
/// Dropping it before [`run`](Self::run) completes resets the coordinator and
/// rejects all waiters with [`RenewalError::Abandoned`].
#[must_use = "an unrun episode blocks renewals until dropped"]
pub struct RenewalEpisode {
    coordinator: RefreshCoordinator,
    settled: bool,
}

impl RenewalEpisode {
    /// Perform the renewal and fan the outcome out to every waiter.
    #[instrument(name = "token_renewal", skip(self))]
    pub async fn run(mut self) -> RenewalOutcome {
        let coordinator = self.coordinator.clone();
        let inner = &coordinator.inner;

        match coordinator.perform().await {
            Ok(credential) => {
                let access_token = credential.access_token.clone();
                let access_expires_at = credential.access_expires_at;
                inner.store.write(credential);

                let outcome = Ok(access_token);
                self.settle(&outcome);

                info!(%access_expires_at, "Credential renewal successful");
                inner
                    .events
                    .publish(SessionEvent::Renewed { access_expires_at });
                outcome
            }
            Err(e) => {
                error!(error = %e, "Credential renewal failed - terminating session");
                inner.store.clear();

                let reason = e.to_string();
                let outcome = Err(e);
                self.settle(&outcome);
                inner.events.publish(SessionEvent::Terminated { reason });
                outcome
            }
        }
    }

    /// Disarm the drop guard and fan `outcome` out.
    fn settle(&mut self, outcome: &RenewalOutcome) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for RenewalEpisode {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Renewal episode dropped before completion");
            self.coordinator.settle(&Err(RenewalError::Abandoned));
        }
    }
}

/// A caller queued behind an episode in flight.
pub struct RenewalWaiter {
    rx: oneshot::Receiver<RenewalOutcome>,
}

impl RenewalWaiter {
    /// Wait for the owner's outcome. Resolves exactly once.
    pub async fn wait(self) -> RenewalOutcome {
        self.rx.await.unwrap_or(Err(RenewalError::Abandoned))
    }
}

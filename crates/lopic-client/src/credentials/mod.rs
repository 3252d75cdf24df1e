//! Credential lifecycle.
//!
//! - [`store`]: where the current credential lives
//! - [`renewer`]: the remote refresh call
//! - [`coordinator`]: single-flight renewal episodes shared by every caller
//! - [`proactive`]: renewal ahead of expiry, driven by outgoing requests

pub mod coordinator;
pub mod error;
pub mod proactive;
pub mod renewer;
pub mod store;
pub mod types;

pub use coordinator::{
    RefreshCoordinator, RenewalEpisode, RenewalOutcome, RenewalPhase, RenewalTicket,
    RenewalWaiter,
};
pub use error::RenewalError;
pub use proactive::ProactiveRenewal;
pub use renewer::{HttpTokenRenewer, TokenRenewer};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use types::{Credential, TokenResponse};

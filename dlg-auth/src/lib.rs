//! # dlg-auth: delegated authorization for agents
//!
//! Issues scoped, expiring grants and checks them before a delegated action
//! is allowed to run.
//!
//! ## Strategies
//!
//! - **Bearer tokens**: the grant lives in a [`GrantStore`]; the client holds
//!   an opaque id.
//! - **Signed credentials**: the grant is signed with the issuer's Ed25519
//!   key; the client holds a self-contained bundle any holder of the public
//!   key can check.
//!
//! Both implement [`GrantIssuer`] and [`GrantVerifier`], and [`Authority`]
//! picks one from configuration.
//!
//! ## Flow
//!
//! ```text
//!   client ──issue(subject, scope, ttl)──▶ GrantIssuer ──▶ artifact
//!   client ──invoke(artifact, payload)───▶ DelegatedAction
//!                                             │ verify(artifact, scope)
//!                                             ▼
//!                                        GrantVerifier
//!                                             │
//!                    Valid ──▶ operation runs ─┴─ Invalid ──▶ denial {reason}
//! ```

#![warn(missing_docs)]

pub mod action;
pub mod authority;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod grant;
pub mod issuer;
pub mod scope;
pub mod store;
pub mod verification;

// Re-exports for convenience
pub use action::{ActionOutcome, Authorization, DelegatedAction, Denial, InvocationState, Operation};
pub use authority::{
    Authority, BearerTokenAuthority, CredentialAuthority, CredentialVerifier, Strategy,
};
pub use calendar::{
    Calendar, ConvertTime, ConvertTimeRequest, CurrentTime, FindSlot, FindSlotRequest, Slot, Zone,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GatewayConfig;
pub use credentials::{SignedBundle, SigningKey};
pub use error::{ActionError, DenialReason, GrantError, Result};
pub use grant::{Grant, GrantId, IntegrityProof, Subject};
pub use issuer::{GrantIssuer, IssuancePolicy};
pub use scope::Scope;
pub use store::{FileGrantStore, GrantStore, InMemoryGrantStore};
pub use verification::{GrantVerifier, VerificationResult};

/// Default grant lifetime (1 hour)
pub const DEFAULT_TTL_SECS: u64 = 3600;

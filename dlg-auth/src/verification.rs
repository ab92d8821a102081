//! Grant Verification
//!
//! Checks a presented bearer artifact against a required scope. Checks run
//! in a fixed order, signature or existence first, then expiry, then scope,
//! and stop at the first failure so every denial carries exactly one reason.

use crate::{
    error::DenialReason,
    grant::{Grant, Subject},
    scope::Scope,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of verifying an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationResult {
    /// Artifact is genuine, live and covers the required scope
    Valid {
        /// Who the grant was issued for
        subject: Subject,

        /// Full scope set of the grant
        scope: Scope,
    },

    /// Artifact was refused
    Invalid {
        /// Single reason for the refusal
        reason: DenialReason,
    },
}

impl VerificationResult {
    /// Create a refusal
    pub fn invalid(reason: DenialReason) -> Self {
        Self::Invalid { reason }
    }

    /// Whether the artifact was accepted
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Denial reason, if refused
    pub fn reason(&self) -> Option<DenialReason> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid { reason } => Some(*reason),
        }
    }
}

/// Verifies bearer artifacts
///
/// The artifact string is interpreted according to the verifier's strategy:
/// an opaque grant id for store-backed verifiers, a compact signed bundle
/// for credential verifiers. Implementations never fail; every problem is
/// reported as [`VerificationResult::Invalid`].
#[async_trait]
pub trait GrantVerifier: Send + Sync {
    /// Verify an artifact against the scope an action requires
    async fn verify(&self, artifact: &str, required_scope: &str) -> VerificationResult;
}

/// Expiry and scope checks shared by both strategies
///
/// Called once the grant's integrity has been established.
pub(crate) fn check_grant(
    grant: Grant,
    now: DateTime<Utc>,
    required_scope: &str,
) -> VerificationResult {
    if grant.is_expired_at(now) {
        return VerificationResult::invalid(DenialReason::Expired);
    }

    if !grant.covers(required_scope) {
        return VerificationResult::invalid(DenialReason::ScopeMismatch);
    }

    VerificationResult::Valid {
        subject: grant.subject,
        scope: grant.scope,
    }
}

//! Delegation grants
//!
//! A grant records that a subject may act within a scope until it expires.
//! It is created once by an issuer and never mutated afterwards.

use crate::{
    credentials::{signature_serde, SignedBundle},
    error::{GrantError, Result},
    scope::Scope,
};
use chrono::{DateTime, Duration, Utc};
use ed25519_compact::Signature;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque grant identifier
///
/// In the bearer-token model this value *is* the artifact handed to the
/// client, so it is drawn from a v4 UUID rather than a counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(String);

impl GrantId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GrantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for GrantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity the grant is issued for (a user or an agent)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subject(String);

impl Subject {
    /// Create a subject, rejecting empty identifiers
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(GrantError::InvalidSubject(
                "subject must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Borrow the subject as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Subject {
    type Error = GrantError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Subject> for String {
    fn from(value: Subject) -> Self {
        value.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Evidence that a grant was really issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityProof {
    /// Grant is recorded in the issuer's store; the id is the artifact
    StoreRecord,

    /// Grant fields are signed by the issuer (Ed25519)
    Signature {
        /// Issuer name carried in the credential
        issuer: String,

        /// Signature over the canonical credential claims
        #[serde(with = "signature_serde")]
        signature: Signature,
    },
}

/// A scoped, time-bounded delegation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Unique identifier
    pub id: GrantId,

    /// Who the grant is for
    pub subject: Subject,

    /// Permissions granted
    pub scope: Scope,

    /// Issuance timestamp
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp, strictly after `issued_at`
    pub expires_at: DateTime<Utc>,

    /// Integrity proof
    pub proof: IntegrityProof,
}

impl Grant {
    /// Check if the grant is logically dead at `now`
    ///
    /// A grant is still usable at the exact instant of `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Check if the grant covers a required scope
    pub fn covers(&self, required_scope: &str) -> bool {
        self.scope.contains(required_scope)
    }

    /// Lifetime the grant was issued with
    pub fn ttl(&self) -> Duration {
        self.expires_at - self.issued_at
    }

    /// Bearer artifact the holder presents
    ///
    /// The grant id for store-backed grants, the compact signed bundle for
    /// signed grants.
    pub fn artifact(&self) -> Result<String> {
        match &self.proof {
            IntegrityProof::StoreRecord => Ok(self.id.to_string()),
            IntegrityProof::Signature { .. } => SignedBundle::from_grant(self)?.encode(),
        }
    }
}

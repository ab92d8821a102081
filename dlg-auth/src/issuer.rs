//! Grant issuance contract and the checks every issuer applies

use crate::{
    error::{GrantError, Result},
    grant::{Grant, Subject},
    scope::Scope,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Issues grants
#[async_trait]
pub trait GrantIssuer: Send + Sync {
    /// Issue a grant for `subject` covering `scope`, valid for `ttl`
    ///
    /// Fails with `InvalidScope` for an empty scope set and
    /// `InvalidDuration` for a non-positive or over-long ttl.
    async fn issue(&self, subject: Subject, scope: Scope, ttl: Duration) -> Result<Grant>;
}

/// Limits applied before a grant is created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuancePolicy {
    /// Longest ttl an issuer will grant
    pub max_ttl: Option<Duration>,
}

impl IssuancePolicy {
    /// Policy with an upper bound on ttl
    pub fn with_max_ttl(max_ttl: Duration) -> Self {
        Self {
            max_ttl: Some(max_ttl),
        }
    }

    /// Validate an issuance request
    pub fn check(&self, scope: &Scope, ttl: Duration) -> Result<()> {
        if scope.is_empty() {
            return Err(GrantError::InvalidScope(
                "scope set must not be empty".to_string(),
            ));
        }

        if ttl <= Duration::zero() {
            return Err(GrantError::InvalidDuration(format!(
                "ttl must be positive, got {}s",
                ttl.num_seconds()
            )));
        }

        if let Some(max_ttl) = self.max_ttl {
            if ttl > max_ttl {
                return Err(GrantError::InvalidDuration(format!(
                    "ttl {}s exceeds maximum {}s",
                    ttl.num_seconds(),
                    max_ttl.num_seconds()
                )));
            }
        }

        Ok(())
    }
}

/// Expiry instant for a grant issued at `issued_at`
///
/// A ttl reaching past the representable date range is a caller error, not
/// a panic.
pub fn expiry(issued_at: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    issued_at.checked_add_signed(ttl).ok_or_else(|| {
        GrantError::InvalidDuration(format!(
            "ttl {}s reaches past the supported date range",
            ttl.num_seconds()
        ))
    })
}

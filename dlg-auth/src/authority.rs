//! Grant Authorities
//!
//! The two interchangeable grant strategies:
//!
//! - **Bearer**: the grant is recorded in a [`GrantStore`] and the client
//!   receives its opaque id. Verification is a store lookup.
//! - **Credential**: the grant fields are signed with the issuer's Ed25519
//!   key and the client receives the self-contained bundle. Verification
//!   needs only the public key.
//!
//! [`Authority`] selects one of them from configuration and exposes both
//! behind the same issue/verify contract.

use crate::{
    clock::Clock,
    config::AuthorityConfig,
    credentials::{CredentialClaims, SignedBundle, SigningKey},
    error::{DenialReason, GrantError, Result},
    grant::{Grant, GrantId, IntegrityProof, Subject},
    issuer::{expiry, GrantIssuer, IssuancePolicy},
    scope::Scope,
    store::GrantStore,
    verification::{check_grant, GrantVerifier, VerificationResult},
};
use async_trait::async_trait;
use chrono::{Duration, SubsecRound};
use ed25519_compact::PublicKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Grant strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Opaque token referencing a stored grant
    #[default]
    Bearer,

    /// Self-contained signed credential
    Credential,
}

impl Strategy {
    /// Token type reported to clients
    pub fn token_type(&self) -> &'static str {
        match self {
            Strategy::Bearer => "Bearer",
            Strategy::Credential => "VerifiableCredential",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Bearer => f.write_str("bearer"),
            Strategy::Credential => f.write_str("credential"),
        }
    }
}

impl FromStr for Strategy {
    type Err = GrantError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bearer" | "token" => Ok(Strategy::Bearer),
            "credential" | "vc" => Ok(Strategy::Credential),
            other => Err(GrantError::ConfigError(format!(
                "Unknown grant strategy '{}', expected 'bearer' or 'credential'",
                other
            ))),
        }
    }
}

/// Store-backed opaque token issuer and verifier
pub struct BearerTokenAuthority {
    store: Arc<dyn GrantStore>,
    clock: Arc<dyn Clock>,
    policy: IssuancePolicy,
}

impl BearerTokenAuthority {
    /// Create an authority over an existing store
    pub fn new(store: Arc<dyn GrantStore>, clock: Arc<dyn Clock>, policy: IssuancePolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Store shared with other components
    pub fn store(&self) -> &Arc<dyn GrantStore> {
        &self.store
    }
}

#[async_trait]
impl GrantIssuer for BearerTokenAuthority {
    async fn issue(&self, subject: Subject, scope: Scope, ttl: Duration) -> Result<Grant> {
        self.policy.check(&scope, ttl)?;

        let issued_at = self.clock.now();
        let grant = Grant {
            id: GrantId::generate(),
            subject,
            scope,
            issued_at,
            expires_at: expiry(issued_at, ttl)?,
            proof: IntegrityProof::StoreRecord,
        };

        self.store.put(grant.clone()).await?;

        info!(
            grant_id = %grant.id,
            subject = %grant.subject,
            scope = %grant.scope,
            expires_at = %grant.expires_at,
            "Issued bearer grant"
        );

        Ok(grant)
    }
}

#[async_trait]
impl GrantVerifier for BearerTokenAuthority {
    async fn verify(&self, artifact: &str, required_scope: &str) -> VerificationResult {
        let id = GrantId::from(artifact);

        let grant = match self.store.get(&id).await {
            Ok(grant) => grant,
            Err(GrantError::GrantNotFound(_)) => {
                return VerificationResult::invalid(DenialReason::Unknown);
            }
            Err(e) => {
                // A store we cannot read vouches for nothing
                error!(error = %e, "Grant store lookup failed");
                return VerificationResult::invalid(DenialReason::Unknown);
            }
        };

        check_grant(grant, self.clock.now(), required_scope)
    }
}

/// Verifies signed credentials with the issuer's public key
///
/// This is all a relying party (the agent server) needs; it never sees the
/// signing key.
#[derive(Clone)]
pub struct CredentialVerifier {
    issuer_public_key: PublicKey,
    clock: Arc<dyn Clock>,
}

impl CredentialVerifier {
    /// Create a verifier trusting `issuer_public_key`
    pub fn new(issuer_public_key: PublicKey, clock: Arc<dyn Clock>) -> Self {
        Self {
            issuer_public_key,
            clock,
        }
    }

    /// Create a verifier from a hex-encoded public key
    pub fn from_public_key_hex(public_key_hex: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let bytes = hex::decode(public_key_hex.trim())
            .map_err(|e| GrantError::ConfigError(format!("Invalid public key hex: {}", e)))?;
        let public_key = PublicKey::from_slice(&bytes)
            .map_err(|e| GrantError::CryptoError(format!("Invalid public key: {}", e)))?;

        Ok(Self::new(public_key, clock))
    }
}

#[async_trait]
impl GrantVerifier for CredentialVerifier {
    async fn verify(&self, artifact: &str, required_scope: &str) -> VerificationResult {
        let bundle = match SignedBundle::decode(artifact) {
            Ok(bundle) => bundle,
            Err(e) => {
                debug!(error = %e, "Undecodable credential");
                return VerificationResult::invalid(DenialReason::BadSignature);
            }
        };

        if let Err(e) = bundle.verify_signature(&self.issuer_public_key) {
            debug!(grant_id = %bundle.claims.jti, error = %e, "Credential signature rejected");
            return VerificationResult::invalid(DenialReason::BadSignature);
        }

        let grant = match bundle.into_grant() {
            Ok(grant) => grant,
            Err(e) => {
                warn!(error = %e, "Signed credential carries unusable claims");
                return VerificationResult::invalid(DenialReason::BadSignature);
            }
        };

        check_grant(grant, self.clock.now(), required_scope)
    }
}

/// Signed credential issuer and verifier
pub struct CredentialAuthority {
    key: SigningKey,
    issuer: String,
    clock: Arc<dyn Clock>,
    policy: IssuancePolicy,
    verifier: CredentialVerifier,
}

impl CredentialAuthority {
    /// Create an authority signing with `key` under the name `issuer`
    pub fn new(
        key: SigningKey,
        issuer: impl Into<String>,
        clock: Arc<dyn Clock>,
        policy: IssuancePolicy,
    ) -> Self {
        let verifier = CredentialVerifier::new(key.public_key(), clock.clone());

        Self {
            key,
            issuer: issuer.into(),
            clock,
            policy,
            verifier,
        }
    }

    /// Public key relying parties must trust
    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// Verifier holding only the public key
    pub fn verifier(&self) -> CredentialVerifier {
        self.verifier.clone()
    }
}

#[async_trait]
impl GrantIssuer for CredentialAuthority {
    async fn issue(&self, subject: Subject, scope: Scope, ttl: Duration) -> Result<Grant> {
        self.policy.check(&scope, ttl)?;

        // Claims carry whole seconds; a shorter ttl would collapse to exp == iat
        if ttl < Duration::seconds(1) {
            return Err(GrantError::InvalidDuration(
                "credential ttl must be at least one second".to_string(),
            ));
        }

        let issued_at = self.clock.now().trunc_subsecs(0);
        let expires_at = expiry(issued_at, ttl)?.trunc_subsecs(0);

        let claims = CredentialClaims {
            jti: GrantId::generate(),
            iss: self.issuer.clone(),
            sub: subject,
            scope,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let grant = SignedBundle::sign(claims, &self.key)?.into_grant()?;

        info!(
            grant_id = %grant.id,
            subject = %grant.subject,
            scope = %grant.scope,
            expires_at = %grant.expires_at,
            "Issued signed credential"
        );

        Ok(grant)
    }
}

#[async_trait]
impl GrantVerifier for CredentialAuthority {
    async fn verify(&self, artifact: &str, required_scope: &str) -> VerificationResult {
        self.verifier.verify(artifact, required_scope).await
    }
}

/// Grant authority selected by configuration
pub enum Authority {
    /// Store-backed opaque tokens
    Bearer(BearerTokenAuthority),

    /// Signed credentials
    Credential(CredentialAuthority),
}

impl Authority {
    /// Build the configured strategy
    ///
    /// The store is only used by the bearer strategy; it is accepted either
    /// way so callers can wire one store instance at startup.
    pub fn from_config(
        config: &AuthorityConfig,
        store: Arc<dyn GrantStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let policy = config.issuance_policy()?;

        match config.strategy {
            Strategy::Bearer => Ok(Self::Bearer(BearerTokenAuthority::new(store, clock, policy))),
            Strategy::Credential => {
                let key = match &config.signing_key {
                    Some(seed_hex) => SigningKey::from_seed_hex(seed_hex)?,
                    None => {
                        warn!("No signing key configured; generated an ephemeral key, credentials will not survive a restart");
                        SigningKey::generate()
                    }
                };

                Ok(Self::Credential(CredentialAuthority::new(
                    key,
                    config.issuer.clone(),
                    clock,
                    policy,
                )))
            }
        }
    }

    /// Strategy in use
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Bearer(_) => Strategy::Bearer,
            Self::Credential(_) => Strategy::Credential,
        }
    }

    /// Issuer public key (hex), for the credential strategy
    pub fn public_key_hex(&self) -> Option<String> {
        match self {
            Self::Bearer(_) => None,
            Self::Credential(authority) => Some(hex::encode(authority.public_key().as_ref())),
        }
    }
}

#[async_trait]
impl GrantIssuer for Authority {
    async fn issue(&self, subject: Subject, scope: Scope, ttl: Duration) -> Result<Grant> {
        match self {
            Self::Bearer(authority) => authority.issue(subject, scope, ttl).await,
            Self::Credential(authority) => authority.issue(subject, scope, ttl).await,
        }
    }
}

#[async_trait]
impl GrantVerifier for Authority {
    async fn verify(&self, artifact: &str, required_scope: &str) -> VerificationResult {
        let result = match self {
            Self::Bearer(authority) => authority.verify(artifact, required_scope).await,
            Self::Credential(authority) => authority.verify(artifact, required_scope).await,
        };

        match &result {
            VerificationResult::Valid { subject, .. } => {
                debug!(strategy = %self.strategy(), subject = %subject, required_scope, "Artifact accepted");
            }
            VerificationResult::Invalid { reason } => {
                warn!(strategy = %self.strategy(), reason = %reason, required_scope, "Artifact refused");
            }
        }

        result
    }
}

//! Signed delegation credentials
//!
//! The self-contained grant form: the claims `{jti, iss, sub, scope, iat, exp}`
//! are signed with the issuer's Ed25519 key, and the bundle travels as
//! `base64url(claims).base64url(signature)`. No store lookup is needed to
//! verify it, only the issuer's public key.

use crate::{
    error::{GrantError, Result},
    grant::{Grant, GrantId, IntegrityProof, Subject},
    scope::Scope,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use ed25519_compact::{KeyPair, PublicKey, Seed, Signature};
use serde::{Deserialize, Serialize};

/// Domain separator prefixed to every signed payload
const SIGNING_CONTEXT: &[u8] = b"dlg-delegation-credential/v1";

/// Claims carried by a signed credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Grant id
    pub jti: GrantId,

    /// Issuer name
    pub iss: String,

    /// Holder the grant was issued for
    pub sub: Subject,

    /// Granted permissions
    pub scope: Scope,

    /// Issued at (unix seconds)
    pub iat: i64,

    /// Expires at (unix seconds)
    pub exp: i64,
}

impl CredentialClaims {
    /// Canonical bytes covered by the signature
    fn signing_data(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(SIGNING_CONTEXT.len() + 128);
        data.extend_from_slice(SIGNING_CONTEXT);

        // Field order is fixed by the struct definition and scope is a sorted set
        let canonical = serde_json::to_vec(self)
            .map_err(|e| GrantError::SerializationError(format!("Serialization failed: {}", e)))?;
        data.extend_from_slice(&canonical);

        Ok(data)
    }
}

/// Claims plus the issuer signature over them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBundle {
    /// Signed claims
    pub claims: CredentialClaims,

    /// Issuer signature
    #[serde(with = "signature_serde")]
    pub signature: Signature,
}

impl SignedBundle {
    /// Sign claims with the issuer key
    pub fn sign(claims: CredentialClaims, key: &SigningKey) -> Result<Self> {
        let signing_data = claims.signing_data()?;
        let signature = key.keypair.sk.sign(&signing_data, None);

        Ok(Self { claims, signature })
    }

    /// Verify the issuer signature
    pub fn verify_signature(&self, issuer_public_key: &PublicKey) -> Result<()> {
        let signing_data = self.claims.signing_data()?;

        issuer_public_key
            .verify(&signing_data, &self.signature)
            .map_err(|e| GrantError::CryptoError(format!("Signature verification failed: {}", e)))
    }

    /// Encode as `base64url(claims).base64url(signature)`
    pub fn encode(&self) -> Result<String> {
        let claims = serde_json::to_vec(&self.claims)?;

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(claims),
            URL_SAFE_NO_PAD.encode(self.signature.as_ref())
        ))
    }

    /// Decode a compact bundle; does not check the signature
    pub fn decode(compact: &str) -> Result<Self> {
        let (claims_segment, signature_segment) = compact.split_once('.').ok_or_else(|| {
            GrantError::SerializationError("Credential must have two segments".to_string())
        })?;

        let claims_bytes = URL_SAFE_NO_PAD
            .decode(claims_segment)
            .map_err(|e| GrantError::SerializationError(format!("Invalid claims encoding: {}", e)))?;
        let signature_bytes = URL_SAFE_NO_PAD.decode(signature_segment).map_err(|e| {
            GrantError::SerializationError(format!("Invalid signature encoding: {}", e))
        })?;

        let claims: CredentialClaims = serde_json::from_slice(&claims_bytes)?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|e| GrantError::CryptoError(format!("Invalid signature: {}", e)))?;

        Ok(Self { claims, signature })
    }

    /// Rebuild the bundle of a signed grant
    pub fn from_grant(grant: &Grant) -> Result<Self> {
        let (issuer, signature) = match &grant.proof {
            IntegrityProof::Signature { issuer, signature } => (issuer.clone(), *signature),
            IntegrityProof::StoreRecord => {
                return Err(GrantError::InternalError(format!(
                    "Grant {} is store-backed and has no signature",
                    grant.id
                )))
            }
        };

        Ok(Self {
            claims: CredentialClaims {
                jti: grant.id.clone(),
                iss: issuer,
                sub: grant.subject.clone(),
                scope: grant.scope.clone(),
                iat: grant.issued_at.timestamp(),
                exp: grant.expires_at.timestamp(),
            },
            signature,
        })
    }

    /// Convert into the grant it certifies
    pub fn into_grant(self) -> Result<Grant> {
        let issued_at = timestamp(self.claims.iat)?;
        let expires_at = timestamp(self.claims.exp)?;

        Ok(Grant {
            id: self.claims.jti,
            subject: self.claims.sub,
            scope: self.claims.scope,
            issued_at,
            expires_at,
            proof: IntegrityProof::Signature {
                issuer: self.claims.iss,
                signature: self.signature,
            },
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| GrantError::SerializationError(format!("Timestamp out of range: {}", secs)))
}

/// Issuer signing key (Ed25519)
#[derive(Clone)]
pub struct SigningKey {
    keypair: KeyPair,
}

impl SigningKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        Self {
            keypair: KeyPair::generate(),
        }
    }

    /// Derive the key from a hex-encoded 32-byte seed
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self> {
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|e| GrantError::ConfigError(format!("Invalid signing key hex: {}", e)))?;
        let seed = Seed::from_slice(&bytes)
            .map_err(|e| GrantError::ConfigError(format!("Invalid signing key seed: {}", e)))?;

        Ok(Self {
            keypair: KeyPair::from_seed(seed),
        })
    }

    /// Public half, used by verifiers
    pub fn public_key(&self) -> PublicKey {
        self.keypair.pk
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &hex::encode(self.keypair.pk.as_ref()))
            .finish_non_exhaustive()
    }
}

/// Serde module for Signature serialization
pub(crate) mod signature_serde {
    use ed25519_compact::Signature;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(sig: &Signature, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(sig.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Signature, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_string = String::deserialize(deserializer)?;
        let bytes = hex::decode(&hex_string).map_err(serde::de::Error::custom)?;
        Signature::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

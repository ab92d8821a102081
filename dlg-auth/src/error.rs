//! Error types for grant issuance, storage and delegated actions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for grant operations
pub type Result<T> = std::result::Result<T, GrantError>;

/// Errors raised while issuing, storing or configuring grants.
///
/// Verification never surfaces these to callers: the verifier folds every
/// failure into a [`DenialReason`].
#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    /// Requested scope set was empty or held a malformed entry
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// Requested time-to-live was zero, negative or above the configured maximum
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Subject identifier was empty
    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    /// A grant with this id is already stored
    #[error("Grant {0} already exists")]
    DuplicateGrant(String),

    /// No grant stored under this id
    #[error("Grant {0} not found")]
    GrantNotFound(String),

    /// Signing key or signature handling failed
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    /// Grant store I/O failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Encoding or decoding failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl GrantError {
    /// Check if the caller can fix the error by changing the request
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            GrantError::InvalidScope(_)
                | GrantError::InvalidDuration(_)
                | GrantError::InvalidSubject(_)
        )
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            GrantError::InvalidScope(_) => 400,
            GrantError::InvalidDuration(_) => 400,
            GrantError::InvalidSubject(_) => 400,
            GrantError::DuplicateGrant(_) => 409,
            GrantError::GrantNotFound(_) => 404,
            GrantError::CryptoError(_) => 500,
            GrantError::StorageError(_) => 500,
            GrantError::SerializationError(_) => 500,
            GrantError::ConfigError(_) => 500,
            GrantError::InternalError(_) => 500,
        }
    }
}

impl From<serde_json::Error> for GrantError {
    fn from(err: serde_json::Error) -> Self {
        GrantError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for GrantError {
    fn from(err: std::io::Error) -> Self {
        GrantError::StorageError(err.to_string())
    }
}

impl From<anyhow::Error> for GrantError {
    fn from(err: anyhow::Error) -> Self {
        GrantError::InternalError(err.to_string())
    }
}

/// Why a presented artifact was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Grant lifetime has passed
    Expired,

    /// No record of this artifact
    Unknown,

    /// Grant does not cover the required scope
    ScopeMismatch,

    /// Credential failed to decode or its signature did not verify
    BadSignature,
}

impl DenialReason {
    /// Wire name of the reason
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::Expired => "expired",
            DenialReason::Unknown => "unknown",
            DenialReason::ScopeMismatch => "scope_mismatch",
            DenialReason::BadSignature => "bad_signature",
        }
    }

    /// HTTP status for a denial with this reason
    pub fn status_code(&self) -> u16 {
        match self {
            DenialReason::ScopeMismatch => 403,
            DenialReason::Expired | DenialReason::Unknown | DenialReason::BadSignature => 401,
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of the wrapped operation itself, after authorization succeeded
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// Payload was well-formed JSON but carried unusable values
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The calendar has no slot to offer
    #[error("No slot available: {0}")]
    NoSlotAvailable(String),

    /// The operation produced a result that could not be rendered
    #[error("Action failed: {0}")]
    Internal(String),
}

impl ActionError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::InvalidPayload(_) => "invalid_payload",
            ActionError::NoSlotAvailable(_) => "no_slot_available",
            ActionError::Internal(_) => "internal",
        }
    }

    /// HTTP status for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            ActionError::InvalidPayload(_) | ActionError::NoSlotAvailable(_) => 422,
            ActionError::Internal(_) => 500,
        }
    }
}

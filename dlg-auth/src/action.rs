//! Delegated Actions
//!
//! A [`DelegatedAction`] wraps a protected [`Operation`] and only lets it run
//! once a [`GrantVerifier`] has accepted the caller's artifact for the scope
//! the operation needs.
//!
//! An invocation walks a fixed state machine with no retries:
//!
//! ```text
//! Start -> Verifying -> Authorized -> Executing -> Done
//!                    \-> Denied
//! ```
//!
//! Denials and operation failures are kept apart: a denial means the grant
//! was not good enough, a failure means the operation itself could not
//! produce a result.

use crate::{
    error::{ActionError, DenialReason},
    grant::Subject,
    scope::Scope,
    verification::{GrantVerifier, VerificationResult},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Verified caller identity handed to an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authorization {
    /// Grant subject
    pub subject: Subject,

    /// Full scope set of the grant
    pub scope: Scope,
}

/// Structured denial body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denial {
    /// Always `true`
    pub error: bool,

    /// Why the artifact was refused
    pub reason: DenialReason,
}

impl Denial {
    /// Create a denial for `reason`
    pub fn new(reason: DenialReason) -> Self {
        Self {
            error: true,
            reason,
        }
    }
}

/// Protected operation run on behalf of a grant holder
#[async_trait]
pub trait Operation: Send + Sync {
    /// Request payload
    type Payload: DeserializeOwned + Send;

    /// Result payload
    type Output: Serialize + Send;

    /// Operation name, used in logs
    fn name(&self) -> &'static str;

    /// Scope the operation declares it needs
    fn required_scope(&self) -> &'static str;

    /// Run the operation for an authorized caller
    async fn execute(
        &self,
        caller: &Authorization,
        payload: Self::Payload,
    ) -> Result<Self::Output, ActionError>;
}

/// Invocation progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// Nothing checked yet
    Start,
    /// Artifact handed to the verifier
    Verifying,
    /// Verifier accepted the artifact
    Authorized,
    /// Operation running
    Executing,
    /// Operation finished, successfully or not
    Done,
    /// Verifier refused the artifact
    Denied,
}

impl InvocationState {
    /// Whether `next` is a legal successor
    pub fn can_transition_to(self, next: InvocationState) -> bool {
        use InvocationState::*;

        matches!(
            (self, next),
            (Start, Verifying)
                | (Verifying, Authorized)
                | (Verifying, Denied)
                | (Authorized, Executing)
                | (Executing, Done)
        )
    }

    /// Whether the invocation has ended
    pub fn is_terminal(self) -> bool {
        matches!(self, InvocationState::Done | InvocationState::Denied)
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvocationState::Start => "start",
            InvocationState::Verifying => "verifying",
            InvocationState::Authorized => "authorized",
            InvocationState::Executing => "executing",
            InvocationState::Done => "done",
            InvocationState::Denied => "denied",
        };
        f.write_str(name)
    }
}

/// Result of an invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome<T> {
    /// Operation ran and produced a result
    Completed(T),

    /// Artifact was refused; the operation never ran
    Denied(Denial),

    /// Operation ran (or its payload was rejected) and failed
    Failed(ActionError),
}

impl<T> ActionOutcome<T> {
    /// State the invocation ended in
    pub fn terminal_state(&self) -> InvocationState {
        match self {
            ActionOutcome::Denied(_) => InvocationState::Denied,
            ActionOutcome::Completed(_) | ActionOutcome::Failed(_) => InvocationState::Done,
        }
    }

    /// Denial reason, if denied
    pub fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            ActionOutcome::Denied(denial) => Some(denial.reason),
            _ => None,
        }
    }

    /// Completed result, if any
    pub fn completed(self) -> Option<T> {
        match self {
            ActionOutcome::Completed(output) => Some(output),
            _ => None,
        }
    }
}

/// Tracks one invocation through its states
struct Invocation<'a> {
    action: &'a str,
    state: InvocationState,
}

impl<'a> Invocation<'a> {
    fn new(action: &'a str) -> Self {
        Self {
            action,
            state: InvocationState::Start,
        }
    }

    fn advance(&mut self, next: InvocationState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(action = self.action, from = %self.state, to = %next, "Invocation state");
        self.state = next;
    }
}

/// Operation guarded by grant verification
pub struct DelegatedAction<O> {
    verifier: Arc<dyn GrantVerifier>,
    operation: O,
}

impl<O: Operation> DelegatedAction<O> {
    /// Guard `operation` with `verifier`
    pub fn new(verifier: Arc<dyn GrantVerifier>, operation: O) -> Self {
        Self {
            verifier,
            operation,
        }
    }

    /// Wrapped operation name
    pub fn name(&self) -> &'static str {
        self.operation.name()
    }

    /// Scope the wrapped operation declares
    pub fn required_scope(&self) -> &'static str {
        self.operation.required_scope()
    }

    /// Verify `artifact` for `required_scope`, then run the operation
    pub async fn invoke(
        &self,
        artifact: &str,
        required_scope: &str,
        payload: O::Payload,
    ) -> ActionOutcome<O::Output> {
        let mut invocation = Invocation::new(self.operation.name());

        let caller = match self.authorize(&mut invocation, artifact, required_scope).await {
            Ok(caller) => caller,
            Err(denial) => return ActionOutcome::Denied(denial),
        };

        self.execute(&mut invocation, &caller, payload).await
    }

    /// Like [`invoke`](Self::invoke), with a raw JSON payload
    ///
    /// The payload is only parsed after the artifact is accepted, so a
    /// denied caller learns nothing about payload validation. An empty body
    /// means "all defaults".
    pub async fn invoke_json(
        &self,
        artifact: &str,
        required_scope: &str,
        raw_payload: &[u8],
    ) -> ActionOutcome<serde_json::Value> {
        let mut invocation = Invocation::new(self.operation.name());

        let caller = match self.authorize(&mut invocation, artifact, required_scope).await {
            Ok(caller) => caller,
            Err(denial) => return ActionOutcome::Denied(denial),
        };

        let raw_payload: &[u8] = if raw_payload.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            raw_payload
        };

        let payload = match serde_json::from_slice::<O::Payload>(raw_payload) {
            Ok(payload) => payload,
            Err(e) => {
                invocation.advance(InvocationState::Executing);
                invocation.advance(InvocationState::Done);
                return ActionOutcome::Failed(ActionError::InvalidPayload(e.to_string()));
            }
        };

        match self.execute(&mut invocation, &caller, payload).await {
            ActionOutcome::Completed(output) => match serde_json::to_value(output) {
                Ok(value) => ActionOutcome::Completed(value),
                Err(e) => ActionOutcome::Failed(ActionError::Internal(e.to_string())),
            },
            ActionOutcome::Denied(denial) => ActionOutcome::Denied(denial),
            ActionOutcome::Failed(e) => ActionOutcome::Failed(e),
        }
    }

    async fn authorize(
        &self,
        invocation: &mut Invocation<'_>,
        artifact: &str,
        required_scope: &str,
    ) -> Result<Authorization, Denial> {
        invocation.advance(InvocationState::Verifying);

        match self.verifier.verify(artifact, required_scope).await {
            VerificationResult::Valid { subject, scope } => {
                invocation.advance(InvocationState::Authorized);
                Ok(Authorization { subject, scope })
            }
            VerificationResult::Invalid { reason } => {
                invocation.advance(InvocationState::Denied);
                warn!(action = self.operation.name(), reason = %reason, "Delegated action denied");
                Err(Denial::new(reason))
            }
        }
    }

    async fn execute(
        &self,
        invocation: &mut Invocation<'_>,
        caller: &Authorization,
        payload: O::Payload,
    ) -> ActionOutcome<O::Output> {
        invocation.advance(InvocationState::Executing);
        let result = self.operation.execute(caller, payload).await;
        invocation.advance(InvocationState::Done);

        match result {
            Ok(output) => {
                info!(action = self.operation.name(), subject = %caller.subject, "Delegated action completed");
                ActionOutcome::Completed(output)
            }
            Err(e) => {
                warn!(action = self.operation.name(), subject = %caller.subject, error = %e, "Delegated action failed");
                ActionOutcome::Failed(e)
            }
        }
    }
}

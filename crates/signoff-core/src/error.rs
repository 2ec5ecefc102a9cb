use crate::domain::request::RequestStatus;
use thiserror::Error;

/// Core error type for the Signoff engine
///
/// The variants fall into four classes: configuration errors
/// ([`EngineError::DefinitionInvalid`], [`EngineError::ScopeResolution`]),
/// authorization errors ([`EngineError::UnauthorizedActor`]), state errors
/// (rejected actions carrying the authoritative state so callers can refresh)
/// and concurrency errors (safe to retry once after a re-read). None of them
/// is fatal to the process; every failure is scoped to a single request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Request instance not found
    #[error("Request not found: {0}")]
    RequestNotFound(String),

    /// Workflow definition not found
    #[error("Workflow definition not found: {0}")]
    DefinitionNotFound(String),

    /// Org unit not found
    #[error("Org unit not found: {0}")]
    OrgUnitNotFound(String),

    /// Delegation not found
    #[error("Delegation not found: {0}")]
    DelegationNotFound(String),

    /// Workflow definition failed validation; every violated constraint is listed
    #[error("Invalid workflow definition: {}", violations.join("; "))]
    DefinitionInvalid {
        /// All violated constraints, not just the first
        violations: Vec<String>,
    },

    /// Workflow definition has no steps
    #[error("Workflow definition has no steps: {0}")]
    EmptyDefinition(String),

    /// An approver scope could not be resolved against the org hierarchy
    #[error("Scope resolution failed: {0}")]
    ScopeResolution(String),

    /// The acting user is not in the resolved approver set for the current step
    #[error("Actor {actor} is not an eligible approver for step {step}")]
    UnauthorizedActor {
        /// The person who attempted the action
        actor: String,
        /// The step the action targeted
        step: usize,
    },

    /// Return target is not an earlier step, or the current step forbids return
    #[error("Invalid return target {target} from step {current}: {reason}")]
    InvalidReturnTarget {
        /// The requested target step index
        target: usize,
        /// The request's current step index
        current: usize,
        /// Why the return was refused
        reason: String,
    },

    /// Cancel is only legal for the requester before any approval has occurred
    #[error("Cancel not allowed: {0}")]
    CancelNotAllowed(String),

    /// The request is in a terminal status and accepts no further actions
    #[error("Request is already terminal ({status:?} at step {step})")]
    AlreadyTerminal {
        /// The terminal status the request holds
        status: RequestStatus,
        /// The frozen step index
        step: usize,
    },

    /// The request is still a draft; only submit applies
    #[error("Request has not been submitted yet: {0}")]
    NotSubmitted(String),

    /// The action targeted a step the request has already moved past
    #[error("Stale step: action targeted step {expected} but request is at step {current}")]
    StaleStep {
        /// The step index the caller believed current
        expected: usize,
        /// The actual current step index
        current: usize,
    },

    /// A concurrent writer committed first; re-read and retry once
    #[error("Concurrent modification of request {request_id} (expected version {expected})")]
    ConcurrentModification {
        /// The contended request
        request_id: String,
        /// The version the losing writer read
        expected: u64,
    },

    /// Delegation violates a structural rule (self-delegation, inverted window, overlap)
    #[error("Invalid delegation: {0}")]
    DelegationInvalid(String),

    /// The timeline log for a request does not replay cleanly
    #[error("Timeline corrupted for request {request_id}: {detail}")]
    TimelineCorrupted {
        /// The request whose log is inconsistent
        request_id: String,
        /// What the replay found
        detail: String,
    },

    /// State store error
    #[error("State store error: {0}")]
    StoreError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Whether the caller may safely retry after re-reading current state.
    ///
    /// Only concurrency errors qualify; retries must stay bounded so a real
    /// conflict is not masked.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ConcurrentModification { .. } | EngineError::StaleStep { .. }
        )
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::SerializationError(err.to_string())
    }
}

impl From<String> for EngineError {
    fn from(err: String) -> Self {
        EngineError::Other(err)
    }
}

impl From<&str> for EngineError {
    fn from(err: &str) -> Self {
        EngineError::Other(err.to_string())
    }
}

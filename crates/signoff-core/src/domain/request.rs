use crate::{
    domain::definition::{StepDefinition, WorkflowDefId, WorkflowDefinition},
    domain::events::{
        EngineEvent, RequestApproved, RequestCancelled, RequestReassigned, RequestRejected,
        RequestReturned, RequestSubmitted, StepAdvanced,
    },
    domain::org::{OrgUnitId, PersonId},
    EngineError, Payload,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// System-wide fallback SLA, applied when neither the step nor the
/// definition sets one
pub const SYSTEM_DEFAULT_SLA_DAYS: u32 = 3;

/// Value object: Request instance ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Created but not yet submitted; has no timeline entries
    Draft,

    /// Waiting for the current step's approver
    Pending,

    /// Sent back to an earlier step; actionable like Pending
    Returned,

    /// Every step approved; terminal
    Approved,

    /// Rejected at some step; terminal
    Rejected,

    /// Withdrawn by the requester before any approval; terminal
    Cancelled,
}

impl RequestStatus {
    /// Whether the status accepts no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Approved | RequestStatus::Rejected | RequestStatus::Cancelled
        )
    }

    /// Whether an approver action may be applied in this status
    pub fn is_actionable(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Returned)
    }
}

/// The actions an actor may take on an in-flight request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestAction {
    /// Approve the current step
    Approve,

    /// Reject the request outright
    Reject,

    /// Send the request back to an earlier step
    Return,

    /// Withdraw the request (requester only, before any approval)
    Cancel,
}

/// Aggregate: a live request moving through a pinned snapshot of a
/// workflow definition
///
/// The mutable fields here are a materialized projection of the request's
/// timeline; the append-only timeline log is the source of truth and replay
/// over it must always reproduce `(status, current_step)`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestInstance {
    /// Unique identifier
    pub id: RequestId,

    /// The definition this request was submitted against
    pub definition_id: WorkflowDefId,

    /// Deep copy of the definition's steps, pinned at creation. Later edits
    /// to the template never alter this snapshot.
    pub steps: Vec<StepDefinition>,

    /// Definition-level default SLA pinned alongside the steps
    pub default_sla_days: Option<u32>,

    /// The person who raised the request
    pub requester: PersonId,

    /// The requester's org unit at submission time; approver scopes resolve
    /// against this unit for the lifetime of the request
    pub requester_unit: OrgUnitId,

    /// Index of the step awaiting action; frozen once terminal
    pub current_step: usize,

    /// Current status
    pub status: RequestStatus,

    /// Opaque caller data; never interpreted by the engine
    pub payload: Payload,

    /// Manual assignee pinned by a Reassign; cleared whenever the step
    /// index changes
    pub assignee: Option<PersonId>,

    /// When the current step breaches its SLA; None for drafts and
    /// terminal requests
    pub due_at: Option<DateTime<Utc>>,

    /// Optimistic-concurrency version; bumped on every mutation
    pub version: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,

    /// Engine events recorded since the last drain
    #[serde(skip)]
    pub events: Vec<Box<dyn EngineEvent>>,
}

// Manually implement Clone; recorded events stay with the original.
impl Clone for RequestInstance {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            definition_id: self.definition_id.clone(),
            steps: self.steps.clone(),
            default_sla_days: self.default_sla_days,
            requester: self.requester.clone(),
            requester_unit: self.requester_unit.clone(),
            current_step: self.current_step,
            status: self.status,
            payload: self.payload.clone(),
            assignee: self.assignee.clone(),
            due_at: self.due_at,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            events: Vec::new(),
        }
    }
}

impl RequestInstance {
    /// Create a draft against a definition, pinning a snapshot of its steps.
    ///
    /// Fails with [`EngineError::EmptyDefinition`] when the definition has no
    /// steps; a request with nowhere to go must never exist.
    pub fn new_draft(
        definition: &WorkflowDefinition,
        requester: PersonId,
        requester_unit: OrgUnitId,
        payload: Payload,
    ) -> Result<Self, EngineError> {
        if definition.steps.is_empty() {
            return Err(EngineError::EmptyDefinition(definition.id.0.clone()));
        }

        let now = Utc::now();

        Ok(Self {
            id: RequestId(Uuid::new_v4().to_string()),
            definition_id: definition.id.clone(),
            steps: definition.steps.clone(),
            default_sla_days: definition.default_sla_days,
            requester,
            requester_unit,
            current_step: 0,
            status: RequestStatus::Draft,
            payload,
            assignee: None,
            due_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
            events: Vec::with_capacity(4),
        })
    }

    /// Submit the draft into its first step
    pub fn submit(&mut self) -> Result<(), EngineError> {
        if self.status != RequestStatus::Draft {
            return Err(self.not_actionable_error());
        }

        self.status = RequestStatus::Pending;
        self.current_step = 0;
        self.refresh_due_at();
        self.touch();

        self.record_event(Box::new(RequestSubmitted {
            request_id: self.id.clone(),
            requester: self.requester.clone(),
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// Approve the current step: advance, or terminate with Approved when
    /// the current step is the last one
    pub fn approve(&mut self, actor: &PersonId) -> Result<(), EngineError> {
        self.ensure_actionable()?;

        let from_step = self.current_step;

        if from_step + 1 >= self.steps.len() {
            self.status = RequestStatus::Approved;
            self.due_at = None;
            self.touch();

            self.record_event(Box::new(RequestApproved {
                request_id: self.id.clone(),
                actor: actor.clone(),
                timestamp: Utc::now(),
            }));
        } else {
            self.current_step = from_step + 1;
            self.status = RequestStatus::Pending;
            self.assignee = None;
            self.refresh_due_at();
            self.touch();

            self.record_event(Box::new(StepAdvanced {
                request_id: self.id.clone(),
                actor: actor.clone(),
                from_step,
                to_step: self.current_step,
                timestamp: Utc::now(),
            }));
        }

        Ok(())
    }

    /// Reject the request; terminal from any step
    pub fn reject(&mut self, actor: &PersonId) -> Result<(), EngineError> {
        self.ensure_actionable()?;

        let step = self.current_step;
        self.status = RequestStatus::Rejected;
        self.due_at = None;
        self.touch();

        self.record_event(Box::new(RequestRejected {
            request_id: self.id.clone(),
            actor: actor.clone(),
            step,
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// Send the request back to an earlier step.
    ///
    /// Only legal when the current step's definition allows returning and
    /// `target` is strictly less than the current index.
    pub fn return_to(&mut self, actor: &PersonId, target: usize) -> Result<(), EngineError> {
        self.ensure_actionable()?;

        let current = self.current_step;
        let step_def = self.current_step_def()?;

        if !step_def.allow_return_to_previous {
            return Err(EngineError::InvalidReturnTarget {
                target,
                current,
                reason: "current step does not permit return".to_string(),
            });
        }

        if target >= current {
            return Err(EngineError::InvalidReturnTarget {
                target,
                current,
                reason: "target must be an earlier step".to_string(),
            });
        }

        self.current_step = target;
        self.status = RequestStatus::Returned;
        self.assignee = None;
        self.refresh_due_at();
        self.touch();

        self.record_event(Box::new(RequestReturned {
            request_id: self.id.clone(),
            actor: actor.clone(),
            from_step: current,
            to_step: target,
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// Withdraw the request before anyone has acted on it.
    ///
    /// Legal only for the original requester, only at (Pending, step 0);
    /// once an approval or return has occurred the window is closed.
    pub fn cancel(&mut self, actor: &PersonId) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                status: self.status,
                step: self.current_step,
            });
        }

        if *actor != self.requester {
            return Err(EngineError::CancelNotAllowed(format!(
                "only the requester {} may cancel",
                self.requester
            )));
        }

        if self.status != RequestStatus::Pending || self.current_step != 0 {
            return Err(EngineError::CancelNotAllowed(format!(
                "request is {:?} at step {}; cancel is only allowed while pending at step 0",
                self.status, self.current_step
            )));
        }

        self.status = RequestStatus::Cancelled;
        self.due_at = None;
        self.touch();

        self.record_event(Box::new(RequestCancelled {
            request_id: self.id.clone(),
            requester: self.requester.clone(),
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// Pin the current step to a single named person
    pub fn reassign(&mut self, actor: &PersonId, assignee: PersonId) -> Result<(), EngineError> {
        self.ensure_actionable()?;

        self.assignee = Some(assignee.clone());
        self.touch();

        self.record_event(Box::new(RequestReassigned {
            request_id: self.id.clone(),
            actor: actor.clone(),
            assignee,
            step: self.current_step,
            timestamp: Utc::now(),
        }));

        Ok(())
    }

    /// The definition of the step currently awaiting action
    pub fn current_step_def(&self) -> Result<&StepDefinition, EngineError> {
        self.steps.get(self.current_step).ok_or_else(|| {
            EngineError::Other(format!(
                "request {} step index {} out of range ({} steps)",
                self.id,
                self.current_step,
                self.steps.len()
            ))
        })
    }

    /// Effective SLA in days for the current step
    pub fn effective_sla_days(&self) -> u32 {
        self.steps
            .get(self.current_step)
            .and_then(|s| s.sla_days)
            .or(self.default_sla_days)
            .unwrap_or(SYSTEM_DEFAULT_SLA_DAYS)
    }

    /// Whether the current step has breached its SLA at `now`
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.is_actionable() && self.due_at.map(|due| due < now).unwrap_or(false)
    }

    fn refresh_due_at(&mut self) {
        let days = self.effective_sla_days();
        self.due_at = Some(Utc::now() + Duration::days(i64::from(days)));
    }

    fn ensure_actionable(&self) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                status: self.status,
                step: self.current_step,
            });
        }
        if !self.status.is_actionable() {
            return Err(self.not_actionable_error());
        }
        Ok(())
    }

    fn not_actionable_error(&self) -> EngineError {
        match self.status {
            RequestStatus::Draft => EngineError::NotSubmitted(self.id.0.clone()),
            status if status.is_terminal() => EngineError::AlreadyTerminal {
                status,
                step: self.current_step,
            },
            status => EngineError::Other(format!(
                "request {} is not actionable in status {:?}",
                self.id, status
            )),
        }
    }

    /// Bump the version and modification timestamp
    #[inline]
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    /// Record an engine event
    pub fn record_event(&mut self, event: Box<dyn EngineEvent>) {
        self.events.push(event);
    }

    /// Get and clear all recorded engine events
    pub fn take_events(&mut self) -> Vec<Box<dyn EngineEvent>> {
        std::mem::take(&mut self.events)
    }
}

use crate::domain::org::PersonId;
use crate::domain::request::RequestId;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Engine event trait for all events emitted by the request state machine
///
/// Events are recorded on the aggregate during a transition and handed to the
/// notifier gateway only after the transition has committed; a failing
/// downstream consumer can never roll back an applied action.
pub trait EngineEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the request this event is associated with
    fn request_id(&self) -> &RequestId;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Event: Request submitted into its first step
#[derive(Debug)]
pub struct RequestSubmitted {
    /// The request that was submitted
    pub request_id: RequestId,

    /// The requester
    pub requester: PersonId,

    /// When the submission occurred
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent for RequestSubmitted {
    fn event_type(&self) -> &'static str {
        "request.submitted"
    }

    fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: An approval moved the request to its next step
#[derive(Debug)]
pub struct StepAdvanced {
    /// The request that advanced
    pub request_id: RequestId,

    /// The approver who acted
    pub actor: PersonId,

    /// The step that was approved
    pub from_step: usize,

    /// The step now awaiting action
    pub to_step: usize,

    /// When the advance occurred
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent for StepAdvanced {
    fn event_type(&self) -> &'static str {
        "request.step_advanced"
    }

    fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Final step approved; the request is terminal
#[derive(Debug)]
pub struct RequestApproved {
    /// The approved request
    pub request_id: RequestId,

    /// The approver of the final step
    pub actor: PersonId,

    /// When the approval occurred
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent for RequestApproved {
    fn event_type(&self) -> &'static str {
        "request.approved"
    }

    fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Request rejected; the request is terminal
#[derive(Debug)]
pub struct RequestRejected {
    /// The rejected request
    pub request_id: RequestId,

    /// The approver who rejected
    pub actor: PersonId,

    /// The step at which rejection occurred
    pub step: usize,

    /// When the rejection occurred
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent for RequestRejected {
    fn event_type(&self) -> &'static str {
        "request.rejected"
    }

    fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Request sent back to an earlier step
#[derive(Debug)]
pub struct RequestReturned {
    /// The returned request
    pub request_id: RequestId,

    /// The approver who sent it back
    pub actor: PersonId,

    /// The step the return was issued from
    pub from_step: usize,

    /// The earlier step now awaiting action
    pub to_step: usize,

    /// When the return occurred
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent for RequestReturned {
    fn event_type(&self) -> &'static str {
        "request.returned"
    }

    fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: Request withdrawn by its requester before any approval
#[derive(Debug)]
pub struct RequestCancelled {
    /// The cancelled request
    pub request_id: RequestId,

    /// The requester who withdrew it
    pub requester: PersonId,

    /// When the cancellation occurred
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent for RequestCancelled {
    fn event_type(&self) -> &'static str {
        "request.cancelled"
    }

    fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Event: The current step was handed to a named person
#[derive(Debug)]
pub struct RequestReassigned {
    /// The reassigned request
    pub request_id: RequestId,

    /// The eligible approver who handed the step off
    pub actor: PersonId,

    /// The person now solely responsible for the step
    pub assignee: PersonId,

    /// The step that was reassigned
    pub step: usize,

    /// When the reassignment occurred
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent for RequestReassigned {
    fn event_type(&self) -> &'static str {
        "request.reassigned"
    }

    fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_id() -> RequestId {
        RequestId("req-1".to_string())
    }

    fn person(id: &str) -> PersonId {
        PersonId(id.to_string())
    }

    #[test]
    fn test_submitted_event() {
        let timestamp = Utc::now();
        let event = RequestSubmitted {
            request_id: request_id(),
            requester: person("p-1"),
            timestamp,
        };

        assert_eq!(event.event_type(), "request.submitted");
        assert_eq!(event.request_id(), &request_id());
        assert_eq!(event.timestamp(), timestamp);
    }

    #[test]
    fn test_step_advanced_event() {
        let event = StepAdvanced {
            request_id: request_id(),
            actor: person("p-2"),
            from_step: 0,
            to_step: 1,
            timestamp: Utc::now(),
        };

        assert_eq!(event.event_type(), "request.step_advanced");
        assert_eq!(event.from_step, 0);
        assert_eq!(event.to_step, 1);
    }

    #[test]
    fn test_terminal_events() {
        let approved = RequestApproved {
            request_id: request_id(),
            actor: person("p-2"),
            timestamp: Utc::now(),
        };
        let rejected = RequestRejected {
            request_id: request_id(),
            actor: person("p-3"),
            step: 1,
            timestamp: Utc::now(),
        };
        let cancelled = RequestCancelled {
            request_id: request_id(),
            requester: person("p-1"),
            timestamp: Utc::now(),
        };

        assert_eq!(approved.event_type(), "request.approved");
        assert_eq!(rejected.event_type(), "request.rejected");
        assert_eq!(cancelled.event_type(), "request.cancelled");
    }

    #[test]
    fn test_returned_and_reassigned_events() {
        let returned = RequestReturned {
            request_id: request_id(),
            actor: person("p-2"),
            from_step: 1,
            to_step: 0,
            timestamp: Utc::now(),
        };
        let reassigned = RequestReassigned {
            request_id: request_id(),
            actor: person("p-2"),
            assignee: person("p-9"),
            step: 1,
            timestamp: Utc::now(),
        };

        assert_eq!(returned.event_type(), "request.returned");
        assert_eq!(reassigned.event_type(), "request.reassigned");
        assert_eq!(reassigned.assignee, person("p-9"));
    }
}

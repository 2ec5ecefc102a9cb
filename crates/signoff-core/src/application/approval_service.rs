use crate::{
    domain::definition::WorkflowDefId,
    domain::events::EngineEvent,
    domain::org::{OrgUnitId, PersonId},
    domain::repository::{DefinitionRepository, RequestRepository, TimelineRepository},
    domain::request::{RequestAction, RequestId, RequestInstance, RequestStatus},
    domain::resolver::ApproverResolver,
    domain::timeline::{self, TimelineAction, TimelineEntry},
    EngineError, Payload,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Handler for committed engine events
///
/// Called strictly after a transition has committed. Implementations must
/// hand slow side effects (notifications, downstream writes) to a queue or
/// spawned task rather than performing them inline; a handler failure is
/// logged and never rolls back the transition it observed.
#[async_trait]
pub trait EngineEventHandler: Send + Sync {
    /// Handle an engine event
    async fn handle_event(&self, event: Box<dyn EngineEvent>) -> Result<(), EngineError>;
}

/// Event handler that drops all events; useful for tests and tooling
pub struct NoopEventHandler;

#[async_trait]
impl EngineEventHandler for NoopEventHandler {
    async fn handle_event(&self, _event: Box<dyn EngineEvent>) -> Result<(), EngineError> {
        Ok(())
    }
}

/// The request state machine: creates instances and applies approver actions
///
/// Every mutation is committed through a version-guarded repository write,
/// so concurrent actions on the same request resolve to exactly one winner;
/// the loser gets [`EngineError::ConcurrentModification`] and may retry once
/// after re-reading.
pub struct ApprovalService {
    /// Repository for request instances
    requests: Arc<dyn RequestRepository>,

    /// Repository for workflow definitions
    definitions: Arc<dyn DefinitionRepository>,

    /// Append-only timeline store
    timeline: Arc<dyn TimelineRepository>,

    /// Approver resolution against the org hierarchy
    resolver: Arc<ApproverResolver>,

    /// Receiver of committed events
    event_handler: Arc<dyn EngineEventHandler>,
}

impl ApprovalService {
    /// Create a new approval service
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        definitions: Arc<dyn DefinitionRepository>,
        timeline: Arc<dyn TimelineRepository>,
        resolver: Arc<ApproverResolver>,
        event_handler: Arc<dyn EngineEventHandler>,
    ) -> Self {
        Self {
            requests,
            definitions,
            timeline,
            resolver,
            event_handler,
        }
    }

    /// Create a draft without submitting it.
    ///
    /// The definition snapshot is pinned now; a draft has no timeline
    /// entries and replays to Draft.
    pub async fn save_draft(
        &self,
        requester: PersonId,
        definition_id: &WorkflowDefId,
        requester_unit: OrgUnitId,
        payload: Payload,
    ) -> Result<RequestInstance, EngineError> {
        let definition = self
            .definitions
            .find_by_id(definition_id)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound(definition_id.0.clone()))?;

        let instance =
            RequestInstance::new_draft(&definition, requester, requester_unit, payload)?;
        self.requests.insert(&instance).await?;

        info!(
            request_id = %instance.id,
            definition_id = %instance.definition_id,
            "draft created"
        );

        Ok(instance)
    }

    /// Create and submit a request in one call
    pub async fn submit(
        &self,
        requester: PersonId,
        definition_id: &WorkflowDefId,
        requester_unit: OrgUnitId,
        payload: Payload,
    ) -> Result<RequestInstance, EngineError> {
        let definition = self
            .definitions
            .find_by_id(definition_id)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound(definition_id.0.clone()))?;

        let mut instance =
            RequestInstance::new_draft(&definition, requester.clone(), requester_unit, payload)?;
        instance.submit()?;

        self.requests.insert(&instance).await?;
        self.timeline
            .append(TimelineEntry::new(
                instance.id.clone(),
                requester,
                TimelineAction::Submit,
                0,
                Some(0),
                None,
            ))
            .await?;

        info!(
            request_id = %instance.id,
            definition_id = %instance.definition_id,
            requester = %instance.requester,
            "request submitted"
        );

        self.dispatch_events(&mut instance).await;
        Ok(instance)
    }

    /// Submit a previously saved draft into its first step
    pub async fn submit_draft(
        &self,
        request_id: &RequestId,
        actor: &PersonId,
    ) -> Result<RequestInstance, EngineError> {
        let mut instance = self.load(request_id).await?;

        if *actor != instance.requester {
            return Err(EngineError::UnauthorizedActor {
                actor: actor.0.clone(),
                step: 0,
            });
        }

        let expected_version = instance.version;
        instance.submit()?;

        self.requests.update(&instance, expected_version).await?;
        self.timeline
            .append(TimelineEntry::new(
                instance.id.clone(),
                actor.clone(),
                TimelineAction::Submit,
                0,
                Some(0),
                None,
            ))
            .await?;

        info!(request_id = %instance.id, "draft submitted");

        self.dispatch_events(&mut instance).await;
        Ok(instance)
    }

    /// Apply an approver (or requester, for Cancel) action to a request.
    ///
    /// `expected_step` carries the caller's intent ("approve step 2"); when
    /// set and stale, the call fails with [`EngineError::StaleStep`] instead
    /// of silently acting on a different step. The version-guarded commit is
    /// the point at which exactly one of two concurrent callers wins.
    pub async fn act(
        &self,
        request_id: &RequestId,
        actor: &PersonId,
        action: RequestAction,
        comment: Option<String>,
        return_target: Option<usize>,
        expected_step: Option<usize>,
    ) -> Result<RequestInstance, EngineError> {
        let mut instance = self.load(request_id).await?;

        if instance.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                status: instance.status,
                step: instance.current_step,
            });
        }
        if instance.status == RequestStatus::Draft {
            return Err(EngineError::NotSubmitted(instance.id.0.clone()));
        }
        if let Some(expected) = expected_step {
            if expected != instance.current_step {
                return Err(EngineError::StaleStep {
                    expected,
                    current: instance.current_step,
                });
            }
        }

        // The engine, not the calling layer, decides who may act.
        if matches!(
            action,
            RequestAction::Approve | RequestAction::Reject | RequestAction::Return
        ) {
            self.ensure_eligible(&instance, actor).await?;
        }

        let from_step = instance.current_step;
        let expected_version = instance.version;

        let entry_action = match action {
            RequestAction::Approve => {
                instance.approve(actor)?;
                TimelineAction::Approve
            }
            RequestAction::Reject => {
                instance.reject(actor)?;
                TimelineAction::Reject
            }
            RequestAction::Return => {
                let target = return_target.ok_or(EngineError::InvalidReturnTarget {
                    target: from_step,
                    current: from_step,
                    reason: "no return target supplied".to_string(),
                })?;
                instance.return_to(actor, target)?;
                TimelineAction::Return
            }
            RequestAction::Cancel => {
                instance.cancel(actor)?;
                TimelineAction::Cancel
            }
        };

        let to_step = if instance.status.is_terminal() {
            None
        } else {
            Some(instance.current_step)
        };

        // Commit point: the version guard serializes concurrent writers.
        self.requests.update(&instance, expected_version).await?;

        let sequence = self
            .timeline
            .append(TimelineEntry::new(
                instance.id.clone(),
                actor.clone(),
                entry_action,
                from_step,
                to_step,
                comment,
            ))
            .await?;

        info!(
            request_id = %instance.id,
            actor = %actor,
            action = ?action,
            from_step,
            status = ?instance.status,
            sequence,
            "request transition applied"
        );

        self.dispatch_events(&mut instance).await;
        Ok(instance)
    }

    /// Hand the current step to a single named person.
    ///
    /// Only a currently eligible approver may reassign; the pin clears
    /// whenever the step index changes.
    pub async fn reassign(
        &self,
        request_id: &RequestId,
        actor: &PersonId,
        assignee: PersonId,
        comment: Option<String>,
    ) -> Result<RequestInstance, EngineError> {
        let mut instance = self.load(request_id).await?;

        if instance.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                status: instance.status,
                step: instance.current_step,
            });
        }
        if instance.status == RequestStatus::Draft {
            return Err(EngineError::NotSubmitted(instance.id.0.clone()));
        }

        self.ensure_eligible(&instance, actor).await?;

        let step = instance.current_step;
        let expected_version = instance.version;
        instance.reassign(actor, assignee)?;

        self.requests.update(&instance, expected_version).await?;
        self.timeline
            .append(TimelineEntry::new(
                instance.id.clone(),
                actor.clone(),
                TimelineAction::Reassign,
                step,
                Some(step),
                comment,
            ))
            .await?;

        info!(request_id = %instance.id, actor = %actor, step, "request reassigned");

        self.dispatch_events(&mut instance).await;
        Ok(instance)
    }

    /// The people currently eligible to act on a request's pending step.
    ///
    /// A pure read: resolves against the pinned requester unit and the
    /// current step's rule, honoring reassignment pins and delegations.
    /// Empty for drafts and terminal requests.
    pub async fn current_approvers(
        &self,
        request_id: &RequestId,
    ) -> Result<HashSet<PersonId>, EngineError> {
        let instance = self.load(request_id).await?;

        if !instance.status.is_actionable() {
            return Ok(HashSet::new());
        }

        self.eligible_actors(&instance).await
    }

    /// The full ordered timeline of a request
    pub async fn get_timeline(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<TimelineEntry>, EngineError> {
        // Existence check keeps "no such request" distinct from "no entries"
        self.load(request_id).await?;
        self.timeline.list_for_request(request_id).await
    }

    /// Every timeline entry a person appears in as actor, newest first
    pub async fn timeline_for_actor(
        &self,
        actor: &PersonId,
    ) -> Result<Vec<TimelineEntry>, EngineError> {
        self.timeline.list_for_actor(actor).await
    }

    /// Reconstruct `(status, step)` purely from the timeline log.
    ///
    /// Must equal the live projection after every successful action; the
    /// log, not the instance row, is the source of truth.
    pub async fn replay(
        &self,
        request_id: &RequestId,
    ) -> Result<(RequestStatus, usize), EngineError> {
        let entries = self.timeline.list_for_request(request_id).await?;
        timeline::replay(request_id, &entries)
    }

    /// Actionable requests whose current step breached its SLA before `now`.
    ///
    /// The engine never escalates on its own; an external scheduler consumes
    /// this and calls `act` or administrative operations.
    pub async fn list_overdue(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RequestInstance>, EngineError> {
        self.requests.list_due_before(now).await
    }

    /// Fetch a request by ID
    pub async fn get_request(
        &self,
        request_id: &RequestId,
    ) -> Result<RequestInstance, EngineError> {
        self.load(request_id).await
    }

    async fn load(&self, request_id: &RequestId) -> Result<RequestInstance, EngineError> {
        self.requests
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.0.clone()))
    }

    async fn eligible_actors(
        &self,
        instance: &RequestInstance,
    ) -> Result<HashSet<PersonId>, EngineError> {
        match &instance.assignee {
            Some(assignee) => self.resolver.expand_assignee(assignee).await,
            None => {
                let step = instance.current_step_def()?;
                self.resolver
                    .resolve_for_step(step, &instance.requester_unit)
                    .await
            }
        }
    }

    async fn ensure_eligible(
        &self,
        instance: &RequestInstance,
        actor: &PersonId,
    ) -> Result<(), EngineError> {
        let eligible = self.eligible_actors(instance).await?;

        if !eligible.contains(actor) {
            warn!(
                request_id = %instance.id,
                actor = %actor,
                step = instance.current_step,
                "actor denied: not in resolved approver set"
            );
            return Err(EngineError::UnauthorizedActor {
                actor: actor.0.clone(),
                step: instance.current_step,
            });
        }

        Ok(())
    }

    /// Hand committed events to the gateway; handler failures are logged
    /// and never unwound into the caller
    async fn dispatch_events(&self, instance: &mut RequestInstance) {
        for event in instance.take_events() {
            let event_type = event.event_type();
            if let Err(err) = self.event_handler.handle_event(event).await {
                warn!(
                    request_id = %instance.id,
                    event_type,
                    error = %err,
                    "event handler failed; transition remains committed"
                );
            }
        }
    }
}

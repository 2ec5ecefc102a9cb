use crate::{
    domain::definition::{WorkflowDefId, WorkflowDefinition},
    domain::delegation::{Delegation, DelegationId},
    domain::org::{OrgUnitId, PersonId},
    domain::repository::{
        DefinitionRepository, DelegationRepository, OrgDirectoryRepository, RequestRepository,
        TimelineRepository,
    },
    domain::request::{RequestAction, RequestId, RequestInstance, RequestStatus},
    domain::resolver::ApproverResolver,
    domain::timeline::TimelineEntry,
    EngineError, Payload,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::application::approval_service::{ApprovalService, EngineEventHandler};
use crate::application::definition_service::DefinitionService;
use crate::application::delegation_service::DelegationService;

/// The repositories the engine runs against
pub type RepositoriesTuple = (
    Arc<dyn RequestRepository>,
    Arc<dyn DefinitionRepository>,
    Arc<dyn TimelineRepository>,
    Arc<dyn OrgDirectoryRepository>,
    Arc<dyn DelegationRepository>,
);

/// Summary information about a request instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSummary {
    /// Request ID
    pub id: String,

    /// Workflow definition ID
    pub definition_id: String,

    /// Requester
    pub requester: String,

    /// Current status
    pub status: String,

    /// Current step index
    pub current_step: usize,

    /// Creation timestamp
    pub created_at: String,

    /// Last updated timestamp
    pub updated_at: String,
}

impl From<&RequestInstance> for RequestSummary {
    fn from(instance: &RequestInstance) -> Self {
        Self {
            id: instance.id.0.clone(),
            definition_id: instance.definition_id.0.clone(),
            requester: instance.requester.0.clone(),
            status: format!("{:?}", instance.status),
            current_step: instance.current_step,
            created_at: instance.created_at.to_rfc3339(),
            updated_at: instance.updated_at.to_rfc3339(),
        }
    }
}

/// The main API the Signoff engine offers to the surrounding portal
///
/// Transport (HTTP handlers, page controllers) is a portal concern; this
/// facade is the operation-level contract they call into.
#[derive(Clone)]
pub struct ApprovalEngine {
    approvals: Arc<ApprovalService>,
    definitions: Arc<DefinitionService>,
    delegations: Arc<DelegationService>,
}

impl ApprovalEngine {
    /// Create a new engine from already-wired services
    pub fn new(
        approvals: Arc<ApprovalService>,
        definitions: Arc<DefinitionService>,
        delegations: Arc<DelegationService>,
    ) -> Self {
        Self {
            approvals,
            definitions,
            delegations,
        }
    }

    /// Create an engine with externally-provided repositories.
    ///
    /// This is the preferred way to construct the engine: state-store crates
    /// supply the repository implementations without coupling the core to
    /// any specific infrastructure.
    pub fn with_repositories(
        repositories: RepositoriesTuple,
        event_handler: Arc<dyn EngineEventHandler>,
    ) -> Self {
        let (requests, definitions, timeline, directory, delegations) = repositories;

        let resolver = Arc::new(ApproverResolver::new(directory, delegations.clone()));

        let approval_service = Arc::new(ApprovalService::new(
            requests,
            definitions.clone(),
            timeline,
            resolver,
            event_handler,
        ));
        let definition_service = Arc::new(DefinitionService::new(definitions));
        let delegation_service = Arc::new(DelegationService::new(delegations));

        Self::new(approval_service, definition_service, delegation_service)
    }

    // --- request lifecycle -------------------------------------------------

    /// Submit a request; returns the new request's ID
    pub async fn submit(
        &self,
        requester: PersonId,
        definition_id: &WorkflowDefId,
        requester_unit: OrgUnitId,
        payload: Payload,
    ) -> Result<RequestId, EngineError> {
        let instance = self
            .approvals
            .submit(requester, definition_id, requester_unit, payload)
            .await?;
        Ok(instance.id)
    }

    /// Create a draft without submitting it
    pub async fn save_draft(
        &self,
        requester: PersonId,
        definition_id: &WorkflowDefId,
        requester_unit: OrgUnitId,
        payload: Payload,
    ) -> Result<RequestId, EngineError> {
        let instance = self
            .approvals
            .save_draft(requester, definition_id, requester_unit, payload)
            .await?;
        Ok(instance.id)
    }

    /// Submit a previously saved draft
    pub async fn submit_draft(
        &self,
        request_id: &RequestId,
        actor: &PersonId,
    ) -> Result<(RequestStatus, usize), EngineError> {
        let instance = self.approvals.submit_draft(request_id, actor).await?;
        Ok((instance.status, instance.current_step))
    }

    /// Apply an action to a request; returns the resulting
    /// `(status, step_index)`
    pub async fn act(
        &self,
        request_id: &RequestId,
        actor: &PersonId,
        action: RequestAction,
        comment: Option<String>,
        return_target: Option<usize>,
        expected_step: Option<usize>,
    ) -> Result<(RequestStatus, usize), EngineError> {
        let instance = self
            .approvals
            .act(request_id, actor, action, comment, return_target, expected_step)
            .await?;
        Ok((instance.status, instance.current_step))
    }

    /// Hand the current step of a request to a named person
    pub async fn reassign(
        &self,
        request_id: &RequestId,
        actor: &PersonId,
        assignee: PersonId,
        comment: Option<String>,
    ) -> Result<(), EngineError> {
        self.approvals
            .reassign(request_id, actor, assignee, comment)
            .await?;
        Ok(())
    }

    /// The people currently eligible to act on a request
    pub async fn get_current_approvers(
        &self,
        request_id: &RequestId,
    ) -> Result<HashSet<PersonId>, EngineError> {
        self.approvals.current_approvers(request_id).await
    }

    /// The ordered timeline of a request, for audit and UI rendering
    pub async fn get_timeline(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<TimelineEntry>, EngineError> {
        self.approvals.get_timeline(request_id).await
    }

    /// Every timeline entry recorded for an actor, newest first
    pub async fn get_timeline_for_actor(
        &self,
        actor: &PersonId,
    ) -> Result<Vec<TimelineEntry>, EngineError> {
        self.approvals.timeline_for_actor(actor).await
    }

    /// Reconstruct a request's `(status, step)` purely from its timeline
    pub async fn replay(
        &self,
        request_id: &RequestId,
    ) -> Result<(RequestStatus, usize), EngineError> {
        self.approvals.replay(request_id).await
    }

    /// Summary view of a request
    pub async fn get_request_summary(
        &self,
        request_id: &RequestId,
    ) -> Result<RequestSummary, EngineError> {
        let instance = self.approvals.get_request(request_id).await?;
        Ok(RequestSummary::from(&instance))
    }

    /// Actionable requests past their SLA at `now`, for external escalation
    pub async fn list_overdue(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<RequestSummary>, EngineError> {
        let overdue = self.approvals.list_overdue(now).await?;
        Ok(overdue.iter().map(RequestSummary::from).collect())
    }

    // --- definitions -------------------------------------------------------

    /// Create a workflow definition
    pub async fn create_definition(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<(), EngineError> {
        self.definitions.create(definition).await
    }

    /// Update a workflow definition; in-flight requests keep their snapshots
    pub async fn update_definition(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<(), EngineError> {
        self.definitions.update(definition).await
    }

    /// Fetch a workflow definition
    pub async fn get_definition(
        &self,
        id: &WorkflowDefId,
    ) -> Result<WorkflowDefinition, EngineError> {
        self.definitions.get(id).await
    }

    /// List all workflow definition IDs
    pub async fn list_definitions(&self) -> Result<Vec<WorkflowDefId>, EngineError> {
        self.definitions.list().await
    }

    /// Validate a definition without saving; returns every violation found.
    /// Consumed by the portal's workflow-configuration screen.
    pub fn validate_definition(&self, definition: &WorkflowDefinition) -> Vec<String> {
        self.definitions.validate(definition)
    }

    // --- delegations -------------------------------------------------------

    /// Grant a delegation of approval authority
    pub async fn grant_delegation(
        &self,
        from: PersonId,
        to: PersonId,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<Delegation, EngineError> {
        self.delegations
            .grant(from, to, starts_at, expires_at, note)
            .await
    }

    /// Revoke a delegation
    pub async fn revoke_delegation(&self, id: &DelegationId) -> Result<(), EngineError> {
        self.delegations.revoke(id).await
    }

    /// List all delegations
    pub async fn list_delegations(&self) -> Result<Vec<Delegation>, EngineError> {
        self.delegations.list().await
    }
}

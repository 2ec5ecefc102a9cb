use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use signoff_core::{
    Delegation, DelegationId, DelegationRepository, DefinitionRepository, EngineError, OrgUnit,
    OrgUnitId, OrgUnitKind, OrgDirectoryRepository, PersonId, RequestId, RequestInstance,
    RequestRepository, RequestStatus, RoleAssignment, RoleName, TimelineEntry,
    TimelineRepository, WorkflowDefId, WorkflowDefinition,
};

/// In-memory implementation of the RequestRepository
///
/// The version comparison in `update` runs under the map's write lock, so it
/// behaves as a compare-and-swap: of two concurrent writers, exactly one
/// commits.
pub struct InMemoryRequestRepository {
    requests: Arc<RwLock<HashMap<String, RequestInstance>>>,
}

impl InMemoryRequestRepository {
    /// Create a new in-memory request repository
    pub fn new(requests: Arc<RwLock<HashMap<String, RequestInstance>>>) -> Self {
        Self { requests }
    }
}

#[async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<RequestInstance>, EngineError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn insert(&self, instance: &RequestInstance) -> Result<(), EngineError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&instance.id.0) {
            return Err(EngineError::StoreError(format!(
                "request {} already exists",
                instance.id
            )));
        }
        requests.insert(instance.id.0.clone(), instance.clone());
        Ok(())
    }

    async fn update(
        &self,
        instance: &RequestInstance,
        expected_version: u64,
    ) -> Result<(), EngineError> {
        let mut requests = self.requests.write().await;

        let stored = requests
            .get(&instance.id.0)
            .ok_or_else(|| EngineError::RequestNotFound(instance.id.0.clone()))?;

        if stored.version != expected_version {
            tracing::debug!(
                request_id = %instance.id,
                expected_version,
                stored_version = stored.version,
                "version check failed; concurrent writer won"
            );
            return Err(EngineError::ConcurrentModification {
                request_id: instance.id.0.clone(),
                expected: expected_version,
            });
        }

        requests.insert(instance.id.0.clone(), instance.clone());
        Ok(())
    }

    async fn list_by_status(
        &self,
        status: Option<&RequestStatus>,
    ) -> Result<Vec<RequestInstance>, EngineError> {
        let requests = self.requests.read().await;

        let result = requests
            .values()
            .filter(|instance| match status {
                Some(s) => instance.status == *s,
                None => true,
            })
            .cloned()
            .collect();

        Ok(result)
    }

    async fn list_due_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RequestInstance>, EngineError> {
        let requests = self.requests.read().await;

        let result = requests
            .values()
            .filter(|instance| {
                instance.status.is_actionable()
                    && instance.due_at.map(|due| due < cutoff).unwrap_or(false)
            })
            .cloned()
            .collect();

        Ok(result)
    }
}

/// In-memory implementation of the DefinitionRepository
pub struct InMemoryDefinitionRepository {
    definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>,
}

impl InMemoryDefinitionRepository {
    /// Create a new in-memory definition repository
    pub fn new(definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>) -> Self {
        Self { definitions }
    }
}

#[async_trait]
impl DefinitionRepository for InMemoryDefinitionRepository {
    async fn find_by_id(
        &self,
        id: &WorkflowDefId,
    ) -> Result<Option<WorkflowDefinition>, EngineError> {
        let definitions = self.definitions.read().await;
        Ok(definitions.get(&id.0).cloned())
    }

    async fn save(&self, definition: &WorkflowDefinition) -> Result<(), EngineError> {
        let mut definitions = self.definitions.write().await;
        definitions.insert(definition.id.0.clone(), definition.clone());
        Ok(())
    }

    async fn delete(&self, id: &WorkflowDefId) -> Result<(), EngineError> {
        let mut definitions = self.definitions.write().await;
        definitions.remove(&id.0);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<WorkflowDefId>, EngineError> {
        let definitions = self.definitions.read().await;
        Ok(definitions.keys().map(|k| WorkflowDefId(k.clone())).collect())
    }

    async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, EngineError> {
        let definitions = self.definitions.read().await;
        Ok(definitions.values().cloned().collect())
    }
}

/// In-memory implementation of the append-only TimelineRepository
pub struct InMemoryTimelineRepository {
    timelines: Arc<RwLock<HashMap<String, Vec<TimelineEntry>>>>,
}

impl InMemoryTimelineRepository {
    /// Create a new in-memory timeline repository
    pub fn new(timelines: Arc<RwLock<HashMap<String, Vec<TimelineEntry>>>>) -> Self {
        Self { timelines }
    }
}

#[async_trait]
impl TimelineRepository for InMemoryTimelineRepository {
    async fn append(&self, mut entry: TimelineEntry) -> Result<u64, EngineError> {
        // Sequence assignment and push happen under one write lock, keeping
        // per-request sequences gap-free.
        let mut timelines = self.timelines.write().await;
        let log = timelines.entry(entry.request_id.0.clone()).or_default();

        let sequence = log.len() as u64 + 1;
        entry.sequence = sequence;
        log.push(entry);

        Ok(sequence)
    }

    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<TimelineEntry>, EngineError> {
        let timelines = self.timelines.read().await;
        Ok(timelines.get(&id.0).cloned().unwrap_or_default())
    }

    async fn list_for_actor(&self, actor: &PersonId) -> Result<Vec<TimelineEntry>, EngineError> {
        let timelines = self.timelines.read().await;

        let mut result: Vec<TimelineEntry> = timelines
            .values()
            .flat_map(|log| log.iter().filter(|e| e.actor == *actor).cloned())
            .collect();
        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(result)
    }
}

/// In-memory implementation of the OrgDirectoryRepository
pub struct InMemoryOrgDirectory {
    units: Arc<RwLock<HashMap<String, OrgUnit>>>,
    assignments: Arc<RwLock<HashMap<String, Vec<RoleAssignment>>>>,
}

impl InMemoryOrgDirectory {
    /// Create a new in-memory org directory
    pub fn new(
        units: Arc<RwLock<HashMap<String, OrgUnit>>>,
        assignments: Arc<RwLock<HashMap<String, Vec<RoleAssignment>>>>,
    ) -> Self {
        Self { units, assignments }
    }

    fn check_chain(
        units: &HashMap<String, OrgUnit>,
        unit: &OrgUnit,
    ) -> Result<(), EngineError> {
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(unit.id.0.clone());

        let mut last_kind = unit.kind;
        let mut cursor = unit.parent.clone();

        while let Some(parent_id) = cursor {
            if !visited.insert(parent_id.0.clone()) {
                return Err(EngineError::ScopeResolution(format!(
                    "cycle in parent chain of unit {}",
                    unit.id
                )));
            }

            let parent = units
                .get(&parent_id.0)
                .ok_or_else(|| EngineError::OrgUnitNotFound(parent_id.0.clone()))?;
            last_kind = parent.kind;
            cursor = parent.parent.clone();
        }

        if last_kind != OrgUnitKind::Organization {
            return Err(EngineError::ScopeResolution(format!(
                "parent chain of unit {} does not terminate at an Organization",
                unit.id
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl OrgDirectoryRepository for InMemoryOrgDirectory {
    async fn find_unit(&self, id: &OrgUnitId) -> Result<Option<OrgUnit>, EngineError> {
        let units = self.units.read().await;
        Ok(units.get(&id.0).cloned())
    }

    async fn save_unit(&self, unit: &OrgUnit) -> Result<(), EngineError> {
        let mut units = self.units.write().await;

        let parent_kind = match &unit.parent {
            None => None,
            Some(parent_id) => Some(
                units
                    .get(&parent_id.0)
                    .ok_or_else(|| EngineError::OrgUnitNotFound(parent_id.0.clone()))?
                    .kind,
            ),
        };
        unit.validate_attachment(parent_kind)?;
        Self::check_chain(&units, unit)?;

        units.insert(unit.id.0.clone(), unit.clone());
        Ok(())
    }

    async fn role_holders(
        &self,
        role: &RoleName,
        unit: &OrgUnitId,
    ) -> Result<HashSet<PersonId>, EngineError> {
        let assignments = self.assignments.read().await;

        let holders = assignments
            .get(&unit.0)
            .map(|list| {
                list.iter()
                    .filter(|a| a.role == *role)
                    .map(|a| a.person.clone())
                    .collect()
            })
            .unwrap_or_default();

        Ok(holders)
    }

    async fn assign_role(&self, assignment: &RoleAssignment) -> Result<(), EngineError> {
        {
            let units = self.units.read().await;
            if !units.contains_key(&assignment.unit.0) {
                return Err(EngineError::OrgUnitNotFound(assignment.unit.0.clone()));
            }
        }

        let mut assignments = self.assignments.write().await;
        let list = assignments.entry(assignment.unit.0.clone()).or_default();
        if !list.contains(assignment) {
            list.push(assignment.clone());
        }
        Ok(())
    }

    async fn revoke_role(&self, assignment: &RoleAssignment) -> Result<(), EngineError> {
        let mut assignments = self.assignments.write().await;
        if let Some(list) = assignments.get_mut(&assignment.unit.0) {
            list.retain(|a| a != assignment);
        }
        Ok(())
    }
}

/// In-memory implementation of the DelegationRepository
pub struct InMemoryDelegationRepository {
    delegations: Arc<RwLock<HashMap<String, Delegation>>>,
}

impl InMemoryDelegationRepository {
    /// Create a new in-memory delegation repository
    pub fn new(delegations: Arc<RwLock<HashMap<String, Delegation>>>) -> Self {
        Self { delegations }
    }
}

#[async_trait]
impl DelegationRepository for InMemoryDelegationRepository {
    async fn find_by_id(&self, id: &DelegationId) -> Result<Option<Delegation>, EngineError> {
        let delegations = self.delegations.read().await;
        Ok(delegations.get(&id.0).cloned())
    }

    async fn save(&self, delegation: &Delegation) -> Result<(), EngineError> {
        let mut delegations = self.delegations.write().await;
        delegations.insert(delegation.id.0.clone(), delegation.clone());
        Ok(())
    }

    async fn active_for(
        &self,
        delegator: &PersonId,
        at: DateTime<Utc>,
    ) -> Result<Vec<Delegation>, EngineError> {
        let delegations = self.delegations.read().await;

        Ok(delegations
            .values()
            .filter(|d| d.from == *delegator && d.is_active_at(at))
            .cloned()
            .collect())
    }

    async fn find_overlapping(
        &self,
        delegatee: &PersonId,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Delegation>, EngineError> {
        let delegations = self.delegations.read().await;

        Ok(delegations
            .values()
            .find(|d| d.to == *delegatee && d.overlaps(starts_at, expires_at))
            .cloned())
    }

    async fn find_all(&self) -> Result<Vec<Delegation>, EngineError> {
        let delegations = self.delegations.read().await;
        Ok(delegations.values().cloned().collect())
    }
}

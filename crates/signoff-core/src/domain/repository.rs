//! Repository traits for the Signoff core
//!
//! This module defines the persistence interfaces the engine runs against.
//! External crates implement these traits to provide real stores; the
//! `memory` module provides dashmap-backed implementations for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use super::delegation::{Delegation, DelegationId};
use super::definition::{WorkflowDefId, WorkflowDefinition};
use super::org::{OrgUnit, OrgUnitId, PersonId, RoleAssignment, RoleName};
use super::request::{RequestId, RequestInstance, RequestStatus};
use super::timeline::TimelineEntry;
use crate::EngineError;

/// Repository for request instances
///
/// `update` is the engine's per-request mutual-exclusion point: it commits
/// only when the stored version still matches what the writer read, so two
/// concurrent actions on one request can never both succeed.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Find a request by ID
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<RequestInstance>, EngineError>;

    /// Insert a newly created request
    async fn insert(&self, instance: &RequestInstance) -> Result<(), EngineError>;

    /// Commit a mutation, guarded by the version the writer read.
    ///
    /// Fails with [`EngineError::ConcurrentModification`] when another
    /// writer committed first.
    async fn update(
        &self,
        instance: &RequestInstance,
        expected_version: u64,
    ) -> Result<(), EngineError>;

    /// List requests, optionally filtered by status
    async fn list_by_status(
        &self,
        status: Option<&RequestStatus>,
    ) -> Result<Vec<RequestInstance>, EngineError>;

    /// List actionable requests whose current step is due before `cutoff`
    async fn list_due_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RequestInstance>, EngineError>;
}

/// Repository for workflow definitions
#[async_trait]
pub trait DefinitionRepository: Send + Sync {
    /// Find a definition by ID
    async fn find_by_id(&self, id: &WorkflowDefId)
        -> Result<Option<WorkflowDefinition>, EngineError>;

    /// Save a definition (insert or replace)
    async fn save(&self, definition: &WorkflowDefinition) -> Result<(), EngineError>;

    /// Delete a definition
    async fn delete(&self, id: &WorkflowDefId) -> Result<(), EngineError>;

    /// List all definition IDs
    async fn list_ids(&self) -> Result<Vec<WorkflowDefId>, EngineError>;

    /// Get all definitions
    async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, EngineError>;
}

/// Append-only repository for timeline entries
#[async_trait]
pub trait TimelineRepository: Send + Sync {
    /// Append an entry, assigning the next gap-free sequence number for its
    /// request; returns the assigned sequence. Appending is the only
    /// mutation this repository supports.
    async fn append(&self, entry: TimelineEntry) -> Result<u64, EngineError>;

    /// All entries for a request, ordered by sequence number
    async fn list_for_request(&self, id: &RequestId) -> Result<Vec<TimelineEntry>, EngineError>;

    /// All entries recorded for an actor across requests, newest first
    async fn list_for_actor(&self, actor: &PersonId) -> Result<Vec<TimelineEntry>, EngineError>;
}

/// Read/write access to the organizational hierarchy and role assignments
///
/// The engine itself only reads; writes exist for the external
/// administration collaborator (and test fixtures) that maintains the tree.
#[async_trait]
pub trait OrgDirectoryRepository: Send + Sync {
    /// Find a unit by ID
    async fn find_unit(&self, id: &OrgUnitId) -> Result<Option<OrgUnit>, EngineError>;

    /// Save a unit, enforcing parent-kind restrictions and that the parent
    /// chain is acyclic and terminates at an Organization
    async fn save_unit(&self, unit: &OrgUnit) -> Result<(), EngineError>;

    /// Current holders of `role` at exactly `unit`.
    ///
    /// An empty set is a normal outcome, distinct from resolution failure.
    async fn role_holders(
        &self,
        role: &RoleName,
        unit: &OrgUnitId,
    ) -> Result<HashSet<PersonId>, EngineError>;

    /// Record a role assignment
    async fn assign_role(&self, assignment: &RoleAssignment) -> Result<(), EngineError>;

    /// Remove a role assignment
    async fn revoke_role(&self, assignment: &RoleAssignment) -> Result<(), EngineError>;
}

/// Repository for delegations of approval authority
#[async_trait]
pub trait DelegationRepository: Send + Sync {
    /// Find a delegation by ID
    async fn find_by_id(&self, id: &DelegationId) -> Result<Option<Delegation>, EngineError>;

    /// Save a delegation (insert or replace)
    async fn save(&self, delegation: &Delegation) -> Result<(), EngineError>;

    /// Delegations granting authority on behalf of `delegator` at `at`
    async fn active_for(
        &self,
        delegator: &PersonId,
        at: DateTime<Utc>,
    ) -> Result<Vec<Delegation>, EngineError>;

    /// An active delegation to `delegatee` whose window intersects the
    /// given one, if any
    async fn find_overlapping(
        &self,
        delegatee: &PersonId,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Delegation>, EngineError>;

    /// All delegations
    async fn find_all(&self) -> Result<Vec<Delegation>, EngineError>;
}

/// Memory implementations for testing
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use crate::domain::org::OrgUnitKind;
    use dashmap::DashMap;
    use std::sync::Arc;

    /// In-memory request repository backed by a concurrent map.
    ///
    /// The version check in `update` runs under the map entry's shard lock,
    /// so it is a true compare-and-swap.
    pub struct MemoryRequestRepository {
        requests: Arc<DashMap<String, RequestInstance>>,
    }

    impl MemoryRequestRepository {
        /// Create a new memory request repository
        pub fn new() -> Self {
            Self {
                requests: Arc::new(DashMap::with_capacity(64)),
            }
        }
    }

    impl Default for MemoryRequestRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl RequestRepository for MemoryRequestRepository {
        async fn find_by_id(
            &self,
            id: &RequestId,
        ) -> Result<Option<RequestInstance>, EngineError> {
            Ok(self.requests.get(&id.0).map(|r| r.clone()))
        }

        async fn insert(&self, instance: &RequestInstance) -> Result<(), EngineError> {
            match self.requests.entry(instance.id.0.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => Err(EngineError::StoreError(
                    format!("request {} already exists", instance.id),
                )),
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    vacant.insert(instance.clone());
                    Ok(())
                }
            }
        }

        async fn update(
            &self,
            instance: &RequestInstance,
            expected_version: u64,
        ) -> Result<(), EngineError> {
            match self.requests.entry(instance.id.0.clone()) {
                dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                    if occupied.get().version != expected_version {
                        return Err(EngineError::ConcurrentModification {
                            request_id: instance.id.0.clone(),
                            expected: expected_version,
                        });
                    }
                    occupied.insert(instance.clone());
                    Ok(())
                }
                dashmap::mapref::entry::Entry::Vacant(_) => {
                    Err(EngineError::RequestNotFound(instance.id.0.clone()))
                }
            }
        }

        async fn list_by_status(
            &self,
            status: Option<&RequestStatus>,
        ) -> Result<Vec<RequestInstance>, EngineError> {
            let result = self
                .requests
                .iter()
                .filter(|entry| status.map(|s| entry.status == *s).unwrap_or(true))
                .map(|entry| entry.clone())
                .collect();
            Ok(result)
        }

        async fn list_due_before(
            &self,
            cutoff: DateTime<Utc>,
        ) -> Result<Vec<RequestInstance>, EngineError> {
            let result = self
                .requests
                .iter()
                .filter(|entry| {
                    entry.status.is_actionable()
                        && entry.due_at.map(|due| due < cutoff).unwrap_or(false)
                })
                .map(|entry| entry.clone())
                .collect();
            Ok(result)
        }
    }

    /// In-memory workflow definition repository
    pub struct MemoryDefinitionRepository {
        definitions: Arc<DashMap<String, WorkflowDefinition>>,
    }

    impl MemoryDefinitionRepository {
        /// Create a new memory definition repository
        pub fn new() -> Self {
            Self {
                definitions: Arc::new(DashMap::with_capacity(16)),
            }
        }
    }

    impl Default for MemoryDefinitionRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl DefinitionRepository for MemoryDefinitionRepository {
        async fn find_by_id(
            &self,
            id: &WorkflowDefId,
        ) -> Result<Option<WorkflowDefinition>, EngineError> {
            Ok(self.definitions.get(&id.0).map(|d| d.clone()))
        }

        async fn save(&self, definition: &WorkflowDefinition) -> Result<(), EngineError> {
            self.definitions
                .insert(definition.id.0.clone(), definition.clone());
            Ok(())
        }

        async fn delete(&self, id: &WorkflowDefId) -> Result<(), EngineError> {
            self.definitions.remove(&id.0);
            Ok(())
        }

        async fn list_ids(&self) -> Result<Vec<WorkflowDefId>, EngineError> {
            Ok(self
                .definitions
                .iter()
                .map(|entry| WorkflowDefId(entry.key().clone()))
                .collect())
        }

        async fn find_all(&self) -> Result<Vec<WorkflowDefinition>, EngineError> {
            Ok(self.definitions.iter().map(|entry| entry.clone()).collect())
        }
    }

    /// In-memory append-only timeline repository
    pub struct MemoryTimelineRepository {
        entries: Arc<DashMap<String, Vec<TimelineEntry>>>,
    }

    impl MemoryTimelineRepository {
        /// Create a new memory timeline repository
        pub fn new() -> Self {
            Self {
                entries: Arc::new(DashMap::with_capacity(64)),
            }
        }
    }

    impl Default for MemoryTimelineRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl TimelineRepository for MemoryTimelineRepository {
        async fn append(&self, mut entry: TimelineEntry) -> Result<u64, EngineError> {
            // The entry lock makes length-read and push atomic per request.
            let mut log = self
                .entries
                .entry(entry.request_id.0.clone())
                .or_default();
            let sequence = log.len() as u64 + 1;
            entry.sequence = sequence;
            log.push(entry);
            Ok(sequence)
        }

        async fn list_for_request(
            &self,
            id: &RequestId,
        ) -> Result<Vec<TimelineEntry>, EngineError> {
            Ok(self
                .entries
                .get(&id.0)
                .map(|log| log.clone())
                .unwrap_or_default())
        }

        async fn list_for_actor(
            &self,
            actor: &PersonId,
        ) -> Result<Vec<TimelineEntry>, EngineError> {
            let mut result: Vec<TimelineEntry> = self
                .entries
                .iter()
                .flat_map(|log| {
                    log.iter()
                        .filter(|e| e.actor == *actor)
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .collect();
            result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            Ok(result)
        }
    }

    /// In-memory org directory: units and role assignments
    pub struct MemoryOrgDirectory {
        units: Arc<DashMap<String, OrgUnit>>,
        assignments: Arc<DashMap<String, Vec<RoleAssignment>>>,
    }

    impl MemoryOrgDirectory {
        /// Create a new memory org directory
        pub fn new() -> Self {
            Self {
                units: Arc::new(DashMap::with_capacity(32)),
                assignments: Arc::new(DashMap::with_capacity(32)),
            }
        }

        fn parent_kind_of(&self, unit: &OrgUnit) -> Result<Option<OrgUnitKind>, EngineError> {
            match &unit.parent {
                None => Ok(None),
                Some(parent_id) => {
                    let parent = self.units.get(&parent_id.0).ok_or_else(|| {
                        EngineError::OrgUnitNotFound(parent_id.0.clone())
                    })?;
                    Ok(Some(parent.kind))
                }
            }
        }

        fn check_chain_roots_at_organization(&self, unit: &OrgUnit) -> Result<(), EngineError> {
            let mut visited = HashSet::new();
            visited.insert(unit.id.0.clone());

            let mut cursor = unit.parent.clone();
            let mut last_kind = unit.kind;

            while let Some(parent_id) = cursor {
                if !visited.insert(parent_id.0.clone()) {
                    return Err(EngineError::ScopeResolution(format!(
                        "cycle in parent chain of unit {}",
                        unit.id
                    )));
                }

                let parent = self
                    .units
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

    impl Default for MemoryOrgDirectory {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl OrgDirectoryRepository for MemoryOrgDirectory {
        async fn find_unit(&self, id: &OrgUnitId) -> Result<Option<OrgUnit>, EngineError> {
            Ok(self.units.get(&id.0).map(|u| u.clone()))
        }

        async fn save_unit(&self, unit: &OrgUnit) -> Result<(), EngineError> {
            unit.validate_attachment(self.parent_kind_of(unit)?)?;
            self.check_chain_roots_at_organization(unit)?;
            self.units.insert(unit.id.0.clone(), unit.clone());
            Ok(())
        }

        async fn role_holders(
            &self,
            role: &RoleName,
            unit: &OrgUnitId,
        ) -> Result<HashSet<PersonId>, EngineError> {
            let holders = self
                .assignments
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
            if !self.units.contains_key(&assignment.unit.0) {
                return Err(EngineError::OrgUnitNotFound(assignment.unit.0.clone()));
            }

            let mut list = self.assignments.entry(assignment.unit.0.clone()).or_default();
            if !list.contains(assignment) {
                list.push(assignment.clone());
            }
            Ok(())
        }

        async fn revoke_role(&self, assignment: &RoleAssignment) -> Result<(), EngineError> {
            if let Some(mut list) = self.assignments.get_mut(&assignment.unit.0) {
                list.retain(|a| a != assignment);
            }
            Ok(())
        }
    }

    /// In-memory delegation repository
    pub struct MemoryDelegationRepository {
        delegations: Arc<DashMap<String, Delegation>>,
    }

    impl MemoryDelegationRepository {
        /// Create a new memory delegation repository
        pub fn new() -> Self {
            Self {
                delegations: Arc::new(DashMap::with_capacity(16)),
            }
        }
    }

    impl Default for MemoryDelegationRepository {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl DelegationRepository for MemoryDelegationRepository {
        async fn find_by_id(&self, id: &DelegationId) -> Result<Option<Delegation>, EngineError> {
            Ok(self.delegations.get(&id.0).map(|d| d.clone()))
        }

        async fn save(&self, delegation: &Delegation) -> Result<(), EngineError> {
            self.delegations
                .insert(delegation.id.0.clone(), delegation.clone());
            Ok(())
        }

        async fn active_for(
            &self,
            delegator: &PersonId,
            at: DateTime<Utc>,
        ) -> Result<Vec<Delegation>, EngineError> {
            Ok(self
                .delegations
                .iter()
                .filter(|d| d.from == *delegator && d.is_active_at(at))
                .map(|d| d.clone())
                .collect())
        }

        async fn find_overlapping(
            &self,
            delegatee: &PersonId,
            starts_at: DateTime<Utc>,
            expires_at: DateTime<Utc>,
        ) -> Result<Option<Delegation>, EngineError> {
            Ok(self
                .delegations
                .iter()
                .find(|d| d.to == *delegatee && d.overlaps(starts_at, expires_at))
                .map(|d| d.clone()))
        }

        async fn find_all(&self) -> Result<Vec<Delegation>, EngineError> {
            Ok(self.delegations.iter().map(|d| d.clone()).collect())
        }
    }
}

//! In-memory state store implementation for the Signoff platform
//!
//! This crate provides in-memory implementations of the core repository
//! interfaces defined in the signoff-core crate. It is primarily useful for
//! development, testing, and simple deployments where persistence is not
//! required.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod repositories;
pub use repositories::{
    InMemoryDefinitionRepository, InMemoryDelegationRepository, InMemoryOrgDirectory,
    InMemoryRequestRepository, InMemoryTimelineRepository,
};

#[cfg(test)]
mod tests;

use signoff_core::{
    Delegation, OrgUnit, RepositoriesTuple, RequestInstance, RoleAssignment, TimelineEntry,
    WorkflowDefinition,
};

/// Provider for in-memory state store repositories
///
/// Owns the shared storage maps; repositories created from one provider see
/// the same data, so an engine and a test can observe each other's writes.
pub struct InMemoryStateStoreProvider {
    // Shared storage for request instances
    requests: Arc<RwLock<HashMap<String, RequestInstance>>>,

    // Shared storage for workflow definitions
    definitions: Arc<RwLock<HashMap<String, WorkflowDefinition>>>,

    // Shared append-only timeline logs, keyed by request id
    timelines: Arc<RwLock<HashMap<String, Vec<TimelineEntry>>>>,

    // Shared org hierarchy and role assignments
    units: Arc<RwLock<HashMap<String, OrgUnit>>>,
    assignments: Arc<RwLock<HashMap<String, Vec<RoleAssignment>>>>,

    // Shared storage for delegations
    delegations: Arc<RwLock<HashMap<String, Delegation>>>,
}

impl InMemoryStateStoreProvider {
    /// Create a new in-memory state store provider
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            definitions: Arc::new(RwLock::new(HashMap::new())),
            timelines: Arc::new(RwLock::new(HashMap::new())),
            units: Arc::new(RwLock::new(HashMap::new())),
            assignments: Arc::new(RwLock::new(HashMap::new())),
            delegations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create repositories for use with [`signoff_core::ApprovalEngine`]
    pub fn create_repositories(&self) -> RepositoriesTuple {
        let request_repo = Arc::new(InMemoryRequestRepository::new(self.requests.clone()));

        let definition_repo = Arc::new(InMemoryDefinitionRepository::new(
            self.definitions.clone(),
        ));

        let timeline_repo = Arc::new(InMemoryTimelineRepository::new(self.timelines.clone()));

        let directory = Arc::new(InMemoryOrgDirectory::new(
            self.units.clone(),
            self.assignments.clone(),
        ));

        let delegation_repo = Arc::new(InMemoryDelegationRepository::new(
            self.delegations.clone(),
        ));

        (
            request_repo,
            definition_repo,
            timeline_repo,
            directory,
            delegation_repo,
        )
    }
}

impl Default for InMemoryStateStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}

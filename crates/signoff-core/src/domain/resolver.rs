//! Approver resolution against the org hierarchy
//!
//! Turns a role + scope rule into the concrete set of people eligible to
//! act, reading role assignments as of now. Nothing here is cached across
//! calls; a stale-approver bug is worse than a repeated lookup.

use crate::domain::definition::{ApproverRule, ApproverScope, StepDefinition};
use crate::domain::org::{OrgUnit, OrgUnitId, OrgUnitKind, PersonId};
use crate::domain::repository::{DelegationRepository, OrgDirectoryRepository};
use crate::EngineError;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

/// Resolves approver rules to sets of eligible people
///
/// An empty result set is a normal outcome ("nobody currently holds the
/// role here; escalate to an administrator"); a [`EngineError::ScopeResolution`]
/// failure means the rule itself cannot be evaluated against the hierarchy
/// and points at a malformed definition.
pub struct ApproverResolver {
    directory: Arc<dyn OrgDirectoryRepository>,
    delegations: Arc<dyn DelegationRepository>,
}

impl ApproverResolver {
    /// Create a new resolver over the given directory and delegation stores
    pub fn new(
        directory: Arc<dyn OrgDirectoryRepository>,
        delegations: Arc<dyn DelegationRepository>,
    ) -> Self {
        Self {
            directory,
            delegations,
        }
    }

    /// Resolve a rule for a requester anchored at `requester_unit`.
    ///
    /// The result unions in active delegatees of every direct role holder.
    pub async fn resolve(
        &self,
        rule: &ApproverRule,
        requester_unit: &OrgUnitId,
    ) -> Result<HashSet<PersonId>, EngineError> {
        let target_unit = self.scope_unit(&rule.scope, requester_unit).await?;
        let holders = self.directory.role_holders(&rule.role, &target_unit).await?;
        self.with_delegatees(holders).await
    }

    /// Resolve a step's effective rule, honoring its per-organization
    /// override for the requester's root organization
    pub async fn resolve_for_step(
        &self,
        step: &StepDefinition,
        requester_unit: &OrgUnitId,
    ) -> Result<HashSet<PersonId>, EngineError> {
        let organization = if step.org_overrides.is_empty() {
            None
        } else {
            Some(self.organization_of(requester_unit).await?)
        };

        let rule = step.effective_rule(organization.as_ref());
        self.resolve(rule, requester_unit).await
    }

    /// The root Organization unit above `unit` (or `unit` itself)
    pub async fn organization_of(&self, unit: &OrgUnitId) -> Result<OrgUnitId, EngineError> {
        let mut cursor = self.load_unit(unit).await?;
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(cursor.id.0.clone());

        loop {
            if cursor.kind == OrgUnitKind::Organization {
                return Ok(cursor.id);
            }

            let parent_id = cursor.parent.clone().ok_or_else(|| {
                EngineError::ScopeResolution(format!(
                    "unit {} has no Organization ancestor",
                    unit
                ))
            })?;

            if !visited.insert(parent_id.0.clone()) {
                return Err(EngineError::ScopeResolution(format!(
                    "cycle in parent chain above unit {}",
                    unit
                )));
            }

            cursor = self.load_unit(&parent_id).await?;
        }
    }

    /// The unit a scope points at for a requester anchored at
    /// `requester_unit`
    async fn scope_unit(
        &self,
        scope: &ApproverScope,
        requester_unit: &OrgUnitId,
    ) -> Result<OrgUnitId, EngineError> {
        match scope {
            ApproverScope::RequesterUnit => {
                // The unit must exist even though we return it unchanged;
                // a dangling requester unit is a resolution failure.
                self.load_unit(requester_unit).await?;
                Ok(requester_unit.clone())
            }
            ApproverScope::RequesterAncestor(kind) => {
                self.ancestor_of_kind(requester_unit, *kind).await
            }
            ApproverScope::NamedUnit(unit) => {
                self.load_unit(unit).await?;
                Ok(unit.clone())
            }
        }
    }

    /// Walk parent links upward from `start` until a unit of `kind` is
    /// found; the starting unit itself counts
    async fn ancestor_of_kind(
        &self,
        start: &OrgUnitId,
        kind: OrgUnitKind,
    ) -> Result<OrgUnitId, EngineError> {
        let mut cursor = self.load_unit(start).await?;
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(cursor.id.0.clone());

        loop {
            if cursor.kind == kind {
                return Ok(cursor.id);
            }

            let parent_id = match cursor.parent.clone() {
                Some(p) => p,
                None => {
                    return Err(EngineError::ScopeResolution(format!(
                        "no ancestor of kind {:?} above unit {}",
                        kind, start
                    )))
                }
            };

            if !visited.insert(parent_id.0.clone()) {
                return Err(EngineError::ScopeResolution(format!(
                    "cycle in parent chain above unit {}",
                    start
                )));
            }

            cursor = self.load_unit(&parent_id).await?;
        }
    }

    /// Union active delegatees of every holder into the eligible set
    async fn with_delegatees(
        &self,
        holders: HashSet<PersonId>,
    ) -> Result<HashSet<PersonId>, EngineError> {
        let now = Utc::now();
        let mut eligible = holders.clone();

        for holder in &holders {
            for delegation in self.delegations.active_for(holder, now).await? {
                eligible.insert(delegation.to);
            }
        }

        Ok(eligible)
    }

    /// Expand a single pinned assignee into themselves plus their active
    /// delegatees
    pub async fn expand_assignee(
        &self,
        assignee: &PersonId,
    ) -> Result<HashSet<PersonId>, EngineError> {
        let mut set = HashSet::new();
        set.insert(assignee.clone());
        self.with_delegatees(set).await
    }

    async fn load_unit(&self, id: &OrgUnitId) -> Result<OrgUnit, EngineError> {
        self.directory
            .find_unit(id)
            .await?
            .ok_or_else(|| EngineError::ScopeResolution(format!("unknown org unit {}", id)))
    }
}

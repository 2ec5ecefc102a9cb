use crate::{
    domain::delegation::{Delegation, DelegationId},
    domain::org::PersonId,
    domain::repository::DelegationRepository,
    EngineError,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Service for granting and revoking delegations of approval authority
pub struct DelegationService {
    /// Repository for delegations
    delegations: Arc<dyn DelegationRepository>,
}

impl DelegationService {
    /// Create a new delegation service
    pub fn new(delegations: Arc<dyn DelegationRepository>) -> Self {
        Self { delegations }
    }

    /// Grant a delegation.
    ///
    /// Rejects self-delegation, inverted windows, and a window overlapping
    /// another active delegation to the same delegatee.
    pub async fn grant(
        &self,
        from: PersonId,
        to: PersonId,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<Delegation, EngineError> {
        let delegation = Delegation::new(from, to, starts_at, expires_at, note)?;

        if let Some(existing) = self
            .delegations
            .find_overlapping(&delegation.to, starts_at, expires_at)
            .await?
        {
            return Err(EngineError::DelegationInvalid(format!(
                "delegatee {} already holds an overlapping delegation {}",
                delegation.to, existing.id
            )));
        }

        self.delegations.save(&delegation).await?;

        tracing::info!(
            delegation_id = %delegation.id,
            from = %delegation.from,
            to = %delegation.to,
            "delegation granted"
        );

        Ok(delegation)
    }

    /// Revoke a delegation; takes effect immediately
    pub async fn revoke(&self, id: &DelegationId) -> Result<(), EngineError> {
        let mut delegation = self
            .delegations
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::DelegationNotFound(id.0.clone()))?;

        delegation.revoke();
        self.delegations.save(&delegation).await?;

        tracing::info!(delegation_id = %id, "delegation revoked");

        Ok(())
    }

    /// All delegations currently granting authority on behalf of `delegator`
    pub async fn active_for(
        &self,
        delegator: &PersonId,
    ) -> Result<Vec<Delegation>, EngineError> {
        self.delegations.active_for(delegator, Utc::now()).await
    }

    /// All delegations, regardless of state
    pub async fn list(&self) -> Result<Vec<Delegation>, EngineError> {
        self.delegations.find_all().await
    }
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::*;
    use crate::domain::repository::memory::MemoryDelegationRepository;
    use chrono::Duration;

    fn service() -> DelegationService {
        DelegationService::new(Arc::new(MemoryDelegationRepository::new()))
    }

    fn person(id: &str) -> PersonId {
        PersonId(id.to_string())
    }

    #[tokio::test]
    async fn test_grant_and_revoke() {
        let service = service();
        let start = Utc::now() - Duration::hours(1);
        let end = Utc::now() + Duration::days(3);

        let delegation = service
            .grant(person("p-1"), person("p-2"), start, end, None)
            .await
            .unwrap();

        let active = service.active_for(&person("p-1")).await.unwrap();
        assert_eq!(active.len(), 1);

        service.revoke(&delegation.id).await.unwrap();
        let active = service.active_for(&person("p-1")).await.unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_delegation_rejected() {
        let service = service();
        let start = Utc::now();
        let end = start + Duration::days(5);

        service
            .grant(person("p-1"), person("p-2"), start, end, None)
            .await
            .unwrap();

        // Same delegatee, intersecting window, different delegator
        let result = service
            .grant(
                person("p-3"),
                person("p-2"),
                start + Duration::days(2),
                end + Duration::days(2),
                None,
            )
            .await;

        assert!(matches!(result, Err(EngineError::DelegationInvalid(_))));
    }

    #[tokio::test]
    async fn test_disjoint_window_for_same_delegatee_allowed() {
        let service = service();
        let start = Utc::now();
        let end = start + Duration::days(2);

        service
            .grant(person("p-1"), person("p-2"), start, end, None)
            .await
            .unwrap();

        let result = service
            .grant(
                person("p-3"),
                person("p-2"),
                end + Duration::days(1),
                end + Duration::days(4),
                None,
            )
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_unknown_delegation() {
        let service = service();
        let result = service
            .revoke(&DelegationId("missing".to_string()))
            .await;
        assert!(matches!(result, Err(EngineError::DelegationNotFound(_))));
    }
}

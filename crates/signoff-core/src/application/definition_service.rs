use crate::{
    domain::definition::{WorkflowDefId, WorkflowDefinition},
    domain::repository::DefinitionRepository,
    EngineError,
};
use std::sync::Arc;

/// Service for managing workflow definitions
///
/// Definitions are templates only: every request pins its own snapshot at
/// submission, so create/update here can never alter an in-flight request.
pub struct DefinitionService {
    /// Repository for workflow definitions
    definitions: Arc<dyn DefinitionRepository>,
}

impl DefinitionService {
    /// Create a new definition service
    pub fn new(definitions: Arc<dyn DefinitionRepository>) -> Self {
        Self { definitions }
    }

    /// Create a new definition.
    ///
    /// Fails with [`EngineError::DefinitionInvalid`] listing every violated
    /// constraint, so configuration screens can show all of them at once.
    pub async fn create(&self, definition: WorkflowDefinition) -> Result<(), EngineError> {
        definition.validate()?;

        if self
            .definitions
            .find_by_id(&definition.id)
            .await?
            .is_some()
        {
            return Err(EngineError::DefinitionInvalid {
                violations: vec![format!("definition id {} already exists", definition.id)],
            });
        }

        self.definitions.save(&definition).await?;

        tracing::info!(
            definition_id = %definition.id,
            steps = definition.steps.len(),
            "workflow definition created"
        );

        Ok(())
    }

    /// Replace an existing definition.
    ///
    /// Instances submitted before the update keep their pinned snapshots.
    pub async fn update(&self, definition: WorkflowDefinition) -> Result<(), EngineError> {
        definition.validate()?;

        if self
            .definitions
            .find_by_id(&definition.id)
            .await?
            .is_none()
        {
            return Err(EngineError::DefinitionNotFound(definition.id.0.clone()));
        }

        self.definitions.save(&definition).await?;

        tracing::info!(
            definition_id = %definition.id,
            steps = definition.steps.len(),
            "workflow definition updated"
        );

        Ok(())
    }

    /// Fetch a definition by ID
    pub async fn get(&self, id: &WorkflowDefId) -> Result<WorkflowDefinition, EngineError> {
        self.definitions
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound(id.0.clone()))
    }

    /// Delete a definition; in-flight requests are unaffected by design
    pub async fn delete(&self, id: &WorkflowDefId) -> Result<(), EngineError> {
        self.definitions.delete(id).await?;
        tracing::info!(definition_id = %id, "workflow definition deleted");
        Ok(())
    }

    /// List all definition IDs
    pub async fn list(&self) -> Result<Vec<WorkflowDefId>, EngineError> {
        self.definitions.list_ids().await
    }

    /// Validate a definition without saving it; returns every violation
    /// found (empty means valid). Consumed by configuration screens.
    pub fn validate(&self, definition: &WorkflowDefinition) -> Vec<String> {
        definition.violations()
    }
}

#[cfg(all(test, feature = "testing"))]
mod tests {
    use super::*;
    use crate::domain::definition::{ApproverRule, ApproverScope, StepDefinition};
    use crate::domain::repository::memory::MemoryDefinitionRepository;

    fn service() -> DefinitionService {
        DefinitionService::new(Arc::new(MemoryDefinitionRepository::new()))
    }

    fn leave_definition() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "leave_request",
            "Leave Request",
            vec![StepDefinition::new(
                0,
                ApproverRule::new("DirectManager", ApproverScope::RequesterUnit),
            )],
        )
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let service = service();
        let definition = leave_definition();

        service.create(definition.clone()).await.unwrap();

        let fetched = service.get(&definition.id).await.unwrap();
        assert_eq!(fetched, definition);

        let ids = service.list().await.unwrap();
        assert_eq!(ids.len(), 1);

        service.delete(&definition.id).await.unwrap();
        assert!(matches!(
            service.get(&definition.id).await,
            Err(EngineError::DefinitionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let service = service();
        service.create(leave_definition()).await.unwrap();

        let result = service.create(leave_definition()).await;
        assert!(matches!(
            result,
            Err(EngineError::DefinitionInvalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_definition() {
        let service = service();
        let invalid = WorkflowDefinition::new("empty", "Empty", vec![]);

        match service.create(invalid).await {
            Err(EngineError::DefinitionInvalid { violations }) => {
                assert!(violations[0].contains("at least one step"));
            }
            other => panic!("Expected DefinitionInvalid, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_requires_existing() {
        let service = service();
        let result = service.update(leave_definition()).await;
        assert!(matches!(result, Err(EngineError::DefinitionNotFound(_))));
    }

    #[tokio::test]
    async fn test_validate_reports_without_saving() {
        let service = service();
        let invalid = WorkflowDefinition::new("empty", "Empty", vec![]);

        let violations = service.validate(&invalid);
        assert_eq!(violations.len(), 1);

        // Nothing was persisted
        assert!(service.list().await.unwrap().is_empty());
    }
}

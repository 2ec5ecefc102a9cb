/// Request state machine service
pub mod approval_service;

/// Workflow definition management service
pub mod definition_service;

/// Delegation management service
pub mod delegation_service;

/// Engine facade for external systems
pub mod engine;

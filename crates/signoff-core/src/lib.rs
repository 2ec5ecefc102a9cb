//!
//! Signoff Core - Approval-workflow engine for the Signoff platform
//!
//! This crate defines the workflow definition model, the request state
//! machine, approver resolution over an organizational hierarchy, and the
//! append-only audit timeline. It is the foundation the surrounding portal
//! builds on; transports and side-effect delivery live elsewhere.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - core business models, entities, and rules
pub mod domain;

/// Application services - core application logic
pub mod application;

/// Core types
pub mod types;

/// Error types
pub mod error;

// Re-export key types
pub use error::EngineError;
pub use types::Payload;

// Application interfaces
pub use application::approval_service::{ApprovalService, EngineEventHandler, NoopEventHandler};
pub use application::definition_service::DefinitionService;
pub use application::delegation_service::DelegationService;
pub use application::engine::{ApprovalEngine, RepositoriesTuple, RequestSummary};

// Re-export main API types for easy use
pub use domain::definition::{
    ApproverRule, ApproverScope, StepDefinition, WorkflowDefId, WorkflowDefinition,
};
pub use domain::delegation::{Delegation, DelegationId};
pub use domain::events::EngineEvent;
pub use domain::org::{OrgUnit, OrgUnitId, OrgUnitKind, PersonId, RoleAssignment, RoleName};
pub use domain::repository::{
    DefinitionRepository, DelegationRepository, OrgDirectoryRepository, RequestRepository,
    TimelineRepository,
};
pub use domain::request::{
    RequestAction, RequestId, RequestInstance, RequestStatus, SYSTEM_DEFAULT_SLA_DAYS,
};
pub use domain::resolver::ApproverResolver;
pub use domain::timeline::{replay, TimelineAction, TimelineEntry};

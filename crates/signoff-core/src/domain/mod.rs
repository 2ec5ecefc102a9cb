/// Organizational hierarchy and role assignments
pub mod org;

/// Workflow definition domain models
pub mod definition;

/// Request instance domain models
pub mod request;

/// Append-only audit timeline and replay
pub mod timeline;

/// Delegation of approval authority
pub mod delegation;

/// Engine events
pub mod events;

/// Repository interfaces
pub mod repository;

/// Approver resolution against the org hierarchy
pub mod resolver;

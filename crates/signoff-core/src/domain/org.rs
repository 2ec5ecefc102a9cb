use crate::EngineError;
use serde::{Deserialize, Serialize};

/// Value object: Org unit ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgUnitId(pub String);

/// Value object: Person ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersonId(pub String);

/// Value object: Role name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleName(pub String);

impl std::fmt::Display for OrgUnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for PersonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a node in the organizational hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrgUnitKind {
    /// Top-level organization; the root of every parent chain
    Organization,

    /// Directorate, directly under an organization
    Directorate,

    /// Department, under a directorate
    Department,

    /// Section; may attach to a department or directly to a directorate
    Section,

    /// Division; may attach to a section or directly to a department
    Division,
}

impl OrgUnitKind {
    /// The kinds a unit of this kind may attach to as its parent.
    ///
    /// An empty slice means the unit is a root (no parent allowed).
    pub fn allowed_parent_kinds(&self) -> &'static [OrgUnitKind] {
        match self {
            OrgUnitKind::Organization => &[],
            OrgUnitKind::Directorate => &[OrgUnitKind::Organization],
            OrgUnitKind::Department => &[OrgUnitKind::Directorate],
            OrgUnitKind::Section => &[OrgUnitKind::Department, OrgUnitKind::Directorate],
            OrgUnitKind::Division => &[OrgUnitKind::Section, OrgUnitKind::Department],
        }
    }
}

/// A node in the organizational hierarchy
///
/// Parent chains are acyclic and terminate at a unit of kind
/// [`OrgUnitKind::Organization`]; the directory store enforces this on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnit {
    /// Unique identifier
    pub id: OrgUnitId,

    /// Kind of this unit
    pub kind: OrgUnitKind,

    /// Parent unit, None only for organizations
    pub parent: Option<OrgUnitId>,

    /// Display name
    pub name: String,
}

impl OrgUnit {
    /// Create a new org unit
    pub fn new(id: OrgUnitId, kind: OrgUnitKind, parent: Option<OrgUnitId>, name: &str) -> Self {
        Self {
            id,
            kind,
            parent,
            name: name.to_string(),
        }
    }

    /// Validate this unit's attachment against the kind of its actual parent.
    ///
    /// `parent_kind` is None when the unit declares no parent.
    pub fn validate_attachment(&self, parent_kind: Option<OrgUnitKind>) -> Result<(), EngineError> {
        let allowed = self.kind.allowed_parent_kinds();

        match (parent_kind, allowed.is_empty()) {
            (None, true) => Ok(()),
            (None, false) => Err(EngineError::ScopeResolution(format!(
                "unit {} of kind {:?} must have a parent",
                self.id, self.kind
            ))),
            (Some(_), true) => Err(EngineError::ScopeResolution(format!(
                "unit {} of kind {:?} must not have a parent",
                self.id, self.kind
            ))),
            (Some(pk), false) => {
                if allowed.contains(&pk) {
                    Ok(())
                } else {
                    Err(EngineError::ScopeResolution(format!(
                        "unit {} of kind {:?} cannot attach to a parent of kind {:?}",
                        self.id, self.kind, pk
                    )))
                }
            }
        }
    }
}

/// Assignment of a role to a person at a specific org unit
///
/// A person may hold multiple roles across multiple units. Assignments are
/// maintained by an external administration collaborator; the engine reads
/// current assignments at resolution time and never caches them across calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// The person holding the role
    pub person: PersonId,

    /// The role name
    pub role: RoleName,

    /// The unit the role is held at
    pub unit: OrgUnitId,
}

impl RoleAssignment {
    /// Create a new role assignment
    pub fn new(person: &str, role: &str, unit: &str) -> Self {
        Self {
            person: PersonId(person.to_string()),
            role: RoleName(role.to_string()),
            unit: OrgUnitId(unit.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str, kind: OrgUnitKind, parent: Option<&str>) -> OrgUnit {
        OrgUnit::new(
            OrgUnitId(id.to_string()),
            kind,
            parent.map(|p| OrgUnitId(p.to_string())),
            id,
        )
    }

    #[test]
    fn test_organization_has_no_parent() {
        let org = unit("acme", OrgUnitKind::Organization, None);
        assert!(org.validate_attachment(None).is_ok());

        let bad = unit("acme", OrgUnitKind::Organization, Some("other"));
        assert!(bad
            .validate_attachment(Some(OrgUnitKind::Organization))
            .is_err());
    }

    #[test]
    fn test_section_attaches_to_department_or_directorate() {
        let section = unit("infra", OrgUnitKind::Section, Some("tech"));

        assert!(section
            .validate_attachment(Some(OrgUnitKind::Department))
            .is_ok());
        assert!(section
            .validate_attachment(Some(OrgUnitKind::Directorate))
            .is_ok());
        assert!(section
            .validate_attachment(Some(OrgUnitKind::Organization))
            .is_err());
    }

    #[test]
    fn test_division_attaches_to_section_or_department() {
        let division = unit("it-ops", OrgUnitKind::Division, Some("infra"));

        assert!(division
            .validate_attachment(Some(OrgUnitKind::Section))
            .is_ok());
        assert!(division
            .validate_attachment(Some(OrgUnitKind::Department))
            .is_ok());
        assert!(division
            .validate_attachment(Some(OrgUnitKind::Directorate))
            .is_err());
    }

    #[test]
    fn test_non_root_requires_parent() {
        let orphan = unit("hr", OrgUnitKind::Department, None);
        let result = orphan.validate_attachment(None);
        assert!(matches!(result, Err(EngineError::ScopeResolution(_))));
    }

    #[test]
    fn test_role_assignment_construction() {
        let assignment = RoleAssignment::new("p-17", "DirectManager", "it-ops");
        assert_eq!(assignment.person, PersonId("p-17".to_string()));
        assert_eq!(assignment.role, RoleName("DirectManager".to_string()));
        assert_eq!(assignment.unit, OrgUnitId("it-ops".to_string()));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(OrgUnitId("it-ops".to_string()).to_string(), "it-ops");
        assert_eq!(PersonId("p-1".to_string()).to_string(), "p-1");
        assert_eq!(RoleName("HR".to_string()).to_string(), "HR");
    }
}

use crate::domain::org::{OrgUnitId, OrgUnitKind, RoleName};
use crate::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Value object: Workflow definition ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowDefId(pub String);

impl std::fmt::Display for WorkflowDefId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a step's approver role is looked up in the org hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproverScope {
    /// Role holders at the requester's own unit
    RequesterUnit,

    /// Role holders at the nearest ancestor of the given kind, walking
    /// upward from the requester's unit (the unit itself counts)
    RequesterAncestor(OrgUnitKind),

    /// Role holders at a literal unit, ignoring the requester's position
    NamedUnit(OrgUnitId),
}

/// Rule resolving a step's eligible approvers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverRule {
    /// The role that qualifies a person to act
    pub role: RoleName,

    /// Where the role is looked up
    pub scope: ApproverScope,
}

impl ApproverRule {
    /// Create a new approver rule
    pub fn new(role: &str, scope: ApproverScope) -> Self {
        Self {
            role: RoleName(role.to_string()),
            scope,
        }
    }
}

/// One stage of a workflow definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// 0-based position in the definition; contiguous, no gaps
    pub index: usize,

    /// Base rule for resolving this step's approvers
    pub rule: ApproverRule,

    /// Per-organization replacement rules, keyed by the requester's root
    /// Organization unit. Empty for most steps.
    pub org_overrides: HashMap<OrgUnitId, ApproverRule>,

    /// Whether an approver at this step may send the request back to an
    /// earlier step
    pub allow_return_to_previous: bool,

    /// SLA in days for this step; falls back to the definition default,
    /// then the system default
    pub sla_days: Option<u32>,
}

impl StepDefinition {
    /// Create a step with no overrides, no return, and default SLA
    pub fn new(index: usize, rule: ApproverRule) -> Self {
        Self {
            index,
            rule,
            org_overrides: HashMap::new(),
            allow_return_to_previous: false,
            sla_days: None,
        }
    }

    /// Enable return-to-previous on this step
    pub fn with_return_allowed(mut self) -> Self {
        self.allow_return_to_previous = true;
        self
    }

    /// Set a per-step SLA in days
    pub fn with_sla_days(mut self, days: u32) -> Self {
        self.sla_days = Some(days);
        self
    }

    /// Add a per-organization override rule
    pub fn with_org_override(mut self, organization: OrgUnitId, rule: ApproverRule) -> Self {
        self.org_overrides.insert(organization, rule);
        self
    }

    /// The rule to resolve for a requester whose root organization is
    /// `organization`: the override for that organization if present,
    /// otherwise the base rule.
    pub fn effective_rule(&self, organization: Option<&OrgUnitId>) -> &ApproverRule {
        organization
            .and_then(|org| self.org_overrides.get(org))
            .unwrap_or(&self.rule)
    }
}

/// A named, ordered template of approval steps
///
/// Definitions are templates only: every request instance pins a deep copy
/// of the steps at submission time, so editing a definition never alters
/// in-flight requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier
    pub id: WorkflowDefId,

    /// Human-readable name
    pub name: String,

    /// Ordered steps, indexed 0..n contiguously
    pub steps: Vec<StepDefinition>,

    /// Default SLA in days for steps that do not set their own
    pub default_sla_days: Option<u32>,
}

impl WorkflowDefinition {
    /// Create a new definition
    pub fn new(id: &str, name: &str, steps: Vec<StepDefinition>) -> Self {
        Self {
            id: WorkflowDefId(id.to_string()),
            name: name.to_string(),
            steps,
            default_sla_days: None,
        }
    }

    /// Collect every violated structural constraint.
    ///
    /// Returns an empty list for a valid definition. Configuration UIs show
    /// all violations at once, so this never stops at the first finding.
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if self.steps.is_empty() {
            violations.push("definition must have at least one step".to_string());
        }

        if self.name.trim().is_empty() {
            violations.push("definition name must not be empty".to_string());
        }

        for (position, step) in self.steps.iter().enumerate() {
            if step.index != position {
                violations.push(format!(
                    "step at position {} declares index {}; indices must be contiguous from 0",
                    position, step.index
                ));
            }

            Self::check_rule(&step.rule, step.index, "rule", &mut violations);

            for (org, rule) in &step.org_overrides {
                if org.0.trim().is_empty() {
                    violations.push(format!(
                        "step {} has an override keyed by an empty org unit id",
                        step.index
                    ));
                }
                Self::check_rule(rule, step.index, "override", &mut violations);
            }
        }

        violations
    }

    fn check_rule(rule: &ApproverRule, step: usize, label: &str, violations: &mut Vec<String>) {
        if rule.role.0.trim().is_empty() {
            violations.push(format!("step {} {} role name is empty", step, label));
        }

        if let ApproverScope::NamedUnit(unit) = &rule.scope {
            if unit.0.trim().is_empty() {
                violations.push(format!(
                    "step {} {} names an empty org unit id",
                    step, label
                ));
            }
        }
    }

    /// Validate, failing with every violation enumerated
    pub fn validate(&self) -> Result<(), EngineError> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(EngineError::DefinitionInvalid { violations })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step_definition() -> WorkflowDefinition {
        WorkflowDefinition::new(
            "leave_request",
            "Leave Request",
            vec![
                StepDefinition::new(
                    0,
                    ApproverRule::new("DirectManager", ApproverScope::RequesterUnit),
                ),
                StepDefinition::new(
                    1,
                    ApproverRule::new(
                        "HR",
                        ApproverScope::RequesterAncestor(OrgUnitKind::Department),
                    ),
                ),
            ],
        )
    }

    #[test]
    fn test_valid_definition() {
        let definition = two_step_definition();
        assert!(definition.violations().is_empty());
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn test_empty_steps_rejected() {
        let definition = WorkflowDefinition::new("empty", "Empty", vec![]);
        let violations = definition.violations();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("at least one step"));
    }

    #[test]
    fn test_all_violations_reported_at_once() {
        let definition = WorkflowDefinition::new(
            "broken",
            "",
            vec![
                StepDefinition::new(0, ApproverRule::new("", ApproverScope::RequesterUnit)),
                StepDefinition::new(
                    3, // gap: should be 1
                    ApproverRule::new(
                        "HR",
                        ApproverScope::NamedUnit(OrgUnitId("".to_string())),
                    ),
                ),
            ],
        );

        let violations = definition.violations();
        assert!(violations.iter().any(|v| v.contains("name must not be empty")));
        assert!(violations.iter().any(|v| v.contains("role name is empty")));
        assert!(violations.iter().any(|v| v.contains("contiguous")));
        assert!(violations.iter().any(|v| v.contains("empty org unit id")));
        assert!(violations.len() >= 4);

        match definition.validate() {
            Err(EngineError::DefinitionInvalid { violations }) => {
                assert!(violations.len() >= 4);
            }
            other => panic!("Expected DefinitionInvalid, got {:?}", other),
        }
    }

    #[test]
    fn test_effective_rule_prefers_override() {
        let branch_org = OrgUnitId("branch-co".to_string());
        let override_rule = ApproverRule::new(
            "BranchManager",
            ApproverScope::RequesterAncestor(OrgUnitKind::Directorate),
        );

        let step = StepDefinition::new(
            0,
            ApproverRule::new("DirectManager", ApproverScope::RequesterUnit),
        )
        .with_org_override(branch_org.clone(), override_rule.clone());

        assert_eq!(step.effective_rule(Some(&branch_org)), &override_rule);
        assert_eq!(
            step.effective_rule(Some(&OrgUnitId("hq".to_string()))),
            &step.rule
        );
        assert_eq!(step.effective_rule(None), &step.rule);
    }

    #[test]
    fn test_override_rules_validated() {
        let mut definition = two_step_definition();
        definition.steps[0] = definition.steps[0].clone().with_org_override(
            OrgUnitId("branch-co".to_string()),
            ApproverRule::new("", ApproverScope::RequesterUnit),
        );

        let violations = definition.violations();
        assert!(violations.iter().any(|v| v.contains("override role name is empty")));
    }

    #[test]
    fn test_definition_serialization() {
        let definition = two_step_definition();
        let serialized = serde_json::to_string(&definition).unwrap();
        let deserialized: WorkflowDefinition = serde_json::from_str(&serialized).unwrap();
        assert_eq!(definition, deserialized);
    }
}

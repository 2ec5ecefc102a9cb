use crate::domain::org::PersonId;
use crate::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value object: Delegation ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegationId(pub String);

impl std::fmt::Display for DelegationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time-windowed hand-over of approval authority from one person to another
///
/// While a delegation is active, the delegatee is eligible to act wherever
/// the delegator is; the timeline still records the actual actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    /// Unique identifier
    pub id: DelegationId,

    /// The person whose authority is delegated
    pub from: PersonId,

    /// The person receiving the authority
    pub to: PersonId,

    /// Start of the active window (inclusive)
    pub starts_at: DateTime<Utc>,

    /// End of the active window (inclusive)
    pub expires_at: DateTime<Utc>,

    /// False once revoked; revocation takes effect immediately
    pub active: bool,

    /// Optional free-form note
    pub note: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Delegation {
    /// Create a delegation, validating its structural rules.
    ///
    /// Self-delegation and inverted windows are refused outright; overlap
    /// with other delegations is a store-level check.
    pub fn new(
        from: PersonId,
        to: PersonId,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<Self, EngineError> {
        if from == to {
            return Err(EngineError::DelegationInvalid(
                "a person cannot delegate to themselves".to_string(),
            ));
        }

        if expires_at < starts_at {
            return Err(EngineError::DelegationInvalid(format!(
                "window end {} is before start {}",
                expires_at, starts_at
            )));
        }

        Ok(Self {
            id: DelegationId(Uuid::new_v4().to_string()),
            from,
            to,
            starts_at,
            expires_at,
            active: true,
            note,
            created_at: Utc::now(),
        })
    }

    /// Whether the delegation grants authority at instant `at`
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.active && self.starts_at <= at && at <= self.expires_at
    }

    /// Whether this delegation's window intersects [starts_at, expires_at]
    pub fn overlaps(&self, starts_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> bool {
        self.active && self.starts_at <= expires_at && starts_at <= self.expires_at
    }

    /// Revoke the delegation
    pub fn revoke(&mut self) {
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn person(id: &str) -> PersonId {
        PersonId(id.to_string())
    }

    fn window(days_from_now: i64, days_long: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc::now() + Duration::days(days_from_now);
        (start, start + Duration::days(days_long))
    }

    #[test]
    fn test_self_delegation_rejected() {
        let (start, end) = window(0, 5);
        let result = Delegation::new(person("p-1"), person("p-1"), start, end, None);
        assert!(matches!(result, Err(EngineError::DelegationInvalid(_))));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let (start, end) = window(0, 5);
        let result = Delegation::new(person("p-1"), person("p-2"), end, start, None);
        assert!(matches!(result, Err(EngineError::DelegationInvalid(_))));
    }

    #[test]
    fn test_active_window() {
        let (start, end) = window(-1, 3);
        let delegation = Delegation::new(person("p-1"), person("p-2"), start, end, None).unwrap();

        assert!(delegation.is_active_at(Utc::now()));
        assert!(!delegation.is_active_at(start - Duration::hours(1)));
        assert!(!delegation.is_active_at(end + Duration::hours(1)));
    }

    #[test]
    fn test_revocation_takes_effect_immediately() {
        let (start, end) = window(-1, 3);
        let mut delegation =
            Delegation::new(person("p-1"), person("p-2"), start, end, None).unwrap();

        delegation.revoke();
        assert!(!delegation.is_active_at(Utc::now()));
    }

    #[test]
    fn test_overlap_detection() {
        let (start, end) = window(0, 5);
        let delegation = Delegation::new(person("p-1"), person("p-2"), start, end, None).unwrap();

        // Intersecting window
        assert!(delegation.overlaps(start + Duration::days(2), end + Duration::days(2)));
        // Disjoint window
        assert!(!delegation.overlaps(end + Duration::days(1), end + Duration::days(4)));
        // Revoked delegations never overlap
        let mut revoked = delegation.clone();
        revoked.revoke();
        assert!(!revoked.overlaps(start, end));
    }
}

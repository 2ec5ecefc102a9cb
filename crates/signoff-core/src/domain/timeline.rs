use crate::domain::org::PersonId;
use crate::domain::request::{RequestId, RequestStatus};
use crate::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The action a timeline entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimelineAction {
    /// Request submitted into step 0
    Submit,

    /// Current step approved
    Approve,

    /// Request rejected
    Reject,

    /// Request sent back to an earlier step
    Return,

    /// Request withdrawn by the requester
    Cancel,

    /// Current step handed to a named person
    Reassign,
}

/// One append-only audit record of a request transition
///
/// Entries are never edited or deleted. For a given request, sequence
/// numbers are gap-free and strictly increasing, starting at 1 for the
/// Submit entry; replaying the entries in order reconstructs the request's
/// exact current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// The request this entry belongs to
    pub request_id: RequestId,

    /// Per-request monotonic sequence number, assigned on append
    pub sequence: u64,

    /// The person who performed the action
    pub actor: PersonId,

    /// The recorded action
    pub action: TimelineAction,

    /// Step index the action was taken from
    pub from_step: usize,

    /// Step index the request moved to; None for terminal actions
    pub to_step: Option<usize>,

    /// When the action occurred
    pub timestamp: DateTime<Utc>,

    /// Optional free-form comment from the actor
    pub comment: Option<String>,
}

impl TimelineEntry {
    /// Build an entry ready for appending; the repository assigns the
    /// sequence number
    pub fn new(
        request_id: RequestId,
        actor: PersonId,
        action: TimelineAction,
        from_step: usize,
        to_step: Option<usize>,
        comment: Option<String>,
    ) -> Self {
        Self {
            request_id,
            sequence: 0,
            actor,
            action,
            from_step,
            to_step,
            timestamp: Utc::now(),
            comment,
        }
    }
}

/// Reconstruct `(status, step_index)` for a request purely from its ordered
/// timeline entries.
///
/// An empty log replays to a draft at step 0. A log that is out of sequence
/// or structurally impossible fails with
/// [`EngineError::TimelineCorrupted`] rather than guessing.
pub fn replay(
    request_id: &RequestId,
    entries: &[TimelineEntry],
) -> Result<(RequestStatus, usize), EngineError> {
    let mut status = RequestStatus::Draft;
    let mut step: usize = 0;

    for (position, entry) in entries.iter().enumerate() {
        let expected_seq = position as u64 + 1;
        if entry.sequence != expected_seq {
            return Err(EngineError::TimelineCorrupted {
                request_id: request_id.0.clone(),
                detail: format!(
                    "entry at position {} has sequence {}, expected {}",
                    position, entry.sequence, expected_seq
                ),
            });
        }

        if status.is_terminal() {
            return Err(EngineError::TimelineCorrupted {
                request_id: request_id.0.clone(),
                detail: format!(
                    "entry {} follows a terminal {:?} state",
                    entry.sequence, status
                ),
            });
        }

        match entry.action {
            TimelineAction::Submit => {
                if status != RequestStatus::Draft {
                    return Err(EngineError::TimelineCorrupted {
                        request_id: request_id.0.clone(),
                        detail: format!("duplicate Submit at sequence {}", entry.sequence),
                    });
                }
                status = RequestStatus::Pending;
                step = entry.to_step.unwrap_or(0);
            }
            TimelineAction::Approve => match entry.to_step {
                Some(next) => {
                    status = RequestStatus::Pending;
                    step = next;
                }
                None => {
                    status = RequestStatus::Approved;
                    step = entry.from_step;
                }
            },
            TimelineAction::Reject => {
                status = RequestStatus::Rejected;
                step = entry.from_step;
            }
            TimelineAction::Return => {
                let target = entry.to_step.ok_or_else(|| EngineError::TimelineCorrupted {
                    request_id: request_id.0.clone(),
                    detail: format!("Return entry {} has no target step", entry.sequence),
                })?;
                status = RequestStatus::Returned;
                step = target;
            }
            TimelineAction::Cancel => {
                status = RequestStatus::Cancelled;
                step = entry.from_step;
            }
            TimelineAction::Reassign => {
                // Ownership changed hands; status and step are untouched.
            }
        }
    }

    Ok((status, step))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_id() -> RequestId {
        RequestId("req-1".to_string())
    }

    fn entry(
        sequence: u64,
        action: TimelineAction,
        from_step: usize,
        to_step: Option<usize>,
    ) -> TimelineEntry {
        TimelineEntry {
            request_id: request_id(),
            sequence,
            actor: PersonId("p-1".to_string()),
            action,
            from_step,
            to_step,
            timestamp: Utc::now(),
            comment: None,
        }
    }

    #[test]
    fn test_replay_empty_log_is_draft() {
        let (status, step) = replay(&request_id(), &[]).unwrap();
        assert_eq!(status, RequestStatus::Draft);
        assert_eq!(step, 0);
    }

    #[test]
    fn test_replay_submit() {
        let entries = vec![entry(1, TimelineAction::Submit, 0, Some(0))];
        let (status, step) = replay(&request_id(), &entries).unwrap();
        assert_eq!(status, RequestStatus::Pending);
        assert_eq!(step, 0);
    }

    #[test]
    fn test_replay_full_approval_chain() {
        let entries = vec![
            entry(1, TimelineAction::Submit, 0, Some(0)),
            entry(2, TimelineAction::Approve, 0, Some(1)),
            entry(3, TimelineAction::Approve, 1, None),
        ];
        let (status, step) = replay(&request_id(), &entries).unwrap();
        assert_eq!(status, RequestStatus::Approved);
        assert_eq!(step, 1);
    }

    #[test]
    fn test_replay_reject() {
        let entries = vec![
            entry(1, TimelineAction::Submit, 0, Some(0)),
            entry(2, TimelineAction::Approve, 0, Some(1)),
            entry(3, TimelineAction::Reject, 1, None),
        ];
        let (status, step) = replay(&request_id(), &entries).unwrap();
        assert_eq!(status, RequestStatus::Rejected);
        assert_eq!(step, 1);
    }

    #[test]
    fn test_replay_return_then_resume() {
        let entries = vec![
            entry(1, TimelineAction::Submit, 0, Some(0)),
            entry(2, TimelineAction::Approve, 0, Some(1)),
            entry(3, TimelineAction::Return, 1, Some(0)),
        ];
        let (status, step) = replay(&request_id(), &entries).unwrap();
        assert_eq!(status, RequestStatus::Returned);
        assert_eq!(step, 0);

        let mut resumed = entries;
        resumed.push(entry(4, TimelineAction::Approve, 0, Some(1)));
        let (status, step) = replay(&request_id(), &resumed).unwrap();
        assert_eq!(status, RequestStatus::Pending);
        assert_eq!(step, 1);
    }

    #[test]
    fn test_replay_cancel() {
        let entries = vec![
            entry(1, TimelineAction::Submit, 0, Some(0)),
            entry(2, TimelineAction::Cancel, 0, None),
        ];
        let (status, step) = replay(&request_id(), &entries).unwrap();
        assert_eq!(status, RequestStatus::Cancelled);
        assert_eq!(step, 0);
    }

    #[test]
    fn test_replay_reassign_leaves_state_untouched() {
        let entries = vec![
            entry(1, TimelineAction::Submit, 0, Some(0)),
            entry(2, TimelineAction::Reassign, 0, Some(0)),
        ];
        let (status, step) = replay(&request_id(), &entries).unwrap();
        assert_eq!(status, RequestStatus::Pending);
        assert_eq!(step, 0);
    }

    #[test]
    fn test_replay_rejects_sequence_gap() {
        let entries = vec![
            entry(1, TimelineAction::Submit, 0, Some(0)),
            entry(3, TimelineAction::Approve, 0, Some(1)),
        ];
        let result = replay(&request_id(), &entries);
        assert!(matches!(
            result,
            Err(EngineError::TimelineCorrupted { .. })
        ));
    }

    #[test]
    fn test_replay_rejects_action_after_terminal() {
        let entries = vec![
            entry(1, TimelineAction::Submit, 0, Some(0)),
            entry(2, TimelineAction::Reject, 0, None),
            entry(3, TimelineAction::Approve, 0, Some(1)),
        ];
        let result = replay(&request_id(), &entries);
        assert!(matches!(
            result,
            Err(EngineError::TimelineCorrupted { .. })
        ));
    }

    #[test]
    fn test_replay_rejects_duplicate_submit() {
        let entries = vec![
            entry(1, TimelineAction::Submit, 0, Some(0)),
            entry(2, TimelineAction::Submit, 0, Some(0)),
        ];
        let result = replay(&request_id(), &entries);
        assert!(matches!(
            result,
            Err(EngineError::TimelineCorrupted { .. })
        ));
    }

    #[test]
    fn test_entry_serialization() {
        let e = entry(1, TimelineAction::Submit, 0, Some(0));
        let serialized = serde_json::to_string(&e).unwrap();
        let deserialized: TimelineEntry = serde_json::from_str(&serialized).unwrap();
        assert_eq!(e, deserialized);
    }
}

use crate::{DateTime, Error, Id, Result, generate_id_with_prefix};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a job, derived from the `state_after` of its latest transition.
///
/// The wire representation is stable: the lowercase strings below are what the
/// store persists and what external clients consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The job has been registered into the store
    Acknowledged,
    /// The job is awaiting execution
    Awaiting,
    /// The job is being executed
    Executing,
    /// The job succeeded
    Succeeded,
    /// The job failed and may be retried
    Failed,
    /// The job failed and will never be retried
    Discarded,
    /// The execution never reported an outcome for the job
    Unknown,
}

impl Status {
    /// Wire-stable string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Acknowledged => "acknowledged",
            Status::Awaiting => "awaiting",
            Status::Executing => "executing",
            Status::Succeeded => "succeeded",
            Status::Failed => "failed",
            Status::Discarded => "discarded",
            Status::Unknown => "unknown",
        }
    }

    /// Whether this status ends an execution attempt
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Succeeded | Status::Failed | Status::Discarded | Status::Unknown
        )
    }

    /// Whether the job will never run again. `Failed` is terminal for the
    /// attempt but re-enters `Awaiting` while retries remain, so it is not
    /// final.
    pub fn is_final(&self) -> bool {
        matches!(self, Status::Succeeded | Status::Discarded | Status::Unknown)
    }

    /// Relative position of a status within one execution attempt. Used to
    /// order transitions that share a timestamp and an attempt number.
    pub fn ordinal(&self) -> u8 {
        match self {
            Status::Acknowledged => 0,
            Status::Awaiting => 1,
            Status::Executing => 2,
            _ => 3,
        }
    }

    /// Whether a transition from `self` to `to` is allowed by the state
    /// machine.
    pub fn can_transition_to(&self, to: Status) -> bool {
        match (self, to) {
            (Status::Acknowledged, Status::Awaiting) => true,
            (Status::Awaiting, Status::Executing) => true,
            (Status::Executing, after) if after.is_terminal() => true,
            (Status::Failed, Status::Awaiting) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "acknowledged" => Ok(Status::Acknowledged),
            "awaiting" => Ok(Status::Awaiting),
            "executing" => Ok(Status::Executing),
            "succeeded" => Ok(Status::Succeeded),
            "failed" => Ok(Status::Failed),
            "discarded" => Ok(Status::Discarded),
            "unknown" => Ok(Status::Unknown),
            other => Err(Error::transition(format!("Unknown status '{other}'"))),
        }
    }
}

/// One state-change record for a job.
///
/// Transitions are append-only: history is never rewritten, which gives a
/// full audit trail and keeps concurrent readers safe. The current status of
/// a job is the `state_after` of its latest transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct Transition {
    /// Unique transition identifier
    pub id: Id,
    /// The execution attempt this transition belongs to, starting at 1
    pub attempt: u32,
    /// State of the job before this transition. None for the acknowledging
    /// transition.
    pub state_before: Option<Status>,
    /// State of the job after this transition
    pub state_after: Status,
    /// Error encountered during the attempt, if any
    pub error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime,
    /// The event the job belongs to
    pub event_id: Id,
    /// The job this transition is about
    pub job_id: Id,
}

impl Transition {
    /// Create a transition for a job moving from `state_before` to
    /// `state_after` during the given attempt.
    pub fn new(
        event_id: Id,
        job_id: Id,
        attempt: u32,
        state_before: Option<Status>,
        state_after: Status,
    ) -> Self {
        Self {
            id: generate_id_with_prefix("tr"),
            attempt,
            state_before,
            state_after,
            error: None,
            created_at: chrono::Utc::now(),
            event_id,
            job_id,
        }
    }

    /// Create the acknowledging transition registered when a job enters the
    /// store.
    pub fn acknowledge(event_id: Id, job_id: Id) -> Self {
        Self::new(event_id, job_id, 1, None, Status::Acknowledged)
    }

    /// Validate the transition against the state machine and the attempt
    /// numbering rules.
    pub fn validate(&self) -> Result<()> {
        if self.attempt == 0 {
            return Err(Error::transition("Transition attempt must start at 1"));
        }

        match self.state_before {
            None => {
                if self.state_after != Status::Acknowledged {
                    return Err(Error::transition(
                        "First transition of a job must acknowledge it",
                    ));
                }
            }
            Some(before) => {
                if !before.can_transition_to(self.state_after) {
                    return Err(Error::transition(format!(
                        "Cannot transition from '{}' to '{}'",
                        before, self.state_after
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_id;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_wire_strings() {
        let fixtures = [
            (Status::Acknowledged, "acknowledged"),
            (Status::Awaiting, "awaiting"),
            (Status::Executing, "executing"),
            (Status::Succeeded, "succeeded"),
            (Status::Failed, "failed"),
            (Status::Discarded, "discarded"),
            (Status::Unknown, "unknown"),
        ];

        for (status, expected) in fixtures {
            assert_eq!(status.as_str(), expected);
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{expected}\"")
            );
            assert_eq!(Status::from_str(expected).unwrap(), status);
        }
    }

    #[test]
    fn test_status_from_str_unknown() {
        let actual = Status::from_str("pending");
        assert!(actual.is_err());
    }

    #[test]
    fn test_status_terminal_and_final() {
        assert!(Status::Failed.is_terminal());
        assert!(!Status::Failed.is_final());
        assert!(Status::Succeeded.is_final());
        assert!(Status::Discarded.is_final());
        assert!(Status::Unknown.is_final());
        assert!(!Status::Awaiting.is_terminal());
        assert!(!Status::Executing.is_terminal());
    }

    #[test]
    fn test_status_state_machine() {
        assert!(Status::Acknowledged.can_transition_to(Status::Awaiting));
        assert!(Status::Awaiting.can_transition_to(Status::Executing));
        assert!(Status::Executing.can_transition_to(Status::Succeeded));
        assert!(Status::Executing.can_transition_to(Status::Failed));
        assert!(Status::Executing.can_transition_to(Status::Discarded));
        assert!(Status::Executing.can_transition_to(Status::Unknown));
        assert!(Status::Failed.can_transition_to(Status::Awaiting));

        assert!(!Status::Acknowledged.can_transition_to(Status::Executing));
        assert!(!Status::Succeeded.can_transition_to(Status::Awaiting));
        assert!(!Status::Discarded.can_transition_to(Status::Awaiting));
        assert!(!Status::Unknown.can_transition_to(Status::Awaiting));
    }

    #[test]
    fn test_transition_acknowledge() {
        let event_id = generate_id_with_prefix("evt");
        let job_id = generate_id_with_prefix("job");

        let actual = Transition::acknowledge(event_id.clone(), job_id.clone());

        assert_eq!(actual.state_before, None);
        assert_eq!(actual.state_after, Status::Acknowledged);
        assert_eq!(actual.attempt, 1);
        assert_eq!(actual.event_id, event_id);
        assert_eq!(actual.job_id, job_id);
        assert!(actual.id.as_str().starts_with("tr_"));
        assert!(actual.validate().is_ok());
    }

    #[test]
    fn test_transition_validate_rejects_invalid_move() {
        let fixture = Transition::new(
            generate_id(),
            generate_id(),
            1,
            Some(Status::Succeeded),
            Status::Awaiting,
        );
        let actual = fixture.validate();
        assert!(actual.is_err());
    }

    #[test]
    fn test_transition_validate_rejects_zero_attempt() {
        let fixture = Transition::new(
            generate_id(),
            generate_id(),
            0,
            Some(Status::Awaiting),
            Status::Executing,
        );
        let actual = fixture.validate();
        assert!(actual.is_err());
    }

    #[test]
    fn test_transition_with_error_setter() {
        let fixture = Transition::new(
            generate_id(),
            generate_id(),
            2,
            Some(Status::Executing),
            Status::Failed,
        )
        .error("connection reset");

        assert_eq!(fixture.error, Some("connection reset".to_string()));
    }
}

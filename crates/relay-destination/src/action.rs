use crate::schedule::Schedule;
use async_trait::async_trait;
use derive_setters::Setters;
use relay_core::{DateTime, Error, Event, Id, Job, Json, Result, Validation};
use relay_store::Queue;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Fields an action fills when loading a job into the destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct Payload {
    /// Contextual information about the job. When null, the context of the
    /// owning event is applied.
    pub context: Json,
    /// Data loaded into the destination
    pub data: Json,
    /// When the event was originally sent, if known
    pub sent_at: Option<DateTime>,
}

impl Payload {
    /// Create a payload carrying data only; the event context is applied
    pub fn new(data: Json) -> Self {
        Self {
            context: Json::Null,
            data,
            sent_at: None,
        }
    }
}

/// Reference to one destination action, as used in cascade lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionRef {
    /// The destination owning the action
    pub destination: String,
    /// The action to run
    pub action: String,
}

impl ActionRef {
    pub fn new(destination: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.destination, self.action)
    }
}

/// Outcome reported by an action while loading a batch.
///
/// One `load` invocation may report zero or more `Then` results before
/// terminating, per item or for the whole batch. The cascade lists allow
/// actions to trigger further actions on any destination depending on the
/// status the affected jobs reach.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct Then {
    /// Jobs the outcome applies to. Empty means the whole batch passed to
    /// the invocation.
    pub jobs: Vec<Id>,
    /// Error encountered while loading, if any
    pub error: Option<String>,
    /// Discard the affected jobs immediately, regardless of remaining
    /// retries. Requires `error` to be set.
    pub force_discard: bool,
    /// Actions to run when the affected jobs succeed
    pub on_succeeded: Vec<ActionRef>,
    /// Actions to run when the affected jobs fail
    pub on_failed: Vec<ActionRef>,
    /// Actions to run when the affected jobs are discarded
    pub on_discarded: Vec<ActionRef>,
}

impl Then {
    /// A successful outcome for the whole batch
    pub fn success() -> Self {
        Self::default()
    }

    /// A failure outcome for the whole batch
    pub fn failure(error: impl Into<String>) -> Self {
        Self::default().error(error)
    }

    /// A forced-discard outcome for the whole batch
    pub fn discard(error: impl Into<String>) -> Self {
        Self::default().error(error).force_discard(true)
    }

    /// Validate the outcome before it reaches the store
    pub fn validate(&self) -> Result<()> {
        if self.force_discard && self.error.is_none() {
            return Err(Error::validation(
                "then: Failed to validate",
                vec![Validation::new(
                    "Discarding on purpose requires an error",
                    &["Then", "force_discard"],
                )],
            ));
        }

        Ok(())
    }
}

/// Sending half of the outcome stream handed to [`Action::load`].
pub type ThenSender = mpsc::Sender<Then>;

/// A specific action to run against a destination.
///
/// The execution drives one batch of due jobs through `marshal`, which may
/// reshape each job's payload, then `load`, which delivers the batch and
/// reports outcomes through the sender. Dropping the sender without
/// reporting leaves the unresolved jobs in the `unknown` state.
#[async_trait]
pub trait Action: Send + Sync {
    /// String representation of the action.
    ///
    /// Examples: "*" (wildcard), "identify"
    fn name(&self) -> &str;

    /// Schedule at which the action runs. When None, the destination's
    /// schedule is applied.
    fn schedule(&self) -> Option<Schedule> {
        None
    }

    /// Reshape the payload of a job before loading. Returning None keeps the
    /// job's payload as created. Returning an error excludes the job from
    /// the batch and records the attempt as failed.
    async fn marshal(&self, _event: &Event, _job: &Job) -> Result<Option<Payload>> {
        Ok(None)
    }

    /// Load the batch into the destination. The queue only carries the jobs
    /// due for this action. Outcomes are reported through `results`, zero or
    /// more times, before the invocation returns.
    async fn load(&self, queue: &Queue, results: ThenSender) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_payload_defaults_to_event_context() {
        let actual = Payload::new(json!({"plan": "pro"}));
        assert_eq!(actual.context, Json::Null);
        assert_eq!(actual.data, json!({"plan": "pro"}));
        assert!(actual.sent_at.is_none());
    }

    #[test]
    fn test_action_ref_display() {
        let actual = ActionRef::new("warehouse", "insert");
        assert_eq!(actual.to_string(), "warehouse/insert");
    }

    #[test]
    fn test_then_success_applies_to_whole_batch() {
        let actual = Then::success();
        assert!(actual.jobs.is_empty());
        assert!(actual.error.is_none());
        assert!(!actual.force_discard);
        assert!(actual.validate().is_ok());
    }

    #[test]
    fn test_then_failure() {
        let actual = Then::failure("connection reset");
        assert_eq!(actual.error, Some("connection reset".to_string()));
        assert!(!actual.force_discard);
        assert!(actual.validate().is_ok());
    }

    #[test]
    fn test_then_discard() {
        let actual = Then::discard("unrecoverable payload");
        assert!(actual.force_discard);
        assert!(actual.validate().is_ok());
    }

    #[test]
    fn test_then_force_discard_without_error_is_rejected() {
        let fixture = Then::default().force_discard(true);
        let actual = fixture.validate();
        assert!(actual.is_err());
    }

    #[test]
    fn test_then_cascade_builders() {
        let fixture = Then::success()
            .on_succeeded(vec![ActionRef::new("mailer", "welcome")])
            .on_failed(vec![ActionRef::new("ops", "alert")]);

        assert_eq!(fixture.on_succeeded.len(), 1);
        assert_eq!(fixture.on_failed.len(), 1);
        assert!(fixture.on_discarded.is_empty());
    }

    #[test]
    fn test_then_serialization_round_trip() {
        let fixture = Then::failure("boom")
            .jobs(vec![relay_core::generate_id_with_prefix("job")])
            .on_discarded(vec![ActionRef::new("ops", "alert")]);
        let serialized = serde_json::to_string(&fixture).unwrap();
        let actual: Then = serde_json::from_str(&serialized).unwrap();
        assert_eq!(actual, fixture);
    }
}

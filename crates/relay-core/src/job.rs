use crate::{DateTime, Error, Id, Json, Result, Validation, generate_id_with_prefix};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};

/// One unit of work against one destination action.
///
/// A job is created when an event resolves work for a destination, or when a
/// parent job's outcome cascades into new work. Apart from its transitions a
/// job is immutable; it is never deleted except by purge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct Job {
    /// Unique, sortable job identifier
    pub id: Id,
    /// The destination the job runs against
    #[setters(skip)]
    pub destination: String,
    /// The destination action the job executes
    #[setters(skip)]
    pub action: String,
    /// Destination version, for schema evolution
    pub version: Option<String>,
    /// Contextual payload for the action
    pub context: Json,
    /// Data payload for the action
    pub data: Json,
    /// Creation timestamp
    pub created_at: DateTime,
    /// The event owning this job
    pub event_id: Id,
    /// The job whose outcome produced this one, for cascades
    pub parent_job_id: Option<Id>,
}

impl Job {
    /// Create a new job. The `event_id` is wired when the job is attached to
    /// an event.
    pub fn new(
        destination: impl Into<String>,
        action: impl Into<String>,
        context: Json,
        data: Json,
    ) -> Self {
        Self {
            id: generate_id_with_prefix("job"),
            destination: destination.into(),
            action: action.into(),
            version: None,
            context,
            data,
            created_at: chrono::Utc::now(),
            event_id: Id::new(""),
            parent_job_id: None,
        }
    }

    /// Create a cascade job: a child of `parent` scoped to the same event,
    /// inheriting the parent's payload.
    pub fn child_of(
        parent: &Job,
        destination: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id_with_prefix("job"),
            destination: destination.into(),
            action: action.into(),
            version: parent.version.clone(),
            context: parent.context.clone(),
            data: parent.data.clone(),
            created_at: chrono::Utc::now(),
            event_id: parent.event_id.clone(),
            parent_job_id: Some(parent.id.clone()),
        }
    }

    /// Validate the job
    pub fn validate(&self) -> Result<()> {
        let mut validations = Vec::new();

        if self.destination.is_empty() {
            validations.push(Validation::new(
                "Job destination must not be empty",
                &["Job", "destination"],
            ));
        }

        if self.action.is_empty() {
            validations.push(Validation::new(
                "Job action must not be empty",
                &["Job", "action"],
            ));
        }

        if !validations.is_empty() {
            return Err(Error::validation("job: Failed to validate", validations));
        }

        Ok(())
    }
}

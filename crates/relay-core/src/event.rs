use crate::{DateTime, Error, Id, Job, Json, Result, Validation, generate_id_with_prefix};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};

/// A receipt of incoming data.
///
/// An event is created by the ingestion boundary when a request, timer, or
/// change notification fires. It owns the ordered list of jobs derived from
/// it and is immutable once persisted: the store never updates or deletes an
/// event, only purge policies remove whole events with their descendants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct Event {
    /// Unique, sortable event identifier
    pub id: Id,
    /// The source that produced the event
    #[setters(skip)]
    pub source: String,
    /// The source's trigger that fired
    #[setters(skip)]
    pub trigger: String,
    /// Source version, for schema evolution
    pub version: Option<String>,
    /// Contextual payload shared by every job of the event
    pub context: Json,
    /// Data payload of the event
    pub data: Json,
    /// Jobs to execute for this event, in creation order
    #[setters(skip)]
    pub jobs: Vec<Job>,
    /// When the source originally sent the event, if known
    pub sent_at: Option<DateTime>,
    /// When the ingestion boundary received the event
    pub received_at: DateTime,
    /// When the event was written into the store
    pub ingested_at: Option<DateTime>,
}

impl Event {
    /// Create a new event received now
    pub fn new(source: impl Into<String>, trigger: impl Into<String>, data: Json) -> Self {
        Self {
            id: generate_id_with_prefix("evt"),
            source: source.into(),
            trigger: trigger.into(),
            version: None,
            context: Json::Null,
            data,
            jobs: Vec::new(),
            sent_at: None,
            received_at: chrono::Utc::now(),
            ingested_at: None,
        }
    }

    /// Attach a job to the event, wiring its `event_id`
    pub fn add_job(mut self, mut job: Job) -> Self {
        job.event_id = self.id.clone();
        self.jobs.push(job);
        self
    }

    /// Ids of every job owned by the event
    pub fn job_ids(&self) -> Vec<Id> {
        self.jobs.iter().map(|job| job.id.clone()).collect()
    }

    /// Validate the event and its jobs
    pub fn validate(&self) -> Result<()> {
        let mut validations = Vec::new();

        if self.source.is_empty() {
            validations.push(Validation::new(
                "Event source must not be empty",
                &["Event", "source"],
            ));
        }

        if self.trigger.is_empty() {
            validations.push(Validation::new(
                "Event trigger must not be empty",
                &["Event", "trigger"],
            ));
        }

        for job in &self.jobs {
            if job.event_id != self.id {
                validations.push(Validation::new(
                    "Job is not attached to this event",
                    &["Event", "jobs", job.id.as_str()],
                ));
            }

            if let Err(Error::Validation {
                validations: mut inner,
                ..
            }) = job.validate()
            {
                validations.append(&mut inner);
            }
        }

        if !validations.is_empty() {
            return Err(Error::validation("event: Failed to validate", validations));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn create_test_event() -> Event {
        Event::new("crm", "identify", json!({"user_id": "123"}))
    }

    #[test]
    fn test_event_creation() {
        let actual = create_test_event();

        assert_eq!(actual.source, "crm");
        assert_eq!(actual.trigger, "identify");
        assert_eq!(actual.data, json!({"user_id": "123"}));
        assert!(actual.jobs.is_empty());
        assert!(actual.id.as_str().starts_with("evt_"));
        assert!(actual.ingested_at.is_none());
    }

    #[test]
    fn test_event_setters() {
        let sent = chrono::Utc::now();
        let fixture = create_test_event()
            .version("1.0")
            .context(json!({"ip": "10.0.0.1"}))
            .sent_at(sent);

        assert_eq!(fixture.version, Some("1.0".to_string()));
        assert_eq!(fixture.context, json!({"ip": "10.0.0.1"}));
        assert_eq!(fixture.sent_at, Some(sent));
    }

    #[test]
    fn test_event_add_job_wires_event_id() {
        let job = Job::new("warehouse", "insert", json!({}), json!({}));
        let actual = create_test_event().add_job(job);

        assert_eq!(actual.jobs.len(), 1);
        assert_eq!(actual.jobs[0].event_id, actual.id);
        assert_eq!(actual.job_ids(), vec![actual.jobs[0].id.clone()]);
    }

    #[test]
    fn test_event_validation_success() {
        let fixture =
            create_test_event().add_job(Job::new("warehouse", "insert", json!({}), json!({})));
        assert!(fixture.validate().is_ok());
    }

    #[test]
    fn test_event_validation_empty_source() {
        let fixture = Event::new("", "identify", json!({}));
        let actual = fixture.validate();
        assert!(actual.is_err());
    }

    #[test]
    fn test_event_validation_collects_job_failures() {
        let fixture = create_test_event().add_job(Job::new("", "", json!({}), json!({})));

        match fixture.validate() {
            Err(Error::Validation { validations, .. }) => {
                assert_eq!(validations.len(), 2);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let fixture = create_test_event();
        let serialized = serde_json::to_string(&fixture).unwrap();
        let actual: Event = serde_json::from_str(&serialized).unwrap();
        assert_eq!(actual, fixture);
    }
}

use relay_core::{Event, Id, Job, Status, Transition};
use serde::{Deserialize, Serialize};

/// A batch of events and the jobs to run for them.
///
/// A queue is what an execution receives and what the realtime bus carries:
/// each event only holds the jobs relevant to the batch, never the full set
/// the event owns in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    /// Events carrying the jobs of the batch
    pub events: Vec<Event>,
}

impl Queue {
    /// Create a queue from a list of events
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Every job across the queue's events, in order
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.events.iter().flat_map(|event| event.jobs.iter())
    }

    /// Ids of every job in the queue
    pub fn job_ids(&self) -> Vec<Id> {
        self.jobs().map(|job| job.id.clone()).collect()
    }

    /// Number of jobs in the queue
    pub fn len(&self) -> usize {
        self.jobs().count()
    }

    /// Whether the queue carries no job
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A job together with its latest transition: the store's view of the job's
/// current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    /// The job
    pub job: Job,
    /// The job's latest transition
    pub transition: Transition,
}

impl JobState {
    /// Current status of the job
    pub fn status(&self) -> Status {
        self.transition.state_after
    }

    /// Execution attempt the job is currently at
    pub fn attempt(&self) -> u32 {
        self.transition.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_queue_jobs_across_events() {
        let event_a = Event::new("crm", "identify", json!({}))
            .add_job(Job::new("warehouse", "insert", json!({}), json!({})))
            .add_job(Job::new("crm", "track", json!({}), json!({})));
        let event_b = Event::new("billing", "charge", json!({}))
            .add_job(Job::new("warehouse", "insert", json!({}), json!({})));

        let actual = Queue::new(vec![event_a, event_b]);

        assert_eq!(actual.len(), 3);
        assert!(!actual.is_empty());
        assert_eq!(actual.job_ids().len(), 3);
    }

    #[test]
    fn test_queue_empty() {
        let actual = Queue::default();
        assert!(actual.is_empty());
        assert_eq!(actual.len(), 0);
    }

    #[test]
    fn test_job_state_accessors() {
        let job = Job::new("warehouse", "insert", json!({}), json!({}));
        let transition = Transition::new(
            relay_core::generate_id(),
            job.id.clone(),
            2,
            Some(Status::Awaiting),
            Status::Executing,
        );

        let actual = JobState {
            job,
            transition: transition.clone(),
        };

        assert_eq!(actual.status(), Status::Executing);
        assert_eq!(actual.attempt(), 2);
    }
}

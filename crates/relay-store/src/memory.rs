use crate::query::{EventQuery, JobQuery, Meta, TransitionQuery};
use crate::queue::JobState;
use crate::traits::Store;
use async_trait::async_trait;
use relay_core::{Error, Event, Id, Job, Result, Transition};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Default number of entries returned when a query does not set a limit.
const DEFAULT_LIMIT: u64 = 100;

/// Hard ceiling on the number of entries a single query can return.
const MAX_LIMIT: u64 = 1000;

/// In-process store implementation.
///
/// Entries live in id-ordered maps; since ids are ULIDs, iteration order is
/// creation order. Rows are never mutated after insert, matching the
/// append-only contract of [`Store`].
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    /// Events, stored without their jobs
    events: BTreeMap<Id, Event>,
    jobs: BTreeMap<Id, Job>,
    transitions: BTreeMap<Id, Transition>,
}

impl Inner {
    /// Latest transition of a job, ordered by creation time, then attempt,
    /// then position within the attempt.
    fn latest_transition(&self, job_id: &Id) -> Option<&Transition> {
        self.transitions
            .values()
            .filter(|t| &t.job_id == job_id)
            .max_by_key(|t| {
                (
                    t.created_at,
                    t.attempt,
                    t.state_after.ordinal(),
                    t.id.clone(),
                )
            })
    }

    /// Jobs owned by an event, in creation order
    fn jobs_of(&self, event_id: &Id) -> Vec<Job> {
        self.jobs
            .values()
            .filter(|job| &job.event_id == event_id)
            .cloned()
            .collect()
    }

    fn assemble_event(&self, event: &Event) -> Event {
        let mut assembled = event.clone();
        assembled.jobs = self.jobs_of(&event.id);
        assembled
    }

    fn event_matches(&self, event: &Event, query: &EventQuery) -> bool {
        if !matches_in_not_in(
            Some(&event.source),
            &query.sources_in,
            &query.sources_not_in,
        ) {
            return false;
        }
        if !matches_in_not_in(
            Some(&event.trigger),
            &query.triggers_in,
            &query.triggers_not_in,
        ) {
            return false;
        }
        if !matches_in_not_in(
            event.version.as_ref(),
            &query.versions_in,
            &query.versions_not_in,
        ) {
            return false;
        }
        if let Some(before) = query.received_before
            && event.received_at >= before
        {
            return false;
        }
        if let Some(after) = query.received_after
            && event.received_at <= after
        {
            return false;
        }

        if let Some(jobs) = &query.jobs {
            let owned = self.jobs_of(&event.id);
            if !owned.iter().any(|job| self.job_matches(job, jobs)) {
                return false;
            }
        }

        true
    }

    fn job_matches(&self, job: &Job, query: &JobQuery) -> bool {
        // A pinned event id short-circuits the other job constraints, save
        // for the transition ones.
        if let Some(event_id) = &query.event_id {
            if &job.event_id != event_id {
                return false;
            }
            return self.job_transition_matches(job, query);
        }

        if !query.ids_in.is_empty() && !query.ids_in.contains(&job.id) {
            return false;
        }
        if !matches_in_not_in(
            Some(&job.destination),
            &query.destinations_in,
            &query.destinations_not_in,
        ) {
            return false;
        }
        if !matches_in_not_in(
            Some(&job.action),
            &query.actions_in,
            &query.actions_not_in,
        ) {
            return false;
        }
        if !matches_in_not_in(
            job.version.as_ref(),
            &query.versions_in,
            &query.versions_not_in,
        ) {
            return false;
        }
        if let Some(before) = query.created_before
            && job.created_at >= before
        {
            return false;
        }
        if let Some(after) = query.created_after
            && job.created_at <= after
        {
            return false;
        }

        self.job_transition_matches(job, query)
    }

    fn job_transition_matches(&self, job: &Job, query: &JobQuery) -> bool {
        let Some(constraints) = &query.transitions else {
            return true;
        };

        // Status and attempt constraints apply to the job's current state.
        let Some(latest) = self.latest_transition(&job.id) else {
            return false;
        };

        transition_matches(latest, constraints)
    }
}

fn matches_in_not_in(value: Option<&String>, within: &[String], without: &[String]) -> bool {
    match value {
        Some(value) => {
            if !within.is_empty() && !within.contains(value) {
                return false;
            }
            !without.contains(value)
        }
        // Entries without a value only fail inclusion filters.
        None => within.is_empty(),
    }
}

fn transition_matches(transition: &Transition, query: &TransitionQuery) -> bool {
    if let Some(job_id) = &query.job_id {
        return &transition.job_id == job_id;
    }

    if !query.status_in.is_empty() && !query.status_in.contains(&transition.state_after) {
        return false;
    }
    if query.status_not_in.contains(&transition.state_after) {
        return false;
    }
    if let Some(min) = query.min_attempts
        && transition.attempt < min
    {
        return false;
    }
    if let Some(max) = query.max_attempts
        && transition.attempt > max
    {
        return false;
    }

    true
}

fn clamp_limit(limit: u64) -> u64 {
    if limit == 0 {
        DEFAULT_LIMIT
    } else {
        limit.min(MAX_LIMIT)
    }
}

fn paginate<T>(mut entries: Vec<T>, offset: u64, limit: u64) -> (Vec<T>, u64) {
    let count = entries.len() as u64;
    let entries = if offset >= count {
        Vec::new()
    } else {
        entries
            .drain(offset as usize..)
            .take(limit as usize)
            .collect()
    };
    (entries, count)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_events(&self, events: &[Event]) -> Result<()> {
        let mut inner = self.inner.write().await;

        // Reject the whole batch before touching anything.
        for event in events {
            if inner.events.contains_key(&event.id) {
                return Err(Error::store(format!(
                    "Event '{}' already exists, rows are immutable",
                    event.id
                )));
            }
            for job in &event.jobs {
                if inner.jobs.contains_key(&job.id) {
                    return Err(Error::store(format!(
                        "Job '{}' already exists, rows are immutable",
                        job.id
                    )));
                }
            }
        }

        let now = chrono::Utc::now();
        for event in events {
            let mut stored = event.clone();
            stored.ingested_at = Some(now);

            for job in stored.jobs.drain(..) {
                inner.jobs.insert(job.id.clone(), job);
            }
            inner.events.insert(stored.id.clone(), stored);
        }

        debug!(count = events.len(), "inserted events");
        Ok(())
    }

    async fn find_event(&self, id: &Id) -> Result<Option<Event>> {
        let inner = self.inner.read().await;
        Ok(inner.events.get(id).map(|event| inner.assemble_event(event)))
    }

    async fn find_events(&self, query: &EventQuery) -> Result<(Vec<Event>, Meta<EventQuery>)> {
        let inner = self.inner.read().await;

        let mut applied = query.clone();
        applied.limit = clamp_limit(applied.limit);

        let matches: Vec<Event> = inner
            .events
            .values()
            .filter(|event| inner.event_matches(event, &applied))
            .map(|event| inner.assemble_event(event))
            .collect();

        let (entries, count) = paginate(matches, applied.offset, applied.limit);
        let meta = Meta::new(count, applied.offset, applied.limit, applied);
        Ok((entries, meta))
    }

    async fn add_jobs(&self, jobs: &[Job]) -> Result<()> {
        let mut inner = self.inner.write().await;

        for job in jobs {
            if inner.jobs.contains_key(&job.id) {
                return Err(Error::store(format!(
                    "Job '{}' already exists, rows are immutable",
                    job.id
                )));
            }
            if !inner.events.contains_key(&job.event_id) {
                return Err(Error::store(format!(
                    "Job '{}' references unknown event '{}'",
                    job.id, job.event_id
                )));
            }
        }

        for job in jobs {
            inner.jobs.insert(job.id.clone(), job.clone());
        }

        debug!(count = jobs.len(), "added jobs");
        Ok(())
    }

    async fn find_job(&self, id: &Id) -> Result<Option<Job>> {
        let inner = self.inner.read().await;
        Ok(inner.jobs.get(id).cloned())
    }

    async fn find_jobs(&self, query: &JobQuery) -> Result<(Vec<JobState>, Meta<JobQuery>)> {
        let inner = self.inner.read().await;

        let mut applied = query.clone();
        applied.limit = clamp_limit(applied.limit);

        let matches: Vec<JobState> = inner
            .jobs
            .values()
            .filter(|job| inner.job_matches(job, &applied))
            .filter_map(|job| {
                inner.latest_transition(&job.id).map(|transition| JobState {
                    job: job.clone(),
                    transition: transition.clone(),
                })
            })
            .collect();

        let (entries, count) = paginate(matches, applied.offset, applied.limit);
        let meta = Meta::new(count, applied.offset, applied.limit, applied);
        Ok((entries, meta))
    }

    async fn add_transitions(&self, transitions: &[Transition]) -> Result<()> {
        let mut inner = self.inner.write().await;

        for transition in transitions {
            if inner.transitions.contains_key(&transition.id) {
                return Err(Error::store(format!(
                    "Transition '{}' already exists, rows are immutable",
                    transition.id
                )));
            }
            if !inner.jobs.contains_key(&transition.job_id) {
                return Err(Error::store(format!(
                    "Transition '{}' references unknown job '{}'",
                    transition.id, transition.job_id
                )));
            }
        }

        for transition in transitions {
            inner
                .transitions
                .insert(transition.id.clone(), transition.clone());
        }

        debug!(count = transitions.len(), "added transitions");
        Ok(())
    }

    async fn find_transition(&self, id: &Id) -> Result<Option<Transition>> {
        let inner = self.inner.read().await;
        Ok(inner.transitions.get(id).cloned())
    }

    async fn find_transitions(
        &self,
        query: &TransitionQuery,
    ) -> Result<(Vec<Transition>, Meta<TransitionQuery>)> {
        let inner = self.inner.read().await;

        let mut applied = query.clone();
        applied.limit = clamp_limit(applied.limit);

        let matches: Vec<Transition> = inner
            .transitions
            .values()
            .filter(|transition| transition_matches(transition, &applied))
            .cloned()
            .collect();

        let (entries, count) = paginate(matches, applied.offset, applied.limit);
        let meta = Meta::new(count, applied.offset, applied.limit, applied);
        Ok((entries, meta))
    }

    async fn purge(&self, query: &EventQuery) -> Result<u64> {
        let mut inner = self.inner.write().await;

        let doomed: Vec<Id> = inner
            .events
            .values()
            .filter(|event| inner.event_matches(event, query))
            .map(|event| event.id.clone())
            .collect();

        for event_id in &doomed {
            inner.events.remove(event_id);
            inner.jobs.retain(|_, job| &job.event_id != event_id);
            inner
                .transitions
                .retain(|_, transition| &transition.event_id != event_id);
        }

        debug!(count = doomed.len(), "purged events");
        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use relay_core::Status;
    use serde_json::json;

    fn create_test_event() -> Event {
        Event::new("crm", "identify", json!({"user_id": "123"}))
            .add_job(Job::new("warehouse", "insert", json!({}), json!({})))
            .add_job(Job::new("mailer", "welcome", json!({}), json!({})))
    }

    async fn acknowledge_all(store: &MemoryStore, event: &Event) {
        let transitions: Vec<Transition> = event
            .jobs
            .iter()
            .map(|job| Transition::acknowledge(event.id.clone(), job.id.clone()))
            .collect();
        store.add_transitions(&transitions).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_and_find_event() {
        let store = MemoryStore::new();
        let fixture = create_test_event();

        store.insert_events(&[fixture.clone()]).await.unwrap();

        let actual = store.find_event(&fixture.id).await.unwrap().unwrap();
        assert_eq!(actual.id, fixture.id);
        assert_eq!(actual.jobs.len(), 2);
        assert!(actual.ingested_at.is_some());
    }

    #[tokio::test]
    async fn test_insert_duplicate_event_is_rejected() {
        let store = MemoryStore::new();
        let fixture = create_test_event();

        store.insert_events(&[fixture.clone()]).await.unwrap();
        let actual = store.insert_events(&[fixture]).await;

        assert!(actual.is_err());
    }

    #[tokio::test]
    async fn test_add_jobs_requires_existing_event() {
        let store = MemoryStore::new();
        let orphan = Job::new("warehouse", "insert", json!({}), json!({}));

        let actual = store.add_jobs(&[orphan]).await;

        assert!(actual.is_err());
    }

    #[tokio::test]
    async fn test_add_transitions_appends_history() {
        let store = MemoryStore::new();
        let fixture = create_test_event();
        store.insert_events(&[fixture.clone()]).await.unwrap();
        acknowledge_all(&store, &fixture).await;

        let job = &fixture.jobs[0];
        let awaiting = Transition::new(
            fixture.id.clone(),
            job.id.clone(),
            1,
            Some(Status::Acknowledged),
            Status::Awaiting,
        );
        store.add_transitions(&[awaiting.clone()]).await.unwrap();

        let (states, _) = store
            .find_jobs(&JobQuery::default().ids_in(vec![job.id.clone()]))
            .await
            .unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].status(), Status::Awaiting);

        let duplicate = store.add_transitions(&[awaiting]).await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_find_jobs_by_current_status() {
        let store = MemoryStore::new();
        let fixture = create_test_event();
        store.insert_events(&[fixture.clone()]).await.unwrap();
        acknowledge_all(&store, &fixture).await;

        let job = &fixture.jobs[0];
        store
            .add_transitions(&[Transition::new(
                fixture.id.clone(),
                job.id.clone(),
                1,
                Some(Status::Acknowledged),
                Status::Awaiting,
            )])
            .await
            .unwrap();

        let query = JobQuery::default()
            .transitions(TransitionQuery::default().status_in(vec![Status::Awaiting]));
        let (actual, meta) = store.find_jobs(&query).await.unwrap();

        assert_eq!(actual.len(), 1);
        assert_eq!(actual[0].job.id, job.id);
        assert_eq!(meta.count, 1);
    }

    #[tokio::test]
    async fn test_find_events_filters_and_meta() {
        let store = MemoryStore::new();
        let keep = create_test_event();
        let other = Event::new("billing", "charge", json!({}))
            .add_job(Job::new("warehouse", "insert", json!({}), json!({})));
        store
            .insert_events(&[keep.clone(), other.clone()])
            .await
            .unwrap();

        let query = EventQuery::default().sources_in(vec!["crm".to_string()]);
        let (actual, meta) = store.find_events(&query).await.unwrap();

        assert_eq!(actual.len(), 1);
        assert_eq!(actual[0].id, keep.id);
        assert_eq!(meta.count, 1);
        assert_eq!(meta.where_applied.limit, DEFAULT_LIMIT);
        assert_eq!(meta.pagination.current, 1);
    }

    #[tokio::test]
    async fn test_find_jobs_event_id_pins_scope() {
        let store = MemoryStore::new();
        let first = create_test_event();
        let second = create_test_event();
        store
            .insert_events(&[first.clone(), second.clone()])
            .await
            .unwrap();
        acknowledge_all(&store, &first).await;
        acknowledge_all(&store, &second).await;

        let query = JobQuery::default().event_id(first.id.clone());
        let (actual, _) = store.find_jobs(&query).await.unwrap();

        assert_eq!(actual.len(), 2);
        assert!(actual.iter().all(|state| state.job.event_id == first.id));
    }

    #[tokio::test]
    async fn test_purge_removes_event_with_descendants() {
        let store = MemoryStore::new();
        let doomed = create_test_event();
        let survivor = Event::new("billing", "charge", json!({}))
            .add_job(Job::new("warehouse", "insert", json!({}), json!({})));
        store
            .insert_events(&[doomed.clone(), survivor.clone()])
            .await
            .unwrap();
        acknowledge_all(&store, &doomed).await;
        acknowledge_all(&store, &survivor).await;

        let purged = store
            .purge(&EventQuery::default().sources_in(vec!["crm".to_string()]))
            .await
            .unwrap();

        assert_eq!(purged, 1);
        assert!(store.find_event(&doomed.id).await.unwrap().is_none());
        assert!(
            store
                .find_job(&doomed.jobs[0].id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.find_event(&survivor.id).await.unwrap().is_some());

        let (transitions, _) = store
            .find_transitions(&TransitionQuery::default())
            .await
            .unwrap();
        assert!(transitions.iter().all(|t| t.event_id == survivor.id));
    }

    #[tokio::test]
    async fn test_latest_transition_orders_within_attempt() {
        let store = MemoryStore::new();
        let fixture = create_test_event();
        store.insert_events(&[fixture.clone()]).await.unwrap();

        let job = &fixture.jobs[0];
        let now = chrono::Utc::now();

        // Same timestamp across a whole attempt: ordering falls back to the
        // attempt number and the status position within the attempt.
        let mut acknowledged = Transition::acknowledge(fixture.id.clone(), job.id.clone());
        acknowledged.created_at = now;
        let mut awaiting = Transition::new(
            fixture.id.clone(),
            job.id.clone(),
            1,
            Some(Status::Acknowledged),
            Status::Awaiting,
        );
        awaiting.created_at = now;
        let mut executing = Transition::new(
            fixture.id.clone(),
            job.id.clone(),
            1,
            Some(Status::Awaiting),
            Status::Executing,
        );
        executing.created_at = now;
        let mut failed = Transition::new(
            fixture.id.clone(),
            job.id.clone(),
            1,
            Some(Status::Executing),
            Status::Failed,
        );
        failed.created_at = now;

        store
            .add_transitions(&[acknowledged, awaiting, executing, failed])
            .await
            .unwrap();

        let (states, _) = store
            .find_jobs(&JobQuery::default().ids_in(vec![job.id.clone()]))
            .await
            .unwrap();
        assert_eq!(states[0].status(), Status::Failed);
        assert_eq!(states[0].attempt(), 1);
    }

    #[tokio::test]
    async fn test_pagination_applies_offset_and_limit() {
        let store = MemoryStore::new();
        let mut events = Vec::new();
        for _ in 0..5 {
            events.push(create_test_event());
        }
        store.insert_events(&events).await.unwrap();

        let query = EventQuery::default().offset(2u64).limit(2u64);
        let (actual, meta) = store.find_events(&query).await.unwrap();

        assert_eq!(actual.len(), 2);
        assert_eq!(meta.count, 5);
        assert_eq!(meta.pagination.current, 2);
        assert_eq!(meta.pagination.last, 3);
    }
}

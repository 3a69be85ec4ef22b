use crate::query::{EventQuery, JobQuery, Meta, TransitionQuery};
use crate::queue::JobState;
use async_trait::async_trait;
use relay_core::{Event, Id, Job, Result, Transition};

/// Persistence boundary for events, jobs, and transitions.
///
/// Implementations must be append-only: no operation rewrites an existing
/// row. Inserting an id that already exists is an error. The only destructive
/// operation is [`Store::purge`], which removes whole events together with
/// their jobs and transitions.
///
/// "Latest transition" reads must observe the implementation's own completed
/// writes (read-your-writes), so a scheduler never re-schedules a job it just
/// transitioned.
#[async_trait]
pub trait Store: Send + Sync {
    /// String representation of the store implementation.
    ///
    /// Example: "memory"
    fn name(&self) -> &str;

    /// Insert a batch of events, each with the jobs it owns. Jobs are
    /// persisted alongside their event; the events' `ingested_at` is set by
    /// the store.
    async fn insert_events(&self, events: &[Event]) -> Result<()>;

    /// Return an event by id, with its jobs attached
    async fn find_event(&self, id: &Id) -> Result<Option<Event>>;

    /// Return the events matching the constraints, with pagination meta
    async fn find_events(&self, query: &EventQuery) -> Result<(Vec<Event>, Meta<EventQuery>)>;

    /// Insert a list of jobs for already-persisted events. Used by cascades,
    /// where jobs are created after their event.
    async fn add_jobs(&self, jobs: &[Job]) -> Result<()>;

    /// Return a job by id
    async fn find_job(&self, id: &Id) -> Result<Option<Job>>;

    /// Return the jobs matching the constraints together with their current
    /// transition, with pagination meta
    async fn find_jobs(&self, query: &JobQuery) -> Result<(Vec<JobState>, Meta<JobQuery>)>;

    /// Insert a list of transitions. New transitions are appended instead of
    /// updating the jobs so that the full history is kept.
    async fn add_transitions(&self, transitions: &[Transition]) -> Result<()>;

    /// Return a transition by id
    async fn find_transition(&self, id: &Id) -> Result<Option<Transition>>;

    /// Return the transitions matching the constraints, with pagination meta
    async fn find_transitions(
        &self,
        query: &TransitionQuery,
    ) -> Result<(Vec<Transition>, Meta<TransitionQuery>)>;

    /// Remove every event matching the constraints, along with their jobs
    /// and transitions. Offset, limit, and pagination are not applied.
    /// Returns the number of events removed.
    async fn purge(&self, query: &EventQuery) -> Result<u64>;
}

use crate::error::Result;
use relay_core::{DateTime, Event, Id, Status};
use relay_destination::{Interval, Registry, Schedule};
use relay_store::{JobQuery, JobState, Queue, Store, TransitionQuery};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Upper bound on the number of jobs considered per polling cycle. Jobs
/// beyond the bound stay due and are picked up by the next cycle.
const CYCLE_LIMIT: u64 = 1000;

/// One batch of due jobs for one destination action.
///
/// The queue carries the due jobs grouped under their owning events; every
/// job in the batch shares the destination and action.
#[derive(Debug, Clone)]
pub struct Batch {
    /// The destination the batch runs against
    pub destination: String,
    /// The action the batch executes
    pub action: String,
    /// The schedule resolved for the destination/action pair
    pub schedule: Schedule,
    /// Events carrying the due jobs
    pub queue: Queue,
    /// Current state of every job in the batch
    pub states: Vec<JobState>,
}

/// Decides when and how jobs move from `awaiting` to `executing`.
///
/// The polled path computes due jobs from durable storage: a job is due when
/// its latest transition plus the resolved interval has elapsed. Jobs on a
/// realtime schedule are skipped here for their first attempt while a bus is
/// configured, since the realtime path owns that delivery; their retries are
/// always polled.
pub struct Resolver {
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
    default_schedule: Schedule,
}

impl Resolver {
    pub fn new(store: Arc<dyn Store>, registry: Arc<Registry>, default_schedule: Schedule) -> Self {
        Self {
            store,
            registry,
            default_schedule,
        }
    }

    /// Compute the batches due at `now`, grouped by destination action.
    ///
    /// `realtime_via_bus` tells the resolver whether a bus is configured:
    /// without one, realtime schedules degrade to the polled path.
    pub async fn due_batches(&self, now: DateTime, realtime_via_bus: bool) -> Result<Vec<Batch>> {
        let query = JobQuery::default()
            .transitions(TransitionQuery::default().status_in(vec![
                Status::Acknowledged,
                Status::Awaiting,
                Status::Failed,
            ]))
            .limit(CYCLE_LIMIT);
        let (states, _) = self.store.find_jobs(&query).await?;

        let mut groups: BTreeMap<(String, String), Vec<JobState>> = BTreeMap::new();
        for state in states {
            let destination = state.job.destination.clone();
            let action = state.job.action.clone();
            let schedule = self
                .registry
                .schedule_for(&destination, &action, &self.default_schedule);

            if !self.is_due(&state, &schedule, now, realtime_via_bus) {
                continue;
            }

            groups.entry((destination, action)).or_default().push(state);
        }

        let mut batches = Vec::with_capacity(groups.len());
        for ((destination, action), states) in groups {
            let schedule = self
                .registry
                .schedule_for(&destination, &action, &self.default_schedule);
            let queue = self.assemble_queue(&states).await?;
            batches.push(Batch {
                destination,
                action,
                schedule,
                queue,
                states,
            });
        }

        Ok(batches)
    }

    fn is_due(
        &self,
        state: &JobState,
        schedule: &Schedule,
        now: DateTime,
        realtime_via_bus: bool,
    ) -> bool {
        // First attempts of realtime jobs are delivered by the bus; the
        // polled path only handles their retries.
        if schedule.realtime
            && realtime_via_bus
            && state.attempt() <= 1
            && matches!(state.status(), Status::Acknowledged | Status::Awaiting)
        {
            return false;
        }

        let interval = match schedule.parse_interval() {
            Ok(interval) => interval,
            Err(err) => {
                warn!(
                    destination = %state.job.destination,
                    action = %state.job.action,
                    %err,
                    "unparsable interval, falling back to the platform default"
                );
                match self.default_schedule.parse_interval() {
                    Ok(interval) => interval,
                    Err(_) => return false,
                }
            }
        };

        self.is_due_at(&interval, state, now)
    }

    fn is_due_at(&self, interval: &Interval, state: &JobState, now: DateTime) -> bool {
        match interval.next_after(state.transition.created_at) {
            Some(due_at) => due_at <= now,
            // A CRON expression with no future occurrence never fires.
            None => false,
        }
    }

    /// Group the due jobs under their owning events, fetched from the store.
    async fn assemble_queue(&self, states: &[JobState]) -> Result<Queue> {
        let mut by_event: BTreeMap<Id, Vec<usize>> = BTreeMap::new();
        for (index, state) in states.iter().enumerate() {
            by_event
                .entry(state.job.event_id.clone())
                .or_default()
                .push(index);
        }

        let mut events: Vec<Event> = Vec::with_capacity(by_event.len());
        let mut missing: HashMap<Id, usize> = HashMap::new();
        for (event_id, indexes) in by_event {
            match self.store.find_event(&event_id).await? {
                Some(mut event) => {
                    event.jobs = indexes
                        .into_iter()
                        .map(|index| states[index].job.clone())
                        .collect();
                    events.push(event);
                }
                None => {
                    missing.insert(event_id, indexes.len());
                }
            }
        }

        for (event_id, jobs) in missing {
            warn!(%event_id, jobs, "due jobs reference a missing event, skipping them");
        }

        Ok(Queue::new(events))
    }
}

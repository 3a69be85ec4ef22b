use crate::cascade::Dispatcher;
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::executor::Executor;
use crate::resolver::{Batch, Resolver};
use relay_core::{DateTime, Event, Job, Status, Transition};
use relay_destination::{Action, Registry};
use relay_pubsub::{PubSub, Subscription};
use relay_store::{JobQuery, Queue, Store, TransitionQuery};
use relay_supervisor::{Supervisor, polling_key, purge_key};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

/// Summary of one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Batches that were due this cycle
    pub batches: usize,
    /// Jobs executed across the cycle's batches
    pub executed: usize,
    /// Batches skipped because another instance holds their key, or the
    /// lock backend was unavailable
    pub skipped: usize,
    /// Cascade jobs created from the cycle's outcomes
    pub cascaded: usize,
}

/// The Relay execution engine.
///
/// One scheduler instance polls the store for due jobs at its configured
/// interval and, when a bus is present, subscribes to realtime queues. Both
/// paths funnel into the same executor and cascade dispatcher. Polling
/// cycles are guarded per destination action by the supervisor; realtime
/// work needs no guard since the bus delivers each queue to a single
/// subscribing instance.
pub struct Scheduler {
    config: SchedulerConfig,
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
    supervisor: Option<Arc<dyn Supervisor>>,
    pubsub: Option<Arc<dyn PubSub>>,
    resolver: Resolver,
    executor: Executor,
    dispatcher: Dispatcher,
    purge_marks: Mutex<HashMap<usize, DateTime>>,
}

impl Scheduler {
    /// Wire a scheduler from its collaborators. The configuration is
    /// validated once here; defaults never fall back silently afterwards.
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn Store>,
        registry: Registry,
        supervisor: Option<Arc<dyn Supervisor>>,
        pubsub: Option<Arc<dyn PubSub>>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(registry);
        let resolver = Resolver::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            config.default_schedule.clone(),
        );
        let executor = Executor::new(Arc::clone(&store), config.load_timeout);
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            config.max_cascade_depth,
        );

        Ok(Self {
            config,
            store,
            registry,
            supervisor,
            pubsub,
            resolver,
            executor,
            dispatcher,
            purge_marks: Mutex::new(HashMap::new()),
        })
    }

    /// Ingest an event produced by the ingestion boundary: persist it with
    /// its jobs, acknowledge them, mark them awaiting, and hand realtime
    /// jobs to the bus.
    pub async fn ingest(&self, event: Event) -> Result<()> {
        event.validate()?;

        self.store.insert_events(std::slice::from_ref(&event)).await?;

        let mut transitions = Vec::with_capacity(event.jobs.len() * 2);
        for job in &event.jobs {
            transitions.push(Transition::acknowledge(event.id.clone(), job.id.clone()));
            transitions.push(Transition::new(
                event.id.clone(),
                job.id.clone(),
                1,
                Some(Status::Acknowledged),
                Status::Awaiting,
            ));
        }
        self.store.add_transitions(&transitions).await?;

        debug!(event_id = %event.id, jobs = event.jobs.len(), "ingested event");

        self.publish_realtime(&event, event.jobs.clone()).await;
        Ok(())
    }

    /// Run the scheduler until the shutdown signal flips. On shutdown, no
    /// new batch is started; in-flight loads settle through the executor
    /// before the loop returns.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut subscription: Option<Subscription> = match &self.pubsub {
            Some(bus) => Some(bus.subscribe().await?),
            None => None,
        };

        info!(
            name = %self.config.name,
            store = %self.store.name(),
            realtime = subscription.is_some(),
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    let now = chrono::Utc::now();
                    match self.run_cycle(now).await {
                        Ok(report) if report.batches > 0 => {
                            debug!(?report, "polling cycle finished");
                        }
                        Ok(_) => {}
                        Err(err) => error!(%err, "polling cycle failed"),
                    }
                    if let Err(err) = self.run_purges(now).await {
                        error!(%err, "purge pass failed");
                    }
                }
                queue = recv_queue(&mut subscription) => {
                    match queue {
                        Some(queue) => {
                            if let Err(err) = self.execute_realtime(queue).await {
                                error!(%err, "realtime execution failed");
                            }
                        }
                        None => {
                            warn!("realtime bus closed, continuing with the polled path");
                            subscription = None;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(name = %self.config.name, "scheduler stopped");
        Ok(())
    }

    /// One polling pass: resolve due batches and execute each under its
    /// semaphore key. A key held elsewhere, or an unreachable lock backend,
    /// skips the batch; it stays due for the next cycle.
    pub async fn run_cycle(&self, now: DateTime) -> Result<CycleReport> {
        let batches = self
            .resolver
            .due_batches(now, self.pubsub.is_some())
            .await?;

        let mut report = CycleReport {
            batches: batches.len(),
            ..CycleReport::default()
        };

        for batch in batches {
            let Some(action) = self.registry.resolve(&batch.destination, &batch.action) else {
                warn!(
                    destination = %batch.destination,
                    action = %batch.action,
                    jobs = batch.states.len(),
                    "no action registered for due jobs, leaving them awaiting"
                );
                continue;
            };

            let key = polling_key(&batch.destination, &batch.action);
            if !self.try_acquire(&key).await {
                report.skipped += 1;
                continue;
            }

            let outcome = self.run_batch(&batch, action).await;
            self.release(&key).await;

            match outcome {
                Ok(cascaded) => {
                    report.executed += batch.states.len();
                    report.cascaded += cascaded;
                }
                Err(err) => {
                    error!(
                        destination = %batch.destination,
                        action = %batch.action,
                        %err,
                        "batch execution failed"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Execute a realtime queue received from the bus. Jobs are re-read from
    /// the store so the executor sees their current transitions.
    pub async fn execute_realtime(&self, queue: Queue) -> Result<()> {
        for event in &queue.events {
            let mut groups: BTreeMap<(String, String), Vec<Job>> = BTreeMap::new();
            for job in &event.jobs {
                groups
                    .entry((job.destination.clone(), job.action.clone()))
                    .or_default()
                    .push(job.clone());
            }

            for ((destination, action), jobs) in groups {
                let Some(resolved) = self.registry.resolve(&destination, &action) else {
                    warn!(%destination, %action, "no action registered for realtime jobs");
                    continue;
                };

                let query = JobQuery::default()
                    .ids_in(jobs.iter().map(|job| job.id.clone()).collect::<Vec<_>>())
                    .transitions(TransitionQuery::default().status_in(vec![
                        Status::Acknowledged,
                        Status::Awaiting,
                    ]));
                let (states, _) = self.store.find_jobs(&query).await?;
                if states.is_empty() {
                    continue;
                }

                let mut scoped = event.clone();
                scoped.jobs = states.iter().map(|state| state.job.clone()).collect();
                let batch = Batch {
                    schedule: self.registry.schedule_for(
                        &destination,
                        &action,
                        &self.config.default_schedule,
                    ),
                    destination,
                    action,
                    queue: Queue::new(vec![scoped]),
                    states,
                };

                if let Err(err) = self.run_batch(&batch, resolved).await {
                    error!(
                        destination = %batch.destination,
                        action = %batch.action,
                        %err,
                        "realtime batch execution failed"
                    );
                }
            }
        }

        Ok(())
    }

    /// Execute one batch and dispatch its cascades. Returns the number of
    /// cascade jobs created.
    async fn run_batch(&self, batch: &Batch, action: Arc<dyn Action>) -> Result<usize> {
        let outcomes = self.executor.execute(batch, action).await?;
        let created = self.dispatcher.dispatch(&outcomes).await?;

        // Realtime cascade jobs go out on the bus like ingested ones.
        let mut by_event: BTreeMap<_, Vec<Job>> = BTreeMap::new();
        for job in &created {
            by_event
                .entry(job.event_id.clone())
                .or_default()
                .push(job.clone());
        }
        for (event_id, jobs) in by_event {
            match self.store.find_event(&event_id).await? {
                Some(event) => self.publish_realtime(&event, jobs).await,
                None => warn!(%event_id, "cascade jobs reference a missing event"),
            }
        }

        Ok(created.len())
    }

    /// Publish the realtime subset of `jobs` on the bus, scoped under their
    /// event. Publishing is best-effort: a failure is surfaced to operators
    /// but does not fail the caller.
    async fn publish_realtime(&self, event: &Event, jobs: Vec<Job>) {
        let Some(bus) = &self.pubsub else {
            return;
        };

        let realtime: Vec<Job> = jobs
            .into_iter()
            .filter(|job| {
                self.registry
                    .schedule_for(
                        &job.destination,
                        &job.action,
                        &self.config.default_schedule,
                    )
                    .realtime
            })
            .collect();
        if realtime.is_empty() {
            return;
        }

        let mut scoped = event.clone();
        scoped.jobs = realtime;
        let count = scoped.jobs.len();
        match bus.publish(Queue::new(vec![scoped])).await {
            Ok(()) => debug!(event_id = %event.id, jobs = count, "published realtime queue"),
            Err(err) => error!(event_id = %event.id, %err, "realtime publish failed"),
        }
    }

    /// Run every purge policy that is due at `now`, each under its own key.
    pub async fn run_purges(&self, now: DateTime) -> Result<()> {
        for (index, policy) in self.config.purge_policies.iter().enumerate() {
            let interval = match policy.interval.parse::<relay_destination::Interval>() {
                Ok(interval) => interval,
                Err(err) => {
                    error!(index, %err, "unparsable purge interval");
                    continue;
                }
            };

            let due = {
                let marks = self.purge_marks.lock().await;
                match marks.get(&index) {
                    None => true,
                    Some(last) => interval
                        .next_after(*last)
                        .is_some_and(|due_at| due_at <= now),
                }
            };
            if !due {
                continue;
            }

            let key = purge_key(index);
            if !self.try_acquire(&key).await {
                continue;
            }

            let purged = self.store.purge(&policy.query).await;
            self.release(&key).await;

            match purged {
                Ok(count) => {
                    info!(index, events = count, "purge policy applied");
                    self.purge_marks.lock().await.insert(index, now);
                }
                Err(err) => error!(index, %err, "purge policy failed"),
            }
        }

        Ok(())
    }

    /// Semaphore status for one destination action's polling key, surfaced
    /// to operators.
    pub async fn polling_status(
        &self,
        destination: &str,
        action: &str,
    ) -> Result<relay_supervisor::Semaphore> {
        let key = polling_key(destination, action);
        match &self.supervisor {
            Some(supervisor) => Ok(supervisor.status(&key).await?),
            None => Ok(relay_supervisor::Semaphore::not_applicable(key)),
        }
    }

    /// Try to take a key before guarded work. Without a supervisor the
    /// deployment is single-instance and every key is granted. A backend
    /// error fails closed: the work is skipped, never run unguarded.
    async fn try_acquire(&self, key: &str) -> bool {
        let Some(supervisor) = &self.supervisor else {
            return true;
        };

        match supervisor.acquire(key).await {
            Ok(true) => true,
            Ok(false) => {
                info!(key, "semaphore held by another instance, skipping");
                false
            }
            Err(err) => {
                warn!(key, %err, "lock backend unavailable, failing closed");
                false
            }
        }
    }

    /// Release a key, logging instead of failing: release runs on every
    /// exit path and must not mask the work's own result.
    async fn release(&self, key: &str) {
        if let Some(supervisor) = &self.supervisor
            && let Err(err) = supervisor.release(key).await
        {
            warn!(key, %err, "failed to release semaphore key");
        }
    }
}

async fn recv_queue(subscription: &mut Option<Subscription>) -> Option<Queue> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

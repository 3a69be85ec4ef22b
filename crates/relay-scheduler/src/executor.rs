use crate::error::Result;
use crate::resolver::Batch;
use relay_core::{Id, Job, Status, Transition};
use relay_destination::{Action, ActionRef, Then};
use relay_store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Capacity of the outcome channel handed to `load`.
const THEN_CHANNEL_CAPACITY: usize = 16;

/// Terminal result of one job in an executed batch, paired with the cascade
/// list its status selected.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The job that reached a terminal status
    pub job: Job,
    /// The status reached
    pub status: Status,
    /// The error reported with the outcome, if any
    pub error: Option<String>,
    /// Actions to cascade into, selected by the status
    pub cascades: Vec<ActionRef>,
}

/// Drives one batch of due jobs through the destination contract.
///
/// Each job is moved to `executing` before the action's `load` is invoked;
/// the returned stream of `Then` outcomes is interpreted under the retry and
/// discard policy of the batch's schedule. Jobs that never receive an
/// outcome before `load` finishes, or before the load timeout elapses, are
/// marked `unknown`.
pub struct Executor {
    store: Arc<dyn Store>,
    load_timeout: Duration,
}

struct Pending {
    job: Job,
    attempt: u32,
}

impl Executor {
    pub fn new(store: Arc<dyn Store>, load_timeout: Duration) -> Self {
        Self {
            store,
            load_timeout,
        }
    }

    /// Execute the batch with the resolved action and interpret its
    /// outcomes. Exactly one transition is recorded per job per `Then`
    /// received.
    pub async fn execute(&self, batch: &Batch, action: Arc<dyn Action>) -> Result<Vec<Outcome>> {
        let max_retries = batch.schedule.max_retries;
        let states: HashMap<Id, &relay_store::JobState> = batch
            .states
            .iter()
            .map(|state| (state.job.id.clone(), state))
            .collect();

        // Move every job of the batch to executing, bridging through
        // awaiting where the current status requires it.
        let mut pending: HashMap<Id, Pending> = HashMap::new();
        let mut openings: Vec<Transition> = Vec::new();
        for job in batch.queue.jobs() {
            let Some(state) = states.get(&job.id) else {
                continue;
            };

            let (attempt, bridge) = match state.status() {
                Status::Awaiting => (state.attempt(), None),
                Status::Acknowledged => {
                    let attempt = state.attempt();
                    let bridge = Transition::new(
                        job.event_id.clone(),
                        job.id.clone(),
                        attempt,
                        Some(Status::Acknowledged),
                        Status::Awaiting,
                    );
                    (attempt, Some(bridge))
                }
                Status::Failed => {
                    let attempt = state.attempt() + 1;
                    let bridge = Transition::new(
                        job.event_id.clone(),
                        job.id.clone(),
                        attempt,
                        Some(Status::Failed),
                        Status::Awaiting,
                    );
                    (attempt, Some(bridge))
                }
                other => {
                    warn!(job_id = %job.id, status = %other, "job is not schedulable, skipping");
                    continue;
                }
            };

            if let Some(bridge) = bridge {
                openings.push(bridge);
            }
            openings.push(Transition::new(
                job.event_id.clone(),
                job.id.clone(),
                attempt,
                Some(Status::Awaiting),
                Status::Executing,
            ));
            pending.insert(
                job.id.clone(),
                Pending {
                    job: job.clone(),
                    attempt,
                },
            );
        }

        if pending.is_empty() {
            return Ok(Vec::new());
        }
        self.store.add_transitions(&openings).await?;

        debug!(
            destination = %batch.destination,
            action = %batch.action,
            jobs = pending.len(),
            "executing batch"
        );

        let mut outcomes: Vec<Outcome> = Vec::new();

        // Marshal phase: reshape payloads; a marshal failure settles the job
        // under the regular retry rule and excludes it from the load.
        let mut queue = batch.queue.clone();
        for event in &mut queue.events {
            let jobs = std::mem::take(&mut event.jobs);
            let mut kept = Vec::with_capacity(jobs.len());
            for mut job in jobs {
                if !pending.contains_key(&job.id) {
                    continue;
                }
                match action.marshal(event, &job).await {
                    Ok(None) => kept.push(job),
                    Ok(Some(payload)) => {
                        job.context = if payload.context.is_null() {
                            event.context.clone()
                        } else {
                            payload.context
                        };
                        job.data = payload.data;
                        kept.push(job);
                    }
                    Err(err) => {
                        let then =
                            Then::failure(err.to_string()).jobs(vec![job.id.clone()]);
                        self.apply_then(&then, &mut pending, max_retries, &mut outcomes)
                            .await?;
                    }
                }
            }
            event.jobs = kept;
        }
        queue.events.retain(|event| !event.jobs.is_empty());

        if pending.is_empty() {
            return Ok(outcomes);
        }

        // Load phase: consume the outcome stream until every job is settled,
        // the action terminates, or the timeout elapses.
        let (sender, mut receiver) = mpsc::channel::<Then>(THEN_CHANNEL_CAPACITY);
        let load_action = Arc::clone(&action);
        let load_queue = queue;
        let handle =
            tokio::spawn(async move { load_action.load(&load_queue, sender).await });

        let deadline = tokio::time::Instant::now() + self.load_timeout;
        let mut timed_out = false;
        while !pending.is_empty() {
            tokio::select! {
                maybe = receiver.recv() => match maybe {
                    Some(then) => {
                        self.apply_then(&then, &mut pending, max_retries, &mut outcomes)
                            .await?;
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            handle.abort();
            warn!(
                destination = %batch.destination,
                action = %batch.action,
                unresolved = pending.len(),
                "load timed out before reporting every outcome"
            );
            self.mark_unknown(
                &mut pending,
                "No outcome before the load timeout",
                &mut outcomes,
            )
            .await?;
        } else if !pending.is_empty() {
            // The stream closed with jobs unresolved: the load result tells
            // whether this was a batch-wide failure or a loss of tracking.
            match handle.await {
                Ok(Ok(())) => {
                    self.mark_unknown(
                        &mut pending,
                        "Load finished without reporting an outcome",
                        &mut outcomes,
                    )
                    .await?;
                }
                Ok(Err(err)) => {
                    let then = Then::failure(err.to_string());
                    self.apply_then(&then, &mut pending, max_retries, &mut outcomes)
                        .await?;
                }
                Err(join_err) => {
                    error!(%join_err, "load task aborted");
                    self.mark_unknown(
                        &mut pending,
                        "Load aborted before reporting an outcome",
                        &mut outcomes,
                    )
                    .await?;
                }
            }
        }

        Ok(outcomes)
    }

    /// Apply one `Then` to the pending jobs it targets. An invalid outcome
    /// is rejected before anything reaches the store; the rest of the stream
    /// is still processed.
    async fn apply_then(
        &self,
        then: &Then,
        pending: &mut HashMap<Id, Pending>,
        max_retries: u32,
        outcomes: &mut Vec<Outcome>,
    ) -> Result<()> {
        if let Err(err) = then.validate() {
            error!(%err, "rejecting invalid outcome");
            return Ok(());
        }

        let targets: Vec<Id> = if then.jobs.is_empty() {
            pending.keys().cloned().collect()
        } else {
            then.jobs.clone()
        };

        let mut transitions = Vec::new();
        for id in targets {
            let Some(entry) = pending.remove(&id) else {
                warn!(job_id = %id, "outcome for a job not pending in this batch, ignoring");
                continue;
            };

            let status = settle_status(
                entry.attempt,
                max_retries,
                then.error.as_deref(),
                then.force_discard,
            );

            let mut transition = Transition::new(
                entry.job.event_id.clone(),
                id,
                entry.attempt,
                Some(Status::Executing),
                status,
            );
            if let Some(message) = &then.error {
                transition = transition.error(message.clone());
            }
            transitions.push(transition);

            let cascades = match status {
                Status::Succeeded => then.on_succeeded.clone(),
                Status::Failed => then.on_failed.clone(),
                Status::Discarded => then.on_discarded.clone(),
                _ => Vec::new(),
            };
            outcomes.push(Outcome {
                job: entry.job,
                status,
                error: then.error.clone(),
                cascades,
            });
        }

        if !transitions.is_empty() {
            self.store.add_transitions(&transitions).await?;
        }
        Ok(())
    }

    /// Settle every remaining job as `unknown`: tracking is lost, not the
    /// jobs themselves, so this is surfaced prominently.
    async fn mark_unknown(
        &self,
        pending: &mut HashMap<Id, Pending>,
        reason: &str,
        outcomes: &mut Vec<Outcome>,
    ) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }

        let mut transitions = Vec::new();
        for (id, entry) in pending.drain() {
            error!(job_id = %id, reason, "job outcome is unknown, operator intervention required");
            transitions.push(
                Transition::new(
                    entry.job.event_id.clone(),
                    id,
                    entry.attempt,
                    Some(Status::Executing),
                    Status::Unknown,
                )
                .error(reason),
            );
            outcomes.push(Outcome {
                job: entry.job,
                status: Status::Unknown,
                error: Some(reason.to_string()),
                cascades: Vec::new(),
            });
        }

        self.store.add_transitions(&transitions).await?;
        Ok(())
    }
}

/// The retry rule: an error on attempt `n` is `failed` while `n` is within
/// the retry budget, `discarded` once it exceeds it or when the discard is
/// forced.
fn settle_status(
    attempt: u32,
    max_retries: u32,
    error: Option<&str>,
    force_discard: bool,
) -> Status {
    match error {
        None => Status::Succeeded,
        Some(_) if force_discard => Status::Discarded,
        Some(_) if attempt > max_retries => Status::Discarded,
        Some(_) => Status::Failed,
    }
}

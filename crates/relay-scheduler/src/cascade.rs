use crate::error::Result;
use crate::executor::Outcome;
use relay_core::{Job, Status, Transition};
use relay_destination::Registry;
use relay_store::Store;
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns terminal outcomes into new jobs on any destination.
///
/// For every job that reached a terminal status, the cascade list selected
/// by that status yields one new job per listed action, attached as a child
/// of the terminal job and scoped to the same event. New jobs re-enter the
/// pipeline exactly like originally ingested ones.
pub struct Dispatcher {
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
    max_depth: usize,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, registry: Arc<Registry>, max_depth: usize) -> Self {
        Self {
            store,
            registry,
            max_depth,
        }
    }

    /// Create and persist the cascade jobs for a batch of outcomes. The
    /// returned jobs are acknowledged and awaiting, ready for scheduling.
    pub async fn dispatch(&self, outcomes: &[Outcome]) -> Result<Vec<Job>> {
        let mut created: Vec<Job> = Vec::new();

        for outcome in outcomes {
            if outcome.cascades.is_empty() {
                continue;
            }

            let chain = self.ancestry(&outcome.job).await?;
            if chain.len() >= self.max_depth {
                warn!(
                    job_id = %outcome.job.id,
                    depth = chain.len(),
                    "cascade chain too deep, dropping its entries"
                );
                continue;
            }

            for target in &outcome.cascades {
                let pair = (target.destination.clone(), target.action.clone());
                if chain.contains(&pair) {
                    warn!(
                        job_id = %outcome.job.id,
                        target = %target,
                        "cascade cycle detected, dropping the entry"
                    );
                    continue;
                }

                if self
                    .registry
                    .resolve(&target.destination, &target.action)
                    .is_none()
                {
                    warn!(
                        job_id = %outcome.job.id,
                        target = %target,
                        "cascade targets an unregistered action, dropping the entry"
                    );
                    continue;
                }

                created.push(Job::child_of(
                    &outcome.job,
                    &target.destination,
                    &target.action,
                ));
            }
        }

        if created.is_empty() {
            return Ok(created);
        }

        self.store.add_jobs(&created).await?;

        let mut transitions = Vec::with_capacity(created.len() * 2);
        for job in &created {
            transitions.push(Transition::acknowledge(job.event_id.clone(), job.id.clone()));
            transitions.push(Transition::new(
                job.event_id.clone(),
                job.id.clone(),
                1,
                Some(Status::Acknowledged),
                Status::Awaiting,
            ));
        }
        self.store.add_transitions(&transitions).await?;

        debug!(jobs = created.len(), "dispatched cascade jobs");
        Ok(created)
    }

    /// The chain of (destination, action) pairs from the job up to the root
    /// of its cascade tree, the job's own pair first.
    async fn ancestry(&self, job: &Job) -> Result<Vec<(String, String)>> {
        let mut chain = vec![(job.destination.clone(), job.action.clone())];
        let mut cursor = job.parent_job_id.clone();

        while let Some(id) = cursor {
            if chain.len() > self.max_depth {
                break;
            }
            let Some(parent) = self.store.find_job(&id).await? else {
                warn!(job_id = %id, "cascade parent not found, truncating the chain");
                break;
            };
            chain.push((parent.destination.clone(), parent.action.clone()));
            cursor = parent.parent_job_id;
        }

        Ok(chain)
    }
}

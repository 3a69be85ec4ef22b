use crate::error::{Result, SchedulerError};
use relay_destination::{Interval, Schedule};
use relay_store::EventQuery;
use std::time::Duration;

/// Configuration of one scheduler instance.
///
/// Defaults are applied and checked once by [`SchedulerConfig::validate`] at
/// construction time; the running scheduler never falls back silently.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Name of the instance, recorded as semaphore holder metadata
    ///
    /// Example: "relay-scheduler"
    pub name: String,
    /// Address of the instance, recorded as semaphore holder metadata
    pub address: String,
    /// How often the polled path looks for due jobs
    pub poll_interval: Duration,
    /// Platform-default schedule applied when neither the action nor the
    /// destination defines one
    pub default_schedule: Schedule,
    /// How long one `load` invocation may take to report its outcomes
    /// before unresolved jobs are marked `unknown`
    pub load_timeout: Duration,
    /// Upper bound on the length of a cascade ancestry chain
    pub max_cascade_depth: usize,
    /// Purge policies run by this instance at their own intervals
    pub purge_policies: Vec<PurgePolicy>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "relay-scheduler".to_string(),
            address: ":9091".to_string(),
            poll_interval: Duration::from_secs(60),
            default_schedule: Schedule::default(),
            load_timeout: Duration::from_secs(60),
            max_cascade_depth: 32,
            purge_policies: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    /// Validate the configuration. Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SchedulerError::config("Instance name must not be empty"));
        }
        if self.poll_interval.is_zero() {
            return Err(SchedulerError::config("Poll interval must not be zero"));
        }
        if self.load_timeout.is_zero() {
            return Err(SchedulerError::config("Load timeout must not be zero"));
        }
        if self.max_cascade_depth == 0 {
            return Err(SchedulerError::config(
                "Max cascade depth must be at least 1",
            ));
        }

        self.default_schedule
            .parse_interval()
            .map_err(|err| SchedulerError::config(format!("Default schedule: {err}")))?;

        for (index, policy) in self.purge_policies.iter().enumerate() {
            policy.interval.parse::<Interval>().map_err(|err| {
                SchedulerError::config(format!("Purge policy {index}: {err}"))
            })?;
        }

        Ok(())
    }
}

/// A policy purging the store at an interval, scoped by constraints.
///
/// Offset, limit, and pagination are not applied to the purge query.
#[derive(Debug, Clone, PartialEq)]
pub struct PurgePolicy {
    /// Constraints selecting the events to purge, with their jobs and
    /// transitions
    pub query: EventQuery,
    /// Interval or CRON expression at which the policy runs
    pub interval: String,
}

impl PurgePolicy {
    pub fn new(query: EventQuery, interval: impl Into<String>) -> Self {
        Self {
            query,
            interval: interval.into(),
        }
    }
}

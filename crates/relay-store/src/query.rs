use derive_setters::Setters;
use relay_core::{DateTime, Id, Status};
use serde::{Deserialize, Serialize};

/// Constraints applied to events when looking for entries in the store.
///
/// `in`/`not_in` slices are inclusion and exclusion filters; an empty slice
/// means the filter is not applied. Nested job constraints restrict the
/// events to those owning at least one matching job, and restrict the jobs
/// returned alongside them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct EventQuery {
    /// Keep entries whose source is any of these
    pub sources_in: Vec<String>,
    /// Drop entries whose source is any of these
    pub sources_not_in: Vec<String>,
    /// Keep entries whose trigger is any of these
    pub triggers_in: Vec<String>,
    /// Drop entries whose trigger is any of these
    pub triggers_not_in: Vec<String>,
    /// Keep entries whose version is any of these
    pub versions_in: Vec<String>,
    /// Drop entries whose version is any of these
    pub versions_not_in: Vec<String>,
    /// Keep entries received before this instant
    pub received_before: Option<DateTime>,
    /// Keep entries received after this instant
    pub received_after: Option<DateTime>,
    /// Additional constraints on the events' jobs
    pub jobs: Option<JobQuery>,
    /// Number of entries to skip
    pub offset: u64,
    /// Maximum number of entries to return. Zero lets the store apply its
    /// default limit.
    pub limit: u64,
}

/// Constraints applied to jobs when looking for entries in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct JobQuery {
    /// Keep jobs belonging to this event only. When set, other event-side
    /// constraints are not applied.
    pub event_id: Option<Id>,
    /// Keep jobs with any of these ids
    pub ids_in: Vec<Id>,
    /// Keep jobs targeting any of these destinations
    pub destinations_in: Vec<String>,
    /// Drop jobs targeting any of these destinations
    pub destinations_not_in: Vec<String>,
    /// Keep jobs executing any of these actions
    pub actions_in: Vec<String>,
    /// Drop jobs executing any of these actions
    pub actions_not_in: Vec<String>,
    /// Keep jobs with any of these versions
    pub versions_in: Vec<String>,
    /// Drop jobs with any of these versions
    pub versions_not_in: Vec<String>,
    /// Keep jobs created before this instant
    pub created_before: Option<DateTime>,
    /// Keep jobs created after this instant
    pub created_after: Option<DateTime>,
    /// Additional constraints on the jobs' current transition
    pub transitions: Option<TransitionQuery>,
    /// Number of entries to skip
    pub offset: u64,
    /// Maximum number of entries to return. Zero lets the store apply its
    /// default limit.
    pub limit: u64,
}

/// Constraints applied to transitions when looking for entries in the store.
///
/// When nested under a [`JobQuery`], the status and attempt constraints apply
/// to the job's latest transition, i.e. its current status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Setters)]
#[setters(strip_option, into)]
pub struct TransitionQuery {
    /// Keep transitions belonging to this job only. When set, other
    /// constraints are not applied.
    pub job_id: Option<Id>,
    /// Keep transitions with any of these statuses
    pub status_in: Vec<Status>,
    /// Drop transitions with any of these statuses
    pub status_not_in: Vec<Status>,
    /// Keep transitions with at least this attempt number
    pub min_attempts: Option<u32>,
    /// Keep transitions with at most this attempt number
    pub max_attempts: Option<u32>,
    /// Number of entries to skip
    pub offset: u64,
    /// Maximum number of entries to return. Zero lets the store apply its
    /// default limit.
    pub limit: u64,
}

/// Information about a query's result returned by the store.
///
/// The store can clamp or default some constraints (such as a maximum
/// limit); the `where_applied` field reports the constraints actually used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta<Q> {
    /// Number of entries matching the constraints, without the limit
    pub count: u64,
    /// Pagination details based on the count, offset, and limit
    pub pagination: Pagination,
    /// Constraints actually applied to the query
    pub where_applied: Q,
}

impl<Q> Meta<Q> {
    /// Build the meta for a query result from the applied offset and limit
    pub fn new(count: u64, offset: u64, limit: u64, where_applied: Q) -> Self {
        Self {
            count,
            pagination: Pagination::build(count, offset, limit),
            where_applied,
        }
    }
}

/// Pagination details computed from a count, offset, and limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// The current page
    pub current: u64,
    /// The previous page, if any
    pub previous: Option<u64>,
    /// The next page, if any
    pub next: Option<u64>,
    /// The first page, always 1
    pub first: u64,
    /// The last page
    pub last: u64,
}

impl Pagination {
    /// Compute pagination from the entry count and the applied offset/limit.
    /// A zero limit yields a single page.
    pub fn build(count: u64, offset: u64, limit: u64) -> Self {
        if limit == 0 {
            return Self {
                current: 1,
                previous: None,
                next: None,
                first: 1,
                last: 1,
            };
        }

        let current = offset / limit + 1;
        let last = (count.div_ceil(limit)).max(1);
        let previous = (current > 1).then(|| current - 1);
        let next = (current < last).then(|| current + 1);

        Self {
            current,
            previous,
            next,
            first: 1,
            last,
        }
    }
}

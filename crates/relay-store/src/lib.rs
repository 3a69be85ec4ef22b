//! # Relay Store
//!
//! Abstract persistence boundary for the Relay platform. The store keeps the
//! durable, append-only record of what must run and what happened: events,
//! their jobs, and the jobs' transitions.
//!
//! ## Key Components
//!
//! - **Store**: the persistence trait (insert, find, purge)
//! - **Queries**: inclusion/exclusion constraints with pagination meta
//! - **Queue**: a batch of events and jobs handed to executions and the bus
//! - **MemoryStore**: in-process reference implementation
//!
//! Rows are immutable after insert, so the store is safe for concurrent
//! writers; the only destructive operation is a scoped purge removing whole
//! events with their descendants.

pub mod memory;
pub mod query;
pub mod queue;
pub mod traits;

pub use memory::MemoryStore;
pub use query::{EventQuery, JobQuery, Meta, Pagination, TransitionQuery};
pub use queue::{JobState, Queue};
pub use traits::Store;

pub use relay_core::{Error, Result};

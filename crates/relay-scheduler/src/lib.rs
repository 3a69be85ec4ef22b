//! # Relay Scheduler
//!
//! The execution engine of the Relay platform. The scheduler drives jobs
//! through their state machine: it resolves which jobs are due, executes
//! them in per-action batches through the destination contract, interprets
//! outcomes with retry and discard policy, and dispatches cascades into new
//! jobs.
//!
//! Multiple scheduler instances can run concurrently against the same store:
//! polling cycles are guarded by the supervisor semaphore, while realtime
//! work is delivered to a single subscribing instance by the bus.
//!
//! ## Key Components
//!
//! - **Scheduler**: the run loops (polled and realtime), ingestion entry
//!   point, purge policies, graceful shutdown
//! - **Resolver**: computes due jobs and groups them into batches
//! - **Executor**: the `marshal` → `load` → `Then` protocol for one batch
//! - **Dispatcher**: turns outcomes into cascade jobs, with loop detection

pub mod cascade;
pub mod config;
pub mod error;
pub mod executor;
pub mod resolver;
pub mod scheduler;

pub use cascade::Dispatcher;
pub use config::{PurgePolicy, SchedulerConfig};
pub use error::{Result, SchedulerError};
pub use executor::{Executor, Outcome};
pub use resolver::{Batch, Resolver};
pub use scheduler::{CycleReport, Scheduler};

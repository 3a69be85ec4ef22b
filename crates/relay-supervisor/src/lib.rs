//! # Relay Supervisor
//!
//! Cross-instance mutual exclusion for the Relay platform. The supervisor
//! keeps two cooperating instances from firing the same cron/CDC trigger or
//! running the same scheduled polling cycle concurrently.
//!
//! Only scheduled (non-realtime) work needs a semaphore: HTTP-triggered and
//! subscription-delivered work is inherently handled by a single receiving
//! instance. Callers are expected to fail closed when the lock backend
//! errors, skipping the cycle instead of running unguarded.

pub mod keys;
pub mod memory;
pub mod semaphore;
pub mod traits;

pub use keys::{polling_key, purge_key, trigger_key};
pub use memory::MemorySupervisor;
pub use semaphore::{Identity, Semaphore};
pub use traits::Supervisor;

pub use relay_core::{Error, Result};

//! # Relay PubSub
//!
//! Realtime delivery boundary for the Relay platform. When a destination
//! action resolves to a realtime schedule, freshly acknowledged jobs are
//! published on the bus and executed by the subscribing scheduler instance
//! instead of waiting for the next polling cycle.
//!
//! When no bus is configured the platform still works: realtime schedules
//! degrade to the polled path at their resolved interval.

pub mod memory;
pub mod traits;

pub use memory::MemoryPubSub;
pub use traits::{PubSub, Subscription};

pub use relay_core::{Error, Result};

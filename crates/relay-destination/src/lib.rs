//! # Relay Destination
//!
//! Destination-side contracts for the Relay platform: the schedule policy
//! deciding when jobs run, the action protocol an execution drives
//! (`marshal` then `load`, interpreting the returned `Then`), and the
//! registry wiring destinations in at configuration time.
//!
//! Destinations and their actions are plain trait implementations injected
//! through the [`Registry`] — there is no runtime adapter loading.

pub mod action;
pub mod destination;
pub mod registry;
pub mod schedule;

pub use action::{Action, ActionRef, Payload, Then, ThenSender};
pub use destination::Destination;
pub use registry::Registry;
pub use schedule::{Interval, Schedule};

pub use relay_core::{Error, Result};

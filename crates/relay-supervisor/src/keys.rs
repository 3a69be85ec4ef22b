//! Semaphore key naming.
//!
//! Keys are namespaced by the kind of guarded work so that a polling cycle,
//! a source trigger, and a purge policy never contend with each other.

/// Key guarding a scheduled polling cycle for one destination action
pub fn polling_key(destination: &str, action: &str) -> String {
    format!("scheduler/{destination}/{action}")
}

/// Key guarding a cron/CDC source trigger
pub fn trigger_key(source: &str, trigger: &str) -> String {
    format!("trigger/{source}/{trigger}")
}

/// Key guarding one purge policy, by position in the configuration
pub fn purge_key(index: usize) -> String {
    format!("purge/{index}")
}

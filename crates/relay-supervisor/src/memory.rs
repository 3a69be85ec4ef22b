use crate::semaphore::{Identity, Semaphore};
use crate::traits::Supervisor;
use async_trait::async_trait;
use relay_core::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// In-process supervisor implementation.
///
/// Useful for single-process deployments and tests. Keys are exclusive even
/// for their current holder: acquiring a held key returns false until it is
/// released.
pub struct MemorySupervisor {
    identity: Identity,
    held: RwLock<HashMap<String, Identity>>,
}

impl MemorySupervisor {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            held: RwLock::new(HashMap::new()),
        }
    }

    /// Identity recorded as holder metadata for acquired keys
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

#[async_trait]
impl Supervisor for MemorySupervisor {
    fn name(&self) -> &str {
        "memory"
    }

    async fn acquire(&self, key: &str) -> Result<bool> {
        let mut held = self.held.write().await;

        if held.contains_key(key) {
            return Ok(false);
        }

        held.insert(key.to_string(), self.identity.clone());
        debug!(key, "acquired semaphore key");
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<bool> {
        let mut held = self.held.write().await;
        let released = held.remove(key).is_some();
        if released {
            debug!(key, "released semaphore key");
        }
        Ok(released)
    }

    async fn status(&self, key: &str) -> Result<Semaphore> {
        let held = self.held.read().await;
        Ok(match held.get(key) {
            Some(holder) => Semaphore::held_by(key, holder),
            None => Semaphore::free(key),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn create_test_supervisor() -> MemorySupervisor {
        MemorySupervisor::new(Identity::new("relay-scheduler", ":9091"))
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let fixture = create_test_supervisor();

        assert!(fixture.acquire("scheduler/warehouse/insert").await.unwrap());
        assert!(!fixture.acquire("scheduler/warehouse/insert").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_frees_the_key() {
        let fixture = create_test_supervisor();

        fixture.acquire("scheduler/warehouse/insert").await.unwrap();
        assert!(fixture.release("scheduler/warehouse/insert").await.unwrap());
        assert!(fixture.acquire("scheduler/warehouse/insert").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_unheld_key() {
        let fixture = create_test_supervisor();
        let actual = fixture.release("scheduler/warehouse/insert").await.unwrap();
        assert!(!actual);
    }

    #[tokio::test]
    async fn test_status_reports_holder() {
        let fixture = create_test_supervisor();

        let free = fixture.status("scheduler/warehouse/insert").await.unwrap();
        assert_eq!(free.is_acquired, Some(false));

        fixture.acquire("scheduler/warehouse/insert").await.unwrap();
        let held = fixture.status("scheduler/warehouse/insert").await.unwrap();
        assert_eq!(held.is_acquired, Some(true));
        assert_eq!(held.acquirer_name, "relay-scheduler");
        assert_eq!(held.session_id, fixture.identity().session_id.to_string());
    }
}

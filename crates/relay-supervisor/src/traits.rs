use crate::semaphore::Semaphore;
use async_trait::async_trait;
use relay_core::Result;

/// Distributed semaphore boundary.
///
/// Acquisition is advisory and best-effort: a `false` grant means another
/// instance holds the key and the caller must skip the guarded work. An
/// `Err` means the backend could not be reached; callers fail closed on it.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// String representation of the supervisor implementation.
    ///
    /// Example: "memory"
    fn name(&self) -> &str;

    /// Try to acquire a key. Returns true when the key was granted.
    async fn acquire(&self, key: &str) -> Result<bool>;

    /// Release a key. Returns true when the key was released by this call.
    async fn release(&self, key: &str) -> Result<bool>;

    /// Report the semaphore status for a key.
    async fn status(&self, key: &str) -> Result<Semaphore>;
}

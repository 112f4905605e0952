//! Named, TTL-bounded mutual-exclusion leases.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::DispatchResult;
use crate::ids::{HolderId, PoolId};
use crate::persistence::PersistenceStore;

/// Outcome of a [`with_lease`] call: either the protected work ran to
/// completion, or the lease could not be acquired after retries — a
/// recoverable condition the caller treats as "try again later", never as
/// an error.
pub enum LeaseOutcome<T> {
    Completed(T),
    Unavailable,
}

/// A lease handle whose `Drop` releases the underlying lease on every path,
/// including an unwinding panic inside the protected closure. The normal
/// path releases explicitly and eagerly via [`LeaseGuard::release`]; `Drop`
/// is the safety net, firing a best-effort, fire-and-forget release task
/// only if that explicit release never happened.
struct LeaseGuard {
    store: Arc<dyn PersistenceStore>,
    pool_id: PoolId,
    holder: HolderId,
    released: Arc<AtomicBool>,
}

impl LeaseGuard {
    fn new(store: Arc<dyn PersistenceStore>, pool_id: PoolId, holder: HolderId) -> Self {
        Self {
            store,
            pool_id,
            holder,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn release(&self) -> DispatchResult<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.store.release_lease(&self.pool_id, &self.holder).await
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(pool_id = %self.pool_id, holder = %self.holder, "lease guard dropped without explicit release, scheduling best-effort cleanup");
        let store = self.store.clone();
        let pool_id = self.pool_id.clone();
        let holder = self.holder.clone();
        tokio::spawn(async move {
            let _ = store.release_lease(&pool_id, &holder).await;
        });
    }
}

/// Retry lease acquisition up to `max_retries` times with linearly
/// increasing delay `retry_delay * attempt`, run `f` while holding the
/// lease, and guarantee release on every path.
pub async fn with_lease<F, Fut, T>(
    store: Arc<dyn PersistenceStore>,
    pool_id: &PoolId,
    holder: &HolderId,
    ttl: Duration,
    max_retries: u32,
    retry_delay: Duration,
    f: F,
) -> DispatchResult<LeaseOutcome<T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = DispatchResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match store.acquire_lease(pool_id, holder, ttl).await? {
            Some(_lease) => {
                debug!(pool_id = %pool_id, holder = %holder, attempt, "acquired pool lease");
                let guard = LeaseGuard::new(store.clone(), pool_id.clone(), holder.clone());
                let result = f().await;
                guard.release().await?;
                return result.map(LeaseOutcome::Completed);
            }
            None => {
                attempt += 1;
                if attempt > max_retries {
                    warn!(pool_id = %pool_id, holder = %holder, "lease unavailable after retries exhausted");
                    return Ok(LeaseOutcome::Unavailable);
                }
                tokio::time::sleep(retry_delay * attempt).await;
            }
        }
    }
}

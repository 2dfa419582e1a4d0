//! Per-motion single-writer locks.
//!
//! Casting and closing hold the lock of their motion for the whole
//! check-and-mutate; different motions never contend. An entry lives only
//! while someone holds or waits on it, whatever the outcome of the write.

use crate::domain::DomainError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type LockMap = Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>;

pub struct MotionLocks {
    locks: LockMap,
    /// `None` waits without limit.
    timeout: Option<Duration>,
}

/// Exclusive access to one motion. Dropping it releases the lock and prunes
/// the registry entry when nobody else is waiting.
pub struct MotionGuard {
    motion_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
}

impl Drop for MotionGuard {
    fn drop(&mut self) {
        // Our Arc must be gone before the count check.
        drop(self.guard.take());
        prune(&self.locks, self.motion_id);
    }
}

/// Remove the entry of `motion_id` if the registry holds the only reference.
/// Handles are cloned under the same map lock, so a waiter always keeps it.
fn prune(locks: &LockMap, motion_id: i64) {
    let mut map = locks.lock().unwrap_or_else(|e| e.into_inner());
    if map
        .get(&motion_id)
        .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
        map.remove(&motion_id);
    }
}

impl MotionLocks {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    fn handle(&self, motion_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(motion_id).or_default())
    }

    /// Wait for exclusive access to `motion_id`. Fails with `Busy` when the
    /// timeout elapses first; nothing is held in that case.
    pub async fn acquire(&self, motion_id: i64) -> Result<MotionGuard, DomainError> {
        let lock = self.handle(motion_id);
        let guard = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, lock.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    prune(&self.locks, motion_id);
                    debug!(motion_id, timeout_ms = limit.as_millis() as u64, "motion lock timed out");
                    return Err(DomainError::Busy(motion_id));
                }
            },
            None => lock.lock_owned().await,
        };
        Ok(MotionGuard {
            motion_id,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        })
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MotionLocks {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_motion_is_exclusive() {
        let locks = MotionLocks::new(Some(Duration::from_millis(20)));
        let guard = locks.acquire(1).await.unwrap();
        assert!(matches!(locks.acquire(1).await, Err(DomainError::Busy(1))));
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.acquire(1).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_motions_do_not_contend() {
        let locks = MotionLocks::new(Some(Duration::from_millis(20)));
        let _a = locks.acquire(1).await.unwrap();
        assert!(locks.acquire(2).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_prunes_entry() {
        let locks = MotionLocks::default();
        for id in 0..100 {
            let guard = locks.acquire(id).await.unwrap();
            assert_eq!(locks.len(), 1);
            drop(guard);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_until_done() {
        let locks = Arc::new(MotionLocks::default());
        let guard = locks.acquire(5).await.unwrap();

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire(5).await.unwrap();
            })
        };
        tokio::task::yield_now().await;
        drop(guard);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_waiter_leaves_nothing() {
        let locks = MotionLocks::new(Some(Duration::from_millis(10)));
        let guard = locks.acquire(3).await.unwrap();
        assert!(locks.acquire(3).await.is_err());
        drop(guard);
        assert!(locks.is_empty());
    }
}

//! Per-key async mutexes with a bounded wait.
//!
//! Stands in for `SELECT … FOR UPDATE` with `lock_timeout` in the
//! in-memory adapters: writers to the same key queue up, writers to
//! different keys never touch each other. An entry is dropped from the
//! map once its last holder and waiter are gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::foundation::DomainError;

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Default)]
pub struct KeyedLocks {
    locks: LockMap,
}

/// Held lock on one key. Releasing it prunes the key when nobody else
/// holds or waits for it.
#[derive(Debug)]
pub struct KeyedLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    locks: LockMap,
}

impl Drop for KeyedLockGuard {
    fn drop(&mut self) {
        // Release first so the map holds the only remaining reference.
        drop(self.guard.take());
        prune(&self.locks, &self.key);
    }
}

fn prune(locks: &LockMap, key: &str) {
    let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
    if locks
        .get(key)
        .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
        locks.remove(key);
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for the lock on `key`.
    ///
    /// # Errors
    ///
    /// `Conflict` if the lock is still held when the wait expires.
    pub async fn acquire(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<KeyedLockGuard, DomainError> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };

        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(KeyedLockGuard {
                guard: Some(guard),
                key: key.to_string(),
                locks: Arc::clone(&self.locks),
            }),
            Err(_) => {
                prune(&self.locks, key);
                tracing::warn!(key, wait_ms = timeout.as_millis() as u64, "Row lock wait exceeded");
                Err(DomainError::conflict(format!("lock wait exceeded for {}", key)))
            }
        }
    }

    /// Keys currently held or waited on.
    pub fn tracked_keys(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

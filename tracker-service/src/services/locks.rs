//! Per-key async mutual exclusion.
//!
//! Serializes the read-then-insert sequence of concurrent hits on the same
//! `open_id`, so two simultaneous first opens cannot both see an empty
//! history. Different ids never contend.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of the critical section. Dropping it releases the
/// key and removes the map entry once nobody else is waiting on it.
pub struct KeyGuard {
    key: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_default()
            .value()
            .clone();

        let guard = mutex.lock_owned().await;

        KeyGuard {
            key: key.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently locked or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release the mutex first so its Arc count reflects only the map and
        // any waiters.
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

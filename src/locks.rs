//! Per-key async mutexes. A key's entry is removed as soon as nobody holds or
//! waits on it, so the map only holds keys with work in flight.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

pub(crate) struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Slot>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    /// Wait for exclusive access to `key`; released when the guard drops.
    pub(crate) async fn lock(&self, key: &K) -> KeyedGuard<'_, K> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let guard = slot.lock_owned().await;
        KeyedGuard {
            locks: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, key: &K) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // the map's own Arc is the last one: no holder, no waiter
        if slots.get(key).is_some_and(|s| Arc::strong_count(s) == 1) {
            slots.remove(key);
        }
    }
}

pub(crate) struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    locks: &'a KeyedLocks<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn idle_keys_are_dropped() {
        let locks = KeyedLocks::default();
        for owner in ["a", "b", "c"] {
            let _g = locks.lock(&owner.to_string()).await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn waiter_keeps_the_entry_alive() {
        let locks = Arc::new(KeyedLocks::default());
        let key = "owner".to_string();
        let first = locks.lock(&key).await;

        let waiter = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _g = locks.lock(&key).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        // the waiter still references the slot
        assert!(locks.len() <= 1);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }
}

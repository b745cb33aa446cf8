use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use endorse_core::HistoryKey;

/// A per-key mutex plus the number of callers holding or awaiting it.
#[derive(Debug, Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    users: usize,
}

/// One async mutex per [`HistoryKey`], created on demand.
///
/// Entries are removed when the last holder or waiter goes away, including
/// waiters whose future is dropped before acquiring, so the table only grows
/// with the number of keys being mutated at the same moment.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<HistoryKey, Slot>>,
}

/// Held for the duration of a read-modify-write on one key.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyedLocks,
    key: HistoryKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &HistoryKey) -> KeyGuard<'_> {
        let mutex = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = slots.entry(key.clone()).or_default();
            slot.users += 1;
            Arc::clone(&slot.mutex)
        };
        // Built before waiting: if this future is dropped mid-wait, the
        // guard's Drop still releases the claim.
        let mut handle = KeyGuard {
            locks: self,
            key: key.clone(),
            guard: None,
        };
        handle.guard = Some(mutex.lock_owned().await);
        handle
    }

    /// Number of keys currently locked or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = self
            .locks
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

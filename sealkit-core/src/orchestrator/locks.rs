use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

static SHARED: LazyLock<KeyLocks> = LazyLock::new(KeyLocks::default);

/// Per-key-name locks serializing enrollment and unlock flows.
///
/// All flows for one key name MUST be serialized, including the
/// read-modify-write of the sealed record. Flows for different key names
/// run independently. Clones share the same lock table, and
/// [`KeyLocks::shared`] is the table every orchestrator uses by default.
#[derive(Debug, Clone, Default)]
pub struct KeyLocks {
    table: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

/// Held for the duration of one flow. Releases the key name on drop.
#[derive(Debug)]
pub struct KeyLockGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyLocks {
    /// Creates an empty lock table, independent of [`KeyLocks::shared`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide lock table.
    #[must_use]
    pub fn shared() -> Self {
        SHARED.clone()
    }

    /// Waits until no other flow holds `key_name`, then holds it.
    pub async fn lock(&self, key_name: &str) -> KeyLockGuard {
        let mutex = {
            // The table only maps names to mutexes, so a poisoned table is
            // still consistent.
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(key_name.to_string()).or_default())
        };
        KeyLockGuard {
            _guard: mutex.lock_owned().await,
        }
    }

    /// Holds `key_name` if it is free right now.
    #[must_use]
    pub fn try_lock(&self, key_name: &str) -> Option<KeyLockGuard> {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(key_name.to_string()).or_default())
        };
        mutex
            .try_lock_owned()
            .ok()
            .map(|guard| KeyLockGuard { _guard: guard })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_same_name_is_exclusive() {
        let locks = KeyLocks::new();
        let held = locks.lock("app_key").await;
        assert!(locks.try_lock("app_key").is_none());
        assert!(locks.try_lock("other_key").is_some());

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("app_key").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .expect("join");
        assert!(locks.try_lock("app_key").is_some());
    }

    #[tokio::test]
    async fn test_shared_table_is_process_wide() {
        let held = KeyLocks::shared().lock("shared_table_key").await;
        assert!(KeyLocks::shared().try_lock("shared_table_key").is_none());
        assert!(KeyLocks::new().try_lock("shared_table_key").is_some());
        drop(held);
        assert!(KeyLocks::shared().try_lock("shared_table_key").is_some());
    }
}

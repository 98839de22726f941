use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::KeyValueStore;
use crate::error::{SealError, SealResult};

type Namespaces = HashMap<String, HashMap<String, String>>;

/// In-memory [`KeyValueStore`] for tests and short-lived hosts.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    namespaces: Mutex<Namespaces>,
}

impl MemoryKeyValueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SealResult<MutexGuard<'_, Namespaces>> {
        self.namespaces
            .lock()
            .map_err(|_| SealError::Persistence("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, namespace: &str, key: &str) -> SealResult<Option<String>> {
        Ok(self
            .lock()?
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn set(&self, namespace: &str, key: &str, value: &str) -> SealResult<()> {
        self.lock()?
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, namespace: &str, key: &str) -> SealResult<()> {
        if let Some(entries) = self.lock()?.get_mut(namespace) {
            entries.remove(key);
        }
        Ok(())
    }

    fn clear_all(&self, namespace: &str) -> SealResult<()> {
        self.lock()?.remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_are_isolated() {
        let store = MemoryKeyValueStore::new();
        store.set("a", "k", "1").expect("set");
        store.set("b", "k", "2").expect("set");

        store.clear_all("a").expect("clear");
        assert_eq!(store.get("a", "k").expect("get"), None);
        assert_eq!(store.get("b", "k").expect("get").as_deref(), Some("2"));

        store.remove("b", "k").expect("remove");
        store.remove("b", "missing").expect("remove missing");
        assert_eq!(store.get("b", "k").expect("get"), None);
    }
}

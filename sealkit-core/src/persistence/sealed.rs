use std::sync::Arc;

use super::KeyValueStore;
use crate::codec::SealedRecord;
use crate::error::SealResult;

/// Stores [`SealedRecord`]s as JSON text in one namespace.
#[derive(Clone)]
pub struct SealedSecretStore {
    kv: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl SealedSecretStore {
    /// Creates a store writing into `namespace` of `kv`.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            kv,
            namespace: namespace.into(),
        }
    }

    /// The namespace records are written to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Loads the record under `store_key`. Absent means `None`.
    ///
    /// # Errors
    ///
    /// - [`SealError::CorruptRecord`](crate::SealError::CorruptRecord) if the
    ///   stored text does not parse.
    /// - [`SealError::Persistence`](crate::SealError::Persistence) if the
    ///   store cannot be read.
    pub fn load(&self, store_key: &str) -> SealResult<Option<SealedRecord>> {
        self.kv
            .get(&self.namespace, store_key)?
            .map(|json| SealedRecord::from_json(&json))
            .transpose()
    }

    /// Writes `record` under `store_key`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, store_key: &str, record: &SealedRecord) -> SealResult<()> {
        let json = record.to_json()?;
        self.kv.set(&self.namespace, store_key, &json)?;
        tracing::debug!(namespace = %self.namespace, store_key, "saved sealed record");
        Ok(())
    }

    /// Removes the record under `store_key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn clear(&self, store_key: &str) -> SealResult<()> {
        self.kv.remove(&self.namespace, store_key)
    }
}

impl std::fmt::Debug for SealedSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedSecretStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SealError;
    use crate::persistence::MemoryKeyValueStore;

    fn store() -> (Arc<MemoryKeyValueStore>, SealedSecretStore) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let store = SealedSecretStore::new(kv.clone(), "biometricPrefs");
        (kv, store)
    }

    fn record(fill: u8) -> SealedRecord {
        SealedRecord {
            ciphertext: vec![fill; 23],
            nonce: vec![fill; 12],
        }
    }

    #[test]
    fn test_save_is_idempotent_and_overwrites() {
        let (_, store) = store();
        assert_eq!(store.load("cipherTextWrapper").expect("load"), None);

        store.save("cipherTextWrapper", &record(1)).expect("save");
        store.save("cipherTextWrapper", &record(1)).expect("save again");
        assert_eq!(store.load("cipherTextWrapper").expect("load"), Some(record(1)));

        store.save("cipherTextWrapper", &record(2)).expect("overwrite");
        assert_eq!(store.load("cipherTextWrapper").expect("load"), Some(record(2)));

        store.clear("cipherTextWrapper").expect("clear");
        assert_eq!(store.load("cipherTextWrapper").expect("load"), None);
    }

    #[test]
    fn test_unparseable_record_is_corrupt() {
        let (kv, store) = store();
        kv.set("biometricPrefs", "cipherTextWrapper", "{\"cipherText\":")
            .expect("set");
        assert!(matches!(
            store.load("cipherTextWrapper"),
            Err(SealError::CorruptRecord(_))
        ));
    }
}

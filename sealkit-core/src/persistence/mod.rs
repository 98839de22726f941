//! Durable storage for the sealed record and the app's session preferences.
//!
//! Everything lives in a namespaced string key-value store, the shape of
//! Android `SharedPreferences` and iOS `UserDefaults`.

mod file;
mod memory;
mod sealed;
mod session;

pub use file::FileKeyValueStore;
pub use memory::MemoryKeyValueStore;
pub use sealed::SealedSecretStore;
pub use session::SessionPreferences;

use crate::error::SealResult;

/// Namespaced string key-value store supplied by the platform.
pub trait KeyValueStore: Send + Sync {
    /// Reads `key` from `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::Persistence`](crate::SealError::Persistence) if
    /// the store cannot be read.
    fn get(&self, namespace: &str, key: &str) -> SealResult<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::Persistence`](crate::SealError::Persistence) if
    /// the write fails.
    fn set(&self, namespace: &str, key: &str, value: &str) -> SealResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::Persistence`](crate::SealError::Persistence) if
    /// the write fails.
    fn remove(&self, namespace: &str, key: &str) -> SealResult<()>;

    /// Removes every key in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::Persistence`](crate::SealError::Persistence) if
    /// the write fails.
    fn clear_all(&self, namespace: &str) -> SealResult<()>;
}

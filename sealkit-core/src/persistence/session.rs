use std::sync::Arc;

use super::KeyValueStore;
use crate::codec::SessionToken;
use crate::defaults;
use crate::error::SealResult;

/// Typed access to the login state that shares the sealed record's
/// namespace: username, cleartext session token and the biometric flag.
#[derive(Clone)]
pub struct SessionPreferences {
    kv: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl SessionPreferences {
    /// Creates a view over `namespace` of `kv`.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            kv,
            namespace: namespace.into(),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn username(&self) -> SealResult<Option<String>> {
        self.kv.get(&self.namespace, defaults::USERNAME)
    }

    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_username(&self, username: &str) -> SealResult<()> {
        self.kv.set(&self.namespace, defaults::USERNAME, username)
    }

    /// The token stored by the password login path.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn token(&self) -> SealResult<Option<SessionToken>> {
        Ok(self
            .kv
            .get(&self.namespace, defaults::TOKEN)?
            .map(SessionToken::new))
    }

    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_token(&self, token: &SessionToken) -> SealResult<()> {
        self.kv.set(&self.namespace, defaults::TOKEN, token.expose())
    }

    /// Whether the user turned biometric login on. Missing or unparseable
    /// values read as `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn is_biometric_enabled(&self) -> SealResult<bool> {
        Ok(self
            .kv
            .get(&self.namespace, defaults::IS_BIOMETRIC_ENABLED)?
            .is_some_and(|value| value == "true"))
    }

    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_biometric_enabled(&self, enabled: bool) -> SealResult<()> {
        self.kv.set(
            &self.namespace,
            defaults::IS_BIOMETRIC_ENABLED,
            if enabled { "true" } else { "false" },
        )
    }

    /// Removes every value in the namespace, the sealed record included.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn logout(&self) -> SealResult<()> {
        self.kv.clear_all(&self.namespace)
    }
}

impl std::fmt::Debug for SessionPreferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPreferences")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryKeyValueStore;

    #[test]
    fn test_login_state_and_logout() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let prefs = SessionPreferences::new(kv.clone(), defaults::PREFS_NAMESPACE);
        assert!(!prefs.is_biometric_enabled().expect("flag"));

        prefs.set_username("alice").expect("username");
        prefs.set_token(&SessionToken::new("tok-123")).expect("token");
        prefs.set_biometric_enabled(true).expect("flag");
        kv.set(defaults::PREFS_NAMESPACE, defaults::CIPHER_TEXT_WRAPPER, "{}")
            .expect("record");

        assert_eq!(prefs.username().expect("username").as_deref(), Some("alice"));
        assert_eq!(prefs.token().expect("token"), Some(SessionToken::new("tok-123")));
        assert!(prefs.is_biometric_enabled().expect("flag"));

        prefs.logout().expect("logout");
        assert_eq!(prefs.username().expect("username"), None);
        assert_eq!(prefs.token().expect("token"), None);
        assert!(!prefs.is_biometric_enabled().expect("flag"));
        assert_eq!(
            kv.get(defaults::PREFS_NAMESPACE, defaults::CIPHER_TEXT_WRAPPER)
                .expect("get"),
            None
        );
    }
}

//! Single-use cipher operations bound to one key.
//!
//! A [`CipherOperation`] is built right before an authentication attempt,
//! authorized by the gate when the user authenticates, and consumed by
//! exactly one [`CipherOperation::process`] call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{SealError, SealResult};
use crate::keystore::{Authorization, KeyStatus, SecretKeyHandle, SecureKeyStore};

/// Direction of a cipher operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[strum(serialize_all = "lowercase")]
pub enum CipherMode {
    /// Encrypt a fresh payload.
    Seal,
    /// Decrypt a previously sealed payload.
    Unseal,
}

enum OperationState {
    Pending,
    Authorized(Authorization),
    Consumed,
}

/// Builds cipher operations over a keystore.
#[derive(Clone)]
pub struct CipherSession {
    keystore: Arc<dyn SecureKeyStore>,
}

impl CipherSession {
    /// Creates a session over `keystore`.
    #[must_use]
    pub fn new(keystore: Arc<dyn SecureKeyStore>) -> Self {
        Self { keystore }
    }

    /// Returns the keystore the session operates on.
    #[must_use]
    pub fn keystore(&self) -> &Arc<dyn SecureKeyStore> {
        &self.keystore
    }

    /// Builds a seal-mode operation for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::KeyInvalidated`] if the key can no longer be used.
    pub fn for_seal(&self, key: &SecretKeyHandle) -> SealResult<CipherOperation> {
        self.ensure_usable(key)?;
        Ok(CipherOperation::new(
            Arc::clone(&self.keystore),
            key.clone(),
            CipherMode::Seal,
            None,
        ))
    }

    /// Builds an unseal-mode operation for `key` pinned to `nonce`.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::KeyInvalidated`] if the key can no longer be used,
    /// or [`SealError::InvalidNonceLength`] if `nonce` does not have the length
    /// the key's primitive requires.
    pub fn for_unseal(&self, key: &SecretKeyHandle, nonce: &[u8]) -> SealResult<CipherOperation> {
        self.ensure_usable(key)?;
        let expected = self.keystore.nonce_len(key)?;
        if nonce.len() != expected {
            return Err(SealError::InvalidNonceLength {
                expected,
                actual: nonce.len(),
            });
        }
        Ok(CipherOperation::new(
            Arc::clone(&self.keystore),
            key.clone(),
            CipherMode::Unseal,
            Some(nonce.to_vec()),
        ))
    }

    fn ensure_usable(&self, key: &SecretKeyHandle) -> SealResult<()> {
        match self.keystore.key_status(key)? {
            KeyStatus::Valid => Ok(()),
            KeyStatus::Invalidated | KeyStatus::Missing => Err(SealError::KeyInvalidated {
                key_name: key.name().to_string(),
            }),
        }
    }
}

/// Transient encryption or decryption context for one key and one mode.
pub struct CipherOperation {
    keystore: Arc<dyn SecureKeyStore>,
    key: SecretKeyHandle,
    mode: CipherMode,
    nonce: Option<Vec<u8>>,
    state: OperationState,
}

impl CipherOperation {
    fn new(
        keystore: Arc<dyn SecureKeyStore>,
        key: SecretKeyHandle,
        mode: CipherMode,
        nonce: Option<Vec<u8>>,
    ) -> Self {
        Self {
            keystore,
            key,
            mode,
            nonce,
            state: OperationState::Pending,
        }
    }

    /// The operation's direction.
    #[must_use]
    pub const fn mode(&self) -> CipherMode {
        self.mode
    }

    /// The key the operation is bound to.
    #[must_use]
    pub const fn key(&self) -> &SecretKeyHandle {
        &self.key
    }

    /// For unseal operations, the pinned nonce. For seal operations, the
    /// nonce generated by the primitive once [`Self::process`] succeeded.
    #[must_use]
    pub fn captured_nonce(&self) -> Option<&[u8]> {
        self.nonce.as_deref()
    }

    /// Whether the operation has been authorized and not yet consumed.
    #[must_use]
    pub const fn is_authorized(&self) -> bool {
        matches!(self.state, OperationState::Authorized(_))
    }

    /// Whether the operation has not yet been presented for authentication.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.state, OperationState::Pending)
    }

    pub(crate) fn authorize(&mut self, authorization: Authorization) -> SealResult<()> {
        match self.state {
            OperationState::Pending => {
                self.state = OperationState::Authorized(authorization);
                Ok(())
            }
            OperationState::Authorized(_) | OperationState::Consumed => {
                Err(SealError::OperationConsumed)
            }
        }
    }

    /// Runs the transform once. Seal mode encrypts `input`; unseal mode
    /// decrypts and verifies it.
    ///
    /// The operation is consumed whether or not the transform succeeds.
    ///
    /// # Errors
    ///
    /// - [`SealError::NotAuthenticated`] if the operation was never authorized.
    /// - [`SealError::OperationConsumed`] if it was already processed.
    /// - Transform errors from the keystore, e.g. [`SealError::IntegrityCheckFailed`].
    pub fn process(&mut self, input: &[u8]) -> SealResult<Vec<u8>> {
        let authorization = match std::mem::replace(&mut self.state, OperationState::Consumed) {
            OperationState::Authorized(authorization) => authorization,
            OperationState::Pending => {
                self.state = OperationState::Pending;
                return Err(SealError::NotAuthenticated);
            }
            OperationState::Consumed => return Err(SealError::OperationConsumed),
        };

        match self.mode {
            CipherMode::Seal => {
                let output = self.keystore.seal(&self.key, authorization, input)?;
                self.nonce = Some(output.nonce);
                Ok(output.ciphertext)
            }
            CipherMode::Unseal => {
                let nonce = self.nonce.as_deref().ok_or(SealError::NotAuthenticated)?;
                self.keystore.open(&self.key, authorization, nonce, input)
            }
        }
    }
}

impl std::fmt::Debug for CipherOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            OperationState::Pending => "pending",
            OperationState::Authorized(_) => "authorized",
            OperationState::Consumed => "consumed",
        };
        f.debug_struct("CipherOperation")
            .field("key", &self.key)
            .field("mode", &self.mode)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::SoftwareKeystore;

    fn session() -> (CipherSession, SecretKeyHandle) {
        let keystore = Arc::new(SoftwareKeystore::in_memory());
        let key = keystore.get_or_create_key("app_key").expect("create key");
        (CipherSession::new(keystore), key)
    }

    #[test]
    fn test_process_requires_authorization() {
        let (session, key) = session();
        let mut op = session.for_seal(&key).expect("for seal");
        assert!(matches!(op.process(b"x"), Err(SealError::NotAuthenticated)));
        // An unauthorized attempt does not burn the operation.
        assert!(op.is_pending());
    }

    #[test]
    fn test_operation_is_single_use() {
        let (session, key) = session();
        let mut op = session.for_seal(&key).expect("for seal");
        op.authorize(Authorization::granted()).expect("authorize");
        assert!(op.captured_nonce().is_none());
        op.process(b"tok-123").expect("first process");
        assert_eq!(op.captured_nonce().map(<[u8]>::len), Some(12));
        assert!(matches!(
            op.process(b"tok-123"),
            Err(SealError::OperationConsumed)
        ));
        assert!(matches!(
            op.authorize(Authorization::granted()),
            Err(SealError::OperationConsumed)
        ));
    }

    #[test]
    fn test_unseal_rejects_wrong_nonce_length() {
        let (session, key) = session();
        match session.for_unseal(&key, &[0u8; 16]) {
            Err(SealError::InvalidNonceLength { expected, actual }) => {
                assert_eq!(expected, 12);
                assert_eq!(actual, 16);
            }
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("expected error"),
        }
    }

    #[test]
    fn test_invalidated_key_is_distinct_error() {
        let keystore = Arc::new(SoftwareKeystore::in_memory());
        let key = keystore.get_or_create_key("app_key").expect("create key");
        keystore.notify_enrollment_changed().expect("notify");
        let session = CipherSession::new(keystore);

        assert!(matches!(
            session.for_seal(&key),
            Err(SealError::KeyInvalidated { .. })
        ));
        assert!(matches!(
            session.for_unseal(&key, &[0u8; 12]),
            Err(SealError::KeyInvalidated { .. })
        ));
    }

    #[test]
    fn test_unseal_with_different_nonce_fails() {
        let (session, key) = session();
        let mut seal = session.for_seal(&key).expect("for seal");
        seal.authorize(Authorization::granted()).expect("authorize");
        let ciphertext = seal.process(b"tok-123").expect("seal");

        let mut unseal = session.for_unseal(&key, &[0u8; 12]).expect("for unseal");
        unseal.authorize(Authorization::granted()).expect("authorize");
        assert!(matches!(
            unseal.process(&ciphertext),
            Err(SealError::IntegrityCheckFailed)
        ));
    }
}

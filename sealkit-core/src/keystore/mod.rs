//! Custody of the device-bound symmetric key.
//!
//! The key never leaves the keystore: callers hold an opaque
//! [`SecretKeyHandle`] and ask the store to run the AEAD transform on their
//! behalf. Every use requires an [`Authorization`], which only the
//! authentication gate can mint after a successful prompt.
//!
//! Platform implementations:
//! - Android: Android Keystore, AES/GCM/NoPadding, `setUserAuthenticationRequired(true)`,
//!   `setInvalidatedByBiometricEnrollment(true)`
//! - iOS: Secure Enclave wrapped key with `biometryCurrentSet` access control
//! - Desktop / tests: [`SoftwareKeystore`]

mod envelope;
mod software;

pub use software::SoftwareKeystore;

use serde::{Deserialize, Serialize};

use crate::error::SealResult;

/// Size of every generated key, in bytes (256-bit).
pub const KEY_SIZE: usize = 32;

/// AEAD primitive a key is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum KeyAlgorithm {
    /// AES-256 in GCM mode with a 128-bit tag. 12-byte nonce.
    #[default]
    Aes256Gcm,
    /// XChaCha20-Poly1305 with a 128-bit tag. 24-byte nonce.
    XChaCha20Poly1305,
}

/// Generation parameters of a key.
///
/// Keys are always usable for both sealing and unsealing, with an
/// authenticated mode and no padding, and require a fresh authentication
/// event before each use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct KeyPolicy {
    /// Primitive the key material is bound to.
    pub algorithm: KeyAlgorithm,
    /// Destroy the key when the user enrolls a new biometric credential.
    pub invalidated_by_enrollment: bool,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        Self {
            algorithm: KeyAlgorithm::Aes256Gcm,
            invalidated_by_enrollment: true,
        }
    }
}

/// Opaque reference to a key that lives inside a [`SecureKeyStore`].
///
/// A handle carries no key material, so it is safe to clone and log. It is
/// intentionally not serializable.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKeyHandle {
    name: String,
    generation: u64,
}

impl SecretKeyHandle {
    /// Creates a handle for the key `name` as issued at `generation`.
    ///
    /// Keystore implementations call this; the generation lets them detect
    /// handles that outlived the key they were issued for.
    #[must_use]
    pub fn new(name: impl Into<String>, generation: u64) -> Self {
        Self {
            name: name.into(),
            generation,
        }
    }

    /// The keystore alias.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The key generation this handle was issued for.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

impl std::fmt::Debug for SecretKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKeyHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Whether a handle can still be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// The key exists and its authentication requirement can be satisfied.
    Valid,
    /// The key (or the handle's generation of it) was invalidated by the platform.
    Invalidated,
    /// No key with that name exists.
    Missing,
}

/// Proof of exactly one successful authentication event.
///
/// Only the authentication gate creates these. Keystores receive them by
/// value, so each proof authorizes a single key use.
#[derive(Debug)]
pub struct Authorization {
    _private: (),
}

impl Authorization {
    pub(crate) const fn granted() -> Self {
        Self { _private: () }
    }
}

/// Result of a seal transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealOutput {
    /// Ciphertext including the authentication tag.
    pub ciphertext: Vec<u8>,
    /// Nonce generated by the primitive for this seal.
    pub nonce: Vec<u8>,
}

/// Device keystore interface used to create keys and run AEAD transforms.
pub trait SecureKeyStore: Send + Sync {
    /// Returns the key named `name`, generating it with [`KeyPolicy::default`]
    /// when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::KeyStoreUnavailable`](crate::SealError::KeyStoreUnavailable)
    /// if the keystore cannot be loaded.
    fn get_or_create_key(&self, name: &str) -> SealResult<SecretKeyHandle> {
        self.get_or_create_key_with_policy(name, KeyPolicy::default())
    }

    /// Returns the key named `name`, generating it with `policy` when it
    /// does not exist yet. The policy of an existing key is not changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore is unavailable or generation fails.
    fn get_or_create_key_with_policy(
        &self,
        name: &str,
        policy: KeyPolicy,
    ) -> SealResult<SecretKeyHandle>;

    /// Returns the key named `name` if it exists, without generating one.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore is unavailable.
    fn find_key(&self, name: &str) -> SealResult<Option<SecretKeyHandle>>;

    /// Reports whether `key` is still usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore is unavailable.
    fn key_status(&self, key: &SecretKeyHandle) -> SealResult<KeyStatus>;

    /// Nonce length in bytes required by the key's primitive.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not exist or the keystore is unavailable.
    fn nonce_len(&self, key: &SecretKeyHandle) -> SealResult<usize>;

    /// Encrypts `plaintext` under `key` with a fresh nonce.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalidated or the primitive rejects the input.
    fn seal(
        &self,
        key: &SecretKeyHandle,
        authorization: Authorization,
        plaintext: &[u8],
    ) -> SealResult<SealOutput>;

    /// Decrypts and verifies `ciphertext` under `key` and `nonce`.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::IntegrityCheckFailed`](crate::SealError::IntegrityCheckFailed)
    /// if the authentication tag does not verify.
    fn open(
        &self,
        key: &SecretKeyHandle,
        authorization: Authorization,
        nonce: &[u8],
        ciphertext: &[u8],
    ) -> SealResult<Vec<u8>>;

    /// Deletes the key named `name`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore is unavailable.
    fn delete_key(&self, name: &str) -> SealResult<()>;
}

/// Associated data bound into records sealed under `key_name`.
pub(crate) fn associated_data(key_name: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(crate::defaults::SEALED_SECRET_AD.len() + key_name.len());
    aad.extend_from_slice(crate::defaults::SEALED_SECRET_AD);
    aad.extend_from_slice(key_name.as_bytes());
    aad
}

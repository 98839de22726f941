//! Software implementation of [`SecureKeyStore`].
//!
//! **FOR DEVELOPMENT AND TESTING**: key material lives in process memory
//! (optionally mirrored to a file), not in secure hardware. It models the
//! platform behavior the rest of the crate relies on: keys are created on
//! first use, every use consumes an [`Authorization`], and changing the
//! enrolled biometrics permanently invalidates keys generated with
//! `invalidated_by_enrollment`.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, Payload};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::XChaCha20Poly1305;
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use super::envelope::{KeystoreEnvelope, PersistedKey};
use super::{
    associated_data, Authorization, KeyAlgorithm, KeyPolicy, KeyStatus, SealOutput,
    SecretKeyHandle, SecureKeyStore, KEY_SIZE,
};
use crate::error::{SealError, SealResult};
use crate::utils::write_atomic;

struct StoredKey {
    policy: KeyPolicy,
    generation: u64,
    invalidated: bool,
    material: Zeroizing<[u8; KEY_SIZE]>,
}

#[derive(Default)]
struct KeystoreState {
    next_generation: u64,
    keys: HashMap<String, StoredKey>,
}

/// Process-local keystore with the same key lifecycle as a hardware keystore.
pub struct SoftwareKeystore {
    state: Mutex<KeystoreState>,
    path: Option<PathBuf>,
    available: AtomicBool,
}

impl SoftwareKeystore {
    /// Creates an empty keystore that lives only as long as the value.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(KeystoreState::default()),
            path: None,
            available: AtomicBool::new(true),
        }
    }

    /// Opens a keystore persisted at `path`, creating it on first write.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::KeyStoreUnavailable`] if the file exists but cannot
    /// be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> SealResult<Self> {
        let path = path.into();
        let state = match fs::read(&path) {
            Ok(bytes) => {
                let bytes = Zeroizing::new(bytes);
                load_state(KeystoreEnvelope::deserialize(&bytes)?)?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => KeystoreState::default(),
            Err(err) => {
                return Err(SealError::KeyStoreUnavailable(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };
        tracing::debug!(path = %path.display(), keys = state.keys.len(), "opened software keystore");
        Ok(Self {
            state: Mutex::new(state),
            path: Some(path),
            available: AtomicBool::new(true),
        })
    }

    /// Makes every subsequent call fail with [`SealError::KeyStoreUnavailable`]
    /// while `available` is `false`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Signals that the user enrolled a new biometric credential.
    ///
    /// Every key generated with `invalidated_by_enrollment` becomes
    /// permanently unusable until it is deleted and generated again.
    /// Returns the number of keys invalidated.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore is unavailable or cannot be persisted.
    pub fn notify_enrollment_changed(&self) -> SealResult<usize> {
        let mut state = self.lock()?;
        let mut invalidated = 0;
        for key in state.keys.values_mut() {
            if key.policy.invalidated_by_enrollment && !key.invalidated {
                key.invalidated = true;
                invalidated += 1;
            }
        }
        self.persist(&state)?;
        tracing::warn!(invalidated, "biometric enrollment changed; keys invalidated");
        Ok(invalidated)
    }

    /// Reports the state of the key named `name` without creating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore is unavailable.
    pub fn status_of(&self, name: &str) -> SealResult<KeyStatus> {
        let state = self.lock()?;
        Ok(match state.keys.get(name) {
            None => KeyStatus::Missing,
            Some(stored) if stored.invalidated => KeyStatus::Invalidated,
            Some(_) => KeyStatus::Valid,
        })
    }

    fn lock(&self) -> SealResult<MutexGuard<'_, KeystoreState>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SealError::KeyStoreUnavailable(
                "keystore is not loaded".to_string(),
            ));
        }
        self.state
            .lock()
            .map_err(|_| SealError::KeyStoreUnavailable("mutex poisoned".to_string()))
    }

    fn persist(&self, state: &KeystoreState) -> SealResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let keys = state
            .keys
            .iter()
            .map(|(name, key)| PersistedKey {
                name: name.clone(),
                policy: key.policy,
                generation: key.generation,
                invalidated: key.invalidated,
                material: Zeroizing::new(key.material.to_vec()),
            })
            .collect();
        let bytes = KeystoreEnvelope::new(state.next_generation, keys).serialize()?;
        write_atomic(path, &bytes)
            .map_err(|err| SealError::KeyStoreUnavailable(format!("failed to persist: {err}")))
    }
}

impl Default for SoftwareKeystore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for SoftwareKeystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareKeystore")
            .field("path", &self.path)
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

/// Looks up the key behind `handle`, failing unless it is still valid.
fn usable_key<'a>(state: &'a KeystoreState, handle: &SecretKeyHandle) -> SealResult<&'a StoredKey> {
    match state.keys.get(handle.name()) {
        Some(key) if key.generation == handle.generation() && !key.invalidated => Ok(key),
        _ => Err(SealError::KeyInvalidated {
            key_name: handle.name().to_string(),
        }),
    }
}

impl SecureKeyStore for SoftwareKeystore {
    fn get_or_create_key_with_policy(
        &self,
        name: &str,
        policy: KeyPolicy,
    ) -> SealResult<SecretKeyHandle> {
        let mut state = self.lock()?;
        if let Some(key) = state.keys.get(name) {
            return Ok(SecretKeyHandle::new(name, key.generation));
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        let mut material = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut *material);
        state.keys.insert(
            name.to_string(),
            StoredKey {
                policy,
                generation,
                invalidated: false,
                material,
            },
        );
        self.persist(&state)?;
        tracing::info!(key_name = name, algorithm = %policy.algorithm, "generated key");
        Ok(SecretKeyHandle::new(name, generation))
    }

    fn find_key(&self, name: &str) -> SealResult<Option<SecretKeyHandle>> {
        let state = self.lock()?;
        Ok(state
            .keys
            .get(name)
            .map(|key| SecretKeyHandle::new(name, key.generation)))
    }

    fn key_status(&self, key: &SecretKeyHandle) -> SealResult<KeyStatus> {
        let state = self.lock()?;
        Ok(match state.keys.get(key.name()) {
            None => KeyStatus::Missing,
            Some(stored) if stored.generation != key.generation() || stored.invalidated => {
                KeyStatus::Invalidated
            }
            Some(_) => KeyStatus::Valid,
        })
    }

    fn nonce_len(&self, key: &SecretKeyHandle) -> SealResult<usize> {
        let state = self.lock()?;
        let stored = usable_key(&state, key)?;
        Ok(nonce_size(stored.policy.algorithm))
    }

    fn seal(
        &self,
        key: &SecretKeyHandle,
        _authorization: Authorization,
        plaintext: &[u8],
    ) -> SealResult<SealOutput> {
        let state = self.lock()?;
        let stored = usable_key(&state, key)?;
        let aad = associated_data(key.name());
        match stored.policy.algorithm {
            KeyAlgorithm::Aes256Gcm => seal_with::<Aes256Gcm>(&*stored.material, &aad, plaintext),
            KeyAlgorithm::XChaCha20Poly1305 => {
                seal_with::<XChaCha20Poly1305>(&*stored.material, &aad, plaintext)
            }
        }
    }

    fn open(
        &self,
        key: &SecretKeyHandle,
        _authorization: Authorization,
        nonce: &[u8],
        ciphertext: &[u8],
    ) -> SealResult<Vec<u8>> {
        let state = self.lock()?;
        let stored = usable_key(&state, key)?;
        let aad = associated_data(key.name());
        match stored.policy.algorithm {
            KeyAlgorithm::Aes256Gcm => {
                open_with::<Aes256Gcm>(&*stored.material, &aad, nonce, ciphertext)
            }
            KeyAlgorithm::XChaCha20Poly1305 => {
                open_with::<XChaCha20Poly1305>(&*stored.material, &aad, nonce, ciphertext)
            }
        }
    }

    fn delete_key(&self, name: &str) -> SealResult<()> {
        let mut state = self.lock()?;
        if state.keys.remove(name).is_some() {
            self.persist(&state)?;
            tracing::info!(key_name = name, "deleted key");
        }
        Ok(())
    }
}

fn load_state(envelope: KeystoreEnvelope) -> SealResult<KeystoreState> {
    let mut keys = HashMap::with_capacity(envelope.keys.len());
    for persisted in envelope.keys {
        if persisted.material.len() != KEY_SIZE {
            return Err(SealError::KeyStoreUnavailable(format!(
                "key `{}` length mismatch: expected {KEY_SIZE}, got {}",
                persisted.name,
                persisted.material.len()
            )));
        }
        let mut material = Zeroizing::new([0u8; KEY_SIZE]);
        material.copy_from_slice(&persisted.material);
        keys.insert(
            persisted.name,
            StoredKey {
                policy: persisted.policy,
                generation: persisted.generation,
                invalidated: persisted.invalidated,
                material,
            },
        );
    }
    Ok(KeystoreState {
        next_generation: envelope.next_generation,
        keys,
    })
}

const fn nonce_size(algorithm: KeyAlgorithm) -> usize {
    match algorithm {
        KeyAlgorithm::Aes256Gcm => <Aes256Gcm as AeadCore>::NonceSize::USIZE,
        KeyAlgorithm::XChaCha20Poly1305 => <XChaCha20Poly1305 as AeadCore>::NonceSize::USIZE,
    }
}

fn seal_with<C>(material: &[u8], aad: &[u8], plaintext: &[u8]) -> SealResult<SealOutput>
where
    C: KeyInit + Aead + AeadCore,
{
    let cipher = C::new_from_slice(material)
        .map_err(|_| SealError::EncryptionFailed("invalid key length".to_string()))?;
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| SealError::EncryptionFailed("AEAD encryption failed".to_string()))?;
    Ok(SealOutput {
        ciphertext,
        nonce: nonce.to_vec(),
    })
}

fn open_with<C>(material: &[u8], aad: &[u8], nonce: &[u8], ciphertext: &[u8]) -> SealResult<Vec<u8>>
where
    C: KeyInit + Aead + AeadCore,
{
    let expected = <C as AeadCore>::NonceSize::USIZE;
    if nonce.len() != expected {
        return Err(SealError::InvalidNonceLength {
            expected,
            actual: nonce.len(),
        });
    }
    let cipher = C::new_from_slice(material).map_err(|_| SealError::IntegrityCheckFailed)?;
    cipher
        .decrypt(
            aes_gcm::aead::Nonce::<C>::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| SealError::IntegrityCheckFailed)
}

//! Enrollment and unlock flows.
//!
//! ```text
//! start ─┬─ NoCapability
//!        ├─ NeedsEnrollment ── enroll ── authenticate ── seal ── Enrolled
//!        └─ ReadyToUnlock ──── unlock ── authenticate ── unseal ─ Unlocked
//!                                           └─ Failed { reason, bucket }
//! ```
//!
//! Retries are driven by the caller: every call builds a fresh cipher
//! operation, and there is no retry limit.

mod locks;

pub use locks::{KeyLockGuard, KeyLocks};

use std::sync::Arc;

use crate::capability::{BiometricCapability, CapabilityProbe};
use crate::cipher::{CipherOperation, CipherSession};
use crate::codec::{self, SealedRecord, SessionToken};
use crate::config::SealConfig;
use crate::error::{SealError, SealResult};
use crate::gate::{
    AuthenticationGate, AuthenticationOutcome, CancelSignal, ErrorBucket, ErrorCode,
    PromptPresenter,
};
use crate::keystore::SecureKeyStore;
use crate::persistence::{KeyValueStore, SealedSecretStore, SessionPreferences};

/// Why the user has to enroll (again) before unlocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EnrollmentReason {
    /// No sealed record is stored.
    NoRecord,
    /// The stored record did not parse and was removed.
    CorruptRecord,
    /// The key was invalidated by a biometric enrollment change.
    KeyInvalidated,
    /// The stored nonce does not fit the key's primitive.
    InvalidNonce,
}

/// Where a flow can go from the start screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartState {
    /// The device cannot run the biometric flow.
    NoCapability(BiometricCapability),
    /// The user must enroll before unlocking.
    NeedsEnrollment(EnrollmentReason),
    /// A record is stored and can be unsealed.
    ReadyToUnlock(SealedRecord),
}

/// Why an attempt failed without changing the stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The biometric was not recognized.
    Rejected,
    /// The prompt ended with a platform error or was canceled.
    Prompt(ErrorCode),
    /// The record did not verify under the key.
    IntegrityCheckFailed,
    /// The keystore could not be loaded.
    KeyStoreUnavailable,
}

/// Terminal state of one flow.
#[derive(Debug, PartialEq, Eq)]
pub enum FlowState {
    /// The device cannot run the biometric flow.
    NoCapability(BiometricCapability),
    /// The user must enroll first. Any stale record was removed.
    NeedsEnrollment(EnrollmentReason),
    /// The token was sealed and saved.
    Enrolled,
    /// The token was unsealed.
    Unlocked(SessionToken),
    /// The attempt failed. `bucket` tells the caller whether to offer a
    /// retry or its own fallback.
    Failed {
        /// What went wrong.
        reason: FailureReason,
        /// Caller policy.
        bucket: ErrorBucket,
    },
}

/// Drives enrollment (seal a token) and unlock (unseal it) through the
/// authentication gate.
pub struct EnrollmentOrchestrator<P> {
    config: SealConfig,
    keystore: Arc<dyn SecureKeyStore>,
    session: CipherSession,
    gate: AuthenticationGate<P>,
    records: SealedSecretStore,
    preferences: SessionPreferences,
    capability: Arc<dyn CapabilityProbe>,
    locks: KeyLocks,
}

impl<P: PromptPresenter> EnrollmentOrchestrator<P> {
    /// Wires the flow over its collaborators. Flows are serialized per key
    /// name through [`KeyLocks::shared`], so orchestrators built over the
    /// same keystore never run concurrently on one key.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`SealConfig::validate`].
    pub fn new(
        config: SealConfig,
        keystore: Arc<dyn SecureKeyStore>,
        kv: Arc<dyn KeyValueStore>,
        capability: Arc<dyn CapabilityProbe>,
        presenter: P,
    ) -> SealResult<Self> {
        config.validate()?;
        Ok(Self {
            session: CipherSession::new(Arc::clone(&keystore)),
            records: SealedSecretStore::new(Arc::clone(&kv), config.namespace.clone()),
            preferences: SessionPreferences::new(kv, config.namespace.clone()),
            gate: AuthenticationGate::new(presenter),
            keystore,
            capability,
            config,
            locks: KeyLocks::shared(),
        })
    }

    /// Replaces the process-wide lock table with `locks`, for hosts that run
    /// several independent keystores in one process.
    #[must_use]
    pub fn with_locks(mut self, locks: KeyLocks) -> Self {
        self.locks = locks;
        self
    }

    /// The flow configuration.
    #[must_use]
    pub const fn config(&self) -> &SealConfig {
        &self.config
    }

    /// Login state sharing the record's namespace.
    #[must_use]
    pub const fn preferences(&self) -> &SessionPreferences {
        &self.preferences
    }

    /// The gate's presenter.
    #[must_use]
    pub const fn presenter(&self) -> &P {
        self.gate.presenter()
    }

    /// Decides between unlock and enrollment. A stored record that does not
    /// parse is removed and reported as [`EnrollmentReason::CorruptRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`SealError::Persistence`] if the store cannot be accessed.
    pub fn start(&self) -> SealResult<StartState> {
        let capability = self.capability.capability();
        if !capability.is_available() {
            tracing::debug!(%capability, "biometric flow unavailable");
            return Ok(StartState::NoCapability(capability));
        }

        match self.records.load(&self.config.record_field) {
            Ok(Some(record)) => Ok(StartState::ReadyToUnlock(record)),
            Ok(None) => Ok(StartState::NeedsEnrollment(EnrollmentReason::NoRecord)),
            Err(SealError::CorruptRecord(detail)) => {
                tracing::warn!(%detail, "stored sealed record is corrupt; removing it");
                self.records.clear(&self.config.record_field)?;
                Ok(StartState::NeedsEnrollment(EnrollmentReason::CorruptRecord))
            }
            Err(err) => Err(err),
        }
    }

    /// Authenticates the user and unseals the stored token.
    ///
    /// A key invalidated by an enrollment change, or a record whose nonce
    /// does not fit the key, removes the record and yields
    /// [`FlowState::NeedsEnrollment`].
    ///
    /// # Errors
    ///
    /// Returns persistence errors and contract violations
    /// ([`SealError::is_contract_violation`]).
    pub async fn unlock(&self, cancel: &CancelSignal) -> SealResult<FlowState> {
        let _lock = self.locks.lock(&self.config.key_name).await;
        let record = match self.start()? {
            StartState::NoCapability(capability) => return Ok(FlowState::NoCapability(capability)),
            StartState::NeedsEnrollment(reason) => return Ok(FlowState::NeedsEnrollment(reason)),
            StartState::ReadyToUnlock(record) => record,
        };

        let operation = match self.unseal_operation(&record) {
            Ok(operation) => operation,
            Err(err) => return self.recover(err),
        };
        let outcome = self
            .gate
            .authenticate(operation, &self.config.prompt, cancel)
            .await?;
        let operation = match outcome {
            AuthenticationOutcome::Success(operation) => operation,
            other => return Ok(failed(other)),
        };

        match codec::unseal(&record, operation) {
            Ok(token) => {
                tracing::info!(key_name = %self.config.key_name, "unlocked sealed token");
                Ok(FlowState::Unlocked(token))
            }
            Err(err) => self.recover(err),
        }
    }

    /// Authenticates the user, seals `token` and saves the record.
    ///
    /// A stale key left behind by an enrollment change is deleted and
    /// generated again once before sealing. If the key is invalidated after
    /// the prompt, nothing is saved and the result is
    /// [`FlowState::NeedsEnrollment`].
    ///
    /// # Errors
    ///
    /// Returns persistence errors and contract violations
    /// ([`SealError::is_contract_violation`]).
    pub async fn enroll(&self, token: &SessionToken, cancel: &CancelSignal) -> SealResult<FlowState> {
        let _lock = self.locks.lock(&self.config.key_name).await;
        let capability = self.capability.capability();
        if !capability.is_available() {
            return Ok(FlowState::NoCapability(capability));
        }

        let operation = match self.seal_operation() {
            Ok(operation) => operation,
            Err(SealError::KeyStoreUnavailable(detail)) => {
                tracing::warn!(%detail, "keystore unavailable during enrollment");
                return Ok(keystore_unavailable());
            }
            Err(err) => return Err(err),
        };
        let outcome = self
            .gate
            .authenticate(operation, &self.config.prompt, cancel)
            .await?;
        let operation = match outcome {
            AuthenticationOutcome::Success(operation) => operation,
            other => return Ok(failed(other)),
        };

        // The key can be invalidated while the prompt is up.
        let record = match codec::seal(token.expose(), operation) {
            Ok(record) => record,
            Err(err) => return self.recover(err),
        };
        self.records.save(&self.config.record_field, &record)?;
        self.preferences.set_biometric_enabled(true)?;
        tracing::info!(key_name = %self.config.key_name, "enrolled sealed token");
        Ok(FlowState::Enrolled)
    }

    /// Turns biometric login off: removes the sealed record and clears the
    /// enabled flag. The key is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn disable(&self) -> SealResult<()> {
        let _lock = self.locks.lock(&self.config.key_name).await;
        self.records.clear(&self.config.record_field)?;
        self.preferences.set_biometric_enabled(false)?;
        tracing::info!(key_name = %self.config.key_name, "biometric login disabled");
        Ok(())
    }

    /// Clears the whole namespace: username, token, flag and sealed record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn logout(&self) -> SealResult<()> {
        let _lock = self.locks.lock(&self.config.key_name).await;
        self.preferences.logout()?;
        tracing::info!(namespace = %self.config.namespace, "logged out");
        Ok(())
    }

    fn seal_operation(&self) -> SealResult<CipherOperation> {
        let name = &self.config.key_name;
        let key = self.keystore.get_or_create_key(name)?;
        match self.session.for_seal(&key) {
            Err(SealError::KeyInvalidated { .. }) => {
                tracing::warn!(key_name = %name, "replacing invalidated key before enrollment");
                self.keystore.delete_key(name)?;
                let key = self.keystore.get_or_create_key(name)?;
                self.session.for_seal(&key)
            }
            other => other,
        }
    }

    /// A missing key can never open the stored record, so it is reported as
    /// invalidated instead of generating a fresh one.
    fn unseal_operation(&self, record: &SealedRecord) -> SealResult<CipherOperation> {
        let name = &self.config.key_name;
        let Some(key) = self.keystore.find_key(name)? else {
            tracing::warn!(key_name = %name, "sealing key is missing");
            return Err(SealError::KeyInvalidated {
                key_name: name.clone(),
            });
        };
        self.session.for_unseal(&key, &record.nonce)
    }

    /// Maps flow errors onto flow states. Anything that makes the stored
    /// record unusable forces enrollment; everything else is passed through.
    fn recover(&self, err: SealError) -> SealResult<FlowState> {
        let reason = match err {
            SealError::KeyInvalidated { .. } => EnrollmentReason::KeyInvalidated,
            SealError::InvalidNonceLength { .. } => EnrollmentReason::InvalidNonce,
            SealError::CorruptRecord(_) => EnrollmentReason::CorruptRecord,
            SealError::IntegrityCheckFailed => {
                tracing::warn!(key_name = %self.config.key_name, "sealed record failed verification");
                return Ok(FlowState::Failed {
                    reason: FailureReason::IntegrityCheckFailed,
                    bucket: ErrorBucket::Fallback,
                });
            }
            SealError::KeyStoreUnavailable(detail) => {
                tracing::warn!(%detail, "keystore unavailable during unlock");
                return Ok(keystore_unavailable());
            }
            err => return Err(err),
        };

        tracing::warn!(key_name = %self.config.key_name, %reason, "sealed record unusable; re-enrollment required");
        self.records.clear(&self.config.record_field)?;
        self.preferences.set_biometric_enabled(false)?;
        Ok(FlowState::NeedsEnrollment(reason))
    }
}

impl<P> std::fmt::Debug for EnrollmentOrchestrator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn failed(outcome: AuthenticationOutcome) -> FlowState {
    match outcome {
        AuthenticationOutcome::ErrorOrCancel { code, bucket } => FlowState::Failed {
            reason: FailureReason::Prompt(code),
            bucket,
        },
        AuthenticationOutcome::Rejected | AuthenticationOutcome::Success(_) => FlowState::Failed {
            reason: FailureReason::Rejected,
            bucket: ErrorBucket::Retryable,
        },
    }
}

const fn keystore_unavailable() -> FlowState {
    FlowState::Failed {
        reason: FailureReason::KeyStoreUnavailable,
        bucket: ErrorBucket::Retryable,
    }
}

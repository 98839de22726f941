use thiserror::Error;

use crate::cipher::CipherMode;

/// Result type for sealing operations.
pub type SealResult<T> = Result<T, SealError>;

/// Error outputs from `SealKit`
#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum SealError {
    /// The hardware-backed keystore could not be loaded. Try again later.
    #[error("keystore_unavailable: {0}")]
    KeyStoreUnavailable(String),
    /// The key can no longer satisfy its authentication requirement (the
    /// enrolled biometrics changed). Only re-enrollment recovers from this.
    #[error("key `{key_name}` permanently invalidated; re-enroll biometric")]
    KeyInvalidated {
        /// Name of the invalidated key.
        key_name: String,
    },
    /// The stored nonce does not have the length the cipher requires.
    #[error("invalid_nonce_length: expected {expected} bytes, got {actual}")]
    InvalidNonceLength {
        /// Length required by the primitive.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },
    /// Persisted sealed record is present but cannot be parsed.
    #[error("corrupt_record: {0}")]
    CorruptRecord(String),
    /// The authentication tag did not verify. No plaintext is released.
    #[error("integrity_check_failed")]
    IntegrityCheckFailed,
    /// The primitive rejected the plaintext during sealing.
    #[error("encryption_failed: {0}")]
    EncryptionFailed(String),
    /// A cipher operation was used without a fresh authentication event.
    #[error("not_authenticated")]
    NotAuthenticated,
    /// A single-use cipher operation was processed a second time.
    #[error("operation_consumed")]
    OperationConsumed,
    /// The cipher operation was built for the other direction.
    #[error("mode_mismatch: expected {expected}, got {actual}")]
    ModeMismatch {
        /// Mode the caller required.
        expected: CipherMode,
        /// Mode the operation was built with.
        actual: CipherMode,
    },
    /// Prompt configuration cannot be presented by the platform.
    #[error("invalid_prompt_config: {0}")]
    InvalidPromptConfig(String),
    /// Flow configuration is unusable, e.g. an empty key name.
    #[error("invalid_config: {0}")]
    InvalidConfig(String),
    /// Errors coming from the key-value persistence collaborator.
    #[error("persistence_error: {0}")]
    Persistence(String),
    /// Unexpected error serializing information
    #[error("serialization_error: {0}")]
    Serialization(String),
}

impl SealError {
    /// Whether the caller must run the enrollment path before unlocking again.
    #[must_use]
    pub const fn requires_reenrollment(&self) -> bool {
        matches!(
            self,
            Self::KeyInvalidated { .. } | Self::InvalidNonceLength { .. } | Self::CorruptRecord(_)
        )
    }

    /// Whether the error indicates the crate's own usage contract was broken
    /// (an operation processed without authorization, twice, or in the wrong
    /// mode). These are unreachable when the orchestrator drives the flow.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated | Self::OperationConsumed | Self::ModeMismatch { .. }
        )
    }

    pub(crate) fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub(crate) fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SealError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalidated_message_asks_for_reenrollment() {
        let err = SealError::KeyInvalidated {
            key_name: "app_key".to_string(),
        };
        assert!(err.to_string().contains("re-enroll biometric"));
        assert!(err.requires_reenrollment());
        assert!(!err.is_contract_violation());
    }

    #[test]
    fn test_contract_violations() {
        assert!(SealError::NotAuthenticated.is_contract_violation());
        assert!(SealError::OperationConsumed.is_contract_violation());
        assert!(!SealError::IntegrityCheckFailed.is_contract_violation());
        assert!(!SealError::IntegrityCheckFailed.requires_reenrollment());
    }

    #[test]
    fn test_config_and_prompt_errors_are_distinct() {
        let config = SealError::InvalidConfig("key_name is empty".to_string());
        assert_eq!(config.to_string(), "invalid_config: key_name is empty");
        assert!(!config.is_contract_violation());
        assert!(!matches!(config, SealError::InvalidPromptConfig(_)));
    }
}

//! Authentication gate: binds a cipher operation to one liveness proof.
//!
//! The platform dialog itself is external. It is reached through
//! [`PromptPresenter`], either implemented directly as an async presenter or
//! through [`PromptBridge`] for callback-style platform APIs.

mod bridge;
mod cancel;

pub use bridge::{PromptBridge, PromptLauncher, PromptResponder};
pub use cancel::{CancelHandle, CancelSignal};

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::cipher::{CipherMode, CipherOperation};
use crate::defaults;
use crate::error::{SealError, SealResult};
use crate::keystore::Authorization;

/// What the prompt offers besides the biometric itself.
///
/// The platform cannot show a negative button and allow the device
/// credential at the same time, so the two are alternatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "snake_case")]
pub enum PromptFallback {
    /// Biometric only, with an explicit button that escalates to the
    /// host's own fallback (e.g. "use account password").
    NegativeButton(String),
    /// Let the user authenticate with the device PIN, pattern or password.
    DeviceCredential,
}

/// Configuration of the platform prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default)]
pub struct PromptConfig {
    /// Prompt title.
    pub title: String,
    /// Prompt subtitle.
    pub subtitle: String,
    /// Longer description shown under the subtitle.
    pub description: String,
    /// Require an explicit confirmation after a passive biometric (face).
    pub confirmation_required: bool,
    /// Negative button or device credential.
    pub fallback: PromptFallback,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            title: defaults::PROMPT_TITLE.to_string(),
            subtitle: defaults::PROMPT_SUBTITLE.to_string(),
            description: defaults::PROMPT_DESCRIPTION.to_string(),
            confirmation_required: false,
            fallback: PromptFallback::NegativeButton(defaults::PROMPT_NEGATIVE_BUTTON.to_string()),
        }
    }
}

impl PromptConfig {
    /// Checks that the platform can present this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::InvalidPromptConfig`] for an empty title or an
    /// empty negative button label.
    pub fn validate(&self) -> SealResult<()> {
        if self.title.trim().is_empty() {
            return Err(SealError::InvalidPromptConfig("title is empty".to_string()));
        }
        if let PromptFallback::NegativeButton(label) = &self.fallback {
            if label.trim().is_empty() {
                return Err(SealError::InvalidPromptConfig(
                    "negative button label is empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Platform error codes reported by the prompt.
///
/// Numbering follows Android's `BiometricPrompt.ERROR_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    /// 1
    HardwareUnavailable,
    /// 2
    UnableToProcess,
    /// 3
    Timeout,
    /// 4
    NoSpace,
    /// 5, the platform canceled the operation.
    Canceled,
    /// 7, too many attempts; try again later.
    Lockout,
    /// 8
    Vendor,
    /// 9, too many attempts; biometrics disabled until the device credential is used.
    LockoutPermanent,
    /// 10
    UserCanceled,
    /// 11
    NoBiometrics,
    /// 12
    HardwareNotPresent,
    /// 13, the user chose the negative button.
    NegativeButton,
    /// 14
    NoDeviceCredential,
    /// 15
    SecurityUpdateRequired,
    /// The surrounding context was torn down before an outcome arrived.
    ContextCanceled,
    /// Any other platform code.
    Other(i32),
}

impl ErrorCode {
    /// Maps a raw platform code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::HardwareUnavailable,
            2 => Self::UnableToProcess,
            3 => Self::Timeout,
            4 => Self::NoSpace,
            5 => Self::Canceled,
            7 => Self::Lockout,
            8 => Self::Vendor,
            9 => Self::LockoutPermanent,
            10 => Self::UserCanceled,
            11 => Self::NoBiometrics,
            12 => Self::HardwareNotPresent,
            13 => Self::NegativeButton,
            14 => Self::NoDeviceCredential,
            15 => Self::SecurityUpdateRequired,
            other => Self::Other(other),
        }
    }

    /// The raw platform code. [`Self::ContextCanceled`] has no platform
    /// equivalent and reports `-1`.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::HardwareUnavailable => 1,
            Self::UnableToProcess => 2,
            Self::Timeout => 3,
            Self::NoSpace => 4,
            Self::Canceled => 5,
            Self::Lockout => 7,
            Self::Vendor => 8,
            Self::LockoutPermanent => 9,
            Self::UserCanceled => 10,
            Self::NoBiometrics => 11,
            Self::HardwareNotPresent => 12,
            Self::NegativeButton => 13,
            Self::NoDeviceCredential => 14,
            Self::SecurityUpdateRequired => 15,
            Self::ContextCanceled => -1,
            Self::Other(code) => code,
        }
    }

    /// Classifies the code for caller policy.
    #[must_use]
    pub const fn bucket(self) -> ErrorBucket {
        match self {
            Self::LockoutPermanent
            | Self::NoBiometrics
            | Self::HardwareNotPresent
            | Self::NegativeButton
            | Self::NoDeviceCredential
            | Self::SecurityUpdateRequired => ErrorBucket::Fallback,
            Self::HardwareUnavailable
            | Self::UnableToProcess
            | Self::Timeout
            | Self::NoSpace
            | Self::Canceled
            | Self::Lockout
            | Self::Vendor
            | Self::UserCanceled
            | Self::ContextCanceled
            | Self::Other(_) => ErrorBucket::Retryable,
        }
    }
}

/// Caller policy for a failed authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[strum(serialize_all = "snake_case")]
pub enum ErrorBucket {
    /// Offer to try again (possibly later).
    Retryable,
    /// Escalate to the host's fallback, e.g. manual credential entry.
    Fallback,
}

impl ErrorBucket {
    /// Bucket for raw platform error `code`.
    #[must_use]
    pub const fn classify(code: i32) -> Self {
        ErrorCode::from_code(code).bucket()
    }
}

/// Raw result of one prompt, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum PromptResult {
    /// The user authenticated.
    Succeeded,
    /// A biometric was presented but not recognized.
    Failed,
    /// The prompt ended with an error or cancellation.
    Error(ErrorCode),
}

/// Describes the operation a prompt unlocks, without exposing it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct CryptoBinding {
    /// Keystore alias of the bound key.
    pub key_name: String,
    /// Direction of the bound operation.
    pub mode: CipherMode,
}

impl From<&CipherOperation> for CryptoBinding {
    fn from(operation: &CipherOperation) -> Self {
        Self {
            key_name: operation.key().name().to_string(),
            mode: operation.mode(),
        }
    }
}

/// Presents the platform prompt and reports its single result.
pub trait PromptPresenter: Send + Sync {
    /// Shows the prompt for `binding` and resolves once the user completes,
    /// rejects or the platform reports an error.
    fn present(
        &self,
        prompt: &PromptConfig,
        binding: &CryptoBinding,
    ) -> impl Future<Output = PromptResult> + Send;
}

/// Outcome of one authentication attempt.
#[derive(Debug)]
pub enum AuthenticationOutcome {
    /// The user authenticated. Carries the operation that was passed in,
    /// now authorized for exactly one `process` call.
    Success(CipherOperation),
    /// The user presented a biometric that was not recognized.
    Rejected,
    /// The prompt ended with an error or was canceled.
    ErrorOrCancel {
        /// Raw platform code.
        code: ErrorCode,
        /// Caller policy for `code`.
        bucket: ErrorBucket,
    },
}

/// Runs a prompt and authorizes the bound operation on success.
pub struct AuthenticationGate<P> {
    presenter: P,
}

impl<P: PromptPresenter> AuthenticationGate<P> {
    /// Creates a gate over `presenter`.
    #[must_use]
    pub const fn new(presenter: P) -> Self {
        Self { presenter }
    }

    /// The underlying presenter.
    #[must_use]
    pub const fn presenter(&self) -> &P {
        &self.presenter
    }

    /// Presents `prompt` for `operation` and suspends until exactly one
    /// outcome is available.
    ///
    /// If `cancel` fires first the pending prompt is dropped, `operation` is
    /// discarded and the outcome is `ErrorOrCancel` with
    /// [`ErrorCode::ContextCanceled`].
    ///
    /// # Errors
    ///
    /// - [`SealError::InvalidPromptConfig`] if `prompt` cannot be presented.
    /// - [`SealError::OperationConsumed`] if `operation` was already
    ///   authorized or processed.
    pub async fn authenticate(
        &self,
        mut operation: CipherOperation,
        prompt: &PromptConfig,
        cancel: &CancelSignal,
    ) -> SealResult<AuthenticationOutcome> {
        prompt.validate()?;
        if !operation.is_pending() {
            return Err(SealError::OperationConsumed);
        }
        if cancel.is_cancelled() {
            return Ok(canceled());
        }

        let binding = CryptoBinding::from(&operation);
        tracing::debug!(key_name = %binding.key_name, mode = %binding.mode, "presenting prompt");
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(key_name = %binding.key_name, "prompt canceled by context teardown");
                return Ok(canceled());
            }
            result = self.presenter.present(prompt, &binding) => result,
        };

        Ok(match result {
            PromptResult::Succeeded => {
                operation.authorize(Authorization::granted())?;
                AuthenticationOutcome::Success(operation)
            }
            PromptResult::Failed => AuthenticationOutcome::Rejected,
            PromptResult::Error(code) => {
                let bucket = code.bucket();
                tracing::debug!(%code, %bucket, "prompt ended with error");
                AuthenticationOutcome::ErrorOrCancel { code, bucket }
            }
        })
    }
}

const fn canceled() -> AuthenticationOutcome {
    AuthenticationOutcome::ErrorOrCancel {
        code: ErrorCode::ContextCanceled,
        bucket: ErrorBucket::Retryable,
    }
}

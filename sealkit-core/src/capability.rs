//! Whether the device can run the biometric flow at all.

use serde::{Deserialize, Serialize};

/// Result of probing the device for strong biometric support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BiometricCapability {
    /// Hardware present and at least one credential enrolled.
    Available,
    /// No biometric hardware, or the hardware is currently unavailable.
    NoHardware,
    /// Hardware present but the user has not enrolled a credential.
    NoneEnrolled,
    /// The platform requires a security update before biometrics can be used.
    SecurityUpdateRequired,
}

impl BiometricCapability {
    /// Only [`Self::Available`] lets a flow proceed.
    #[must_use]
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Platform probe (e.g. `BiometricManager.canAuthenticate(BIOMETRIC_STRONG)`).
pub trait CapabilityProbe: Send + Sync {
    /// Reports current capability. Called at the start of every flow.
    fn capability(&self) -> BiometricCapability;
}

/// A probe that always reports the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedCapability(pub BiometricCapability);

impl Default for FixedCapability {
    fn default() -> Self {
        Self(BiometricCapability::Available)
    }
}

impl CapabilityProbe for FixedCapability {
    fn capability(&self) -> BiometricCapability {
        self.0
    }
}

//! Well-known names shared with the host application.
//!
//! The preference names match the fields the Android app already writes, so a
//! store populated by the app can be read by this crate unchanged.

/// Alias of the keystore key used when the host does not configure one.
pub const DEFAULT_KEY_NAME: &str = "biometric_secret_key";

/// Key-value namespace (the shared-preferences file name).
pub const PREFS_NAMESPACE: &str = "biometricPrefs";

/// Field holding the serialized sealed record.
pub const CIPHER_TEXT_WRAPPER: &str = "cipherTextWrapper";

/// Field holding the username entered at login.
pub const USERNAME: &str = "username";

/// Field holding the cleartext token of the non-biometric login path.
pub const TOKEN: &str = "token";

/// Field holding the biometric-enabled switch.
pub const IS_BIOMETRIC_ENABLED: &str = "isBiometricEnabled";

/// Associated-data prefix bound into every sealed record. The key name is appended.
pub(crate) const SEALED_SECRET_AD: &[u8] = b"sealkit:sealed-secret:";

pub(crate) const PROMPT_TITLE: &str = "Biometric login";
pub(crate) const PROMPT_SUBTITLE: &str = "Log in using your biometric credential";
pub(crate) const PROMPT_DESCRIPTION: &str = "Confirm your identity to continue";
pub(crate) const PROMPT_NEGATIVE_BUTTON: &str = "Use account password";

//! Flow configuration.

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{SealError, SealResult};
use crate::gate::PromptConfig;

/// Names and prompt settings for one enrollment/unlock flow.
///
/// Missing fields take the app's well-known defaults, so `{}` is a valid
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default, deny_unknown_fields)]
pub struct SealConfig {
    /// Keystore alias of the sealing key.
    pub key_name: String,
    /// Key-value namespace holding the record and session preferences.
    pub namespace: String,
    /// Key of the sealed record inside `namespace`.
    pub record_field: String,
    /// Prompt shown for every authentication.
    pub prompt: PromptConfig,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            key_name: defaults::DEFAULT_KEY_NAME.to_string(),
            namespace: defaults::PREFS_NAMESPACE.to_string(),
            record_field: defaults::CIPHER_TEXT_WRAPPER.to_string(),
            prompt: PromptConfig::default(),
        }
    }
}

impl SealConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::Serialization`] for malformed JSON and the
    /// errors of [`Self::validate`].
    pub fn from_json(json: &str) -> SealResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`SealError::InvalidConfig`] if a name is empty and
    /// [`SealError::InvalidPromptConfig`] if the prompt cannot be presented.
    pub fn validate(&self) -> SealResult<()> {
        for (field, value) in [
            ("key_name", &self.key_name),
            ("namespace", &self.namespace),
            ("record_field", &self.record_field),
        ] {
            if value.trim().is_empty() {
                return Err(SealError::InvalidConfig(format!("{field} is empty")));
            }
        }
        self.prompt.validate()
    }
}

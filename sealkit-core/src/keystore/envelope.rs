//! On-disk envelope of the software keystore.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::KeyPolicy;
use crate::error::{SealError, SealResult};

const ENVELOPE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
pub(super) struct PersistedKey {
    pub(super) name: String,
    pub(super) policy: KeyPolicy,
    pub(super) generation: u64,
    pub(super) invalidated: bool,
    pub(super) material: Zeroizing<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
pub(super) struct KeystoreEnvelope {
    pub(super) version: u32,
    pub(super) next_generation: u64,
    pub(super) keys: Vec<PersistedKey>,
}

impl KeystoreEnvelope {
    pub(super) const fn new(next_generation: u64, keys: Vec<PersistedKey>) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            next_generation,
            keys,
        }
    }

    pub(super) fn serialize(&self) -> SealResult<Zeroizing<Vec<u8>>> {
        let mut bytes = Zeroizing::new(Vec::new());
        ciborium::ser::into_writer(self, &mut *bytes).map_err(SealError::serialization)?;
        Ok(bytes)
    }

    pub(super) fn deserialize(bytes: &[u8]) -> SealResult<Self> {
        let envelope: Self = ciborium::de::from_reader(bytes)
            .map_err(|err| SealError::KeyStoreUnavailable(format!("unreadable keystore: {err}")))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(SealError::KeyStoreUnavailable(format!(
                "unsupported keystore version: {}",
                envelope.version
            )));
        }
        Ok(envelope)
    }
}

//! Sealing and unsealing of the session token.

use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cipher::{CipherMode, CipherOperation};
use crate::error::{SealError, SealResult};

/// The sensitive payload. Cleartext exists only in process memory and is
/// redacted from `Debug` output.
#[derive(Clone)]
pub struct SessionToken(SecretString);

impl SessionToken {
    /// Wraps `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Fabricates a random token (there is no server in this flow).
    #[must_use]
    pub fn fabricate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the cleartext token.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

impl PartialEq for SessionToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for SessionToken {}

/// Ciphertext plus the nonce it was sealed with.
///
/// Serialized as `{"cipherText": "<base64>", "initializationVector": "<base64>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedRecord {
    /// Ciphertext including the authentication tag.
    #[serde(rename = "cipherText", with = "record_bytes")]
    pub ciphertext: Vec<u8>,
    /// Nonce captured at seal time.
    #[serde(rename = "initializationVector", with = "record_bytes")]
    pub nonce: Vec<u8>,
}

impl SealedRecord {
    /// Serializes the record to its stored text form.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> SealResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a record from its stored text form.
    ///
    /// # Errors
    ///
    /// Returns [`SealError::CorruptRecord`] if `json` is not a valid record.
    pub fn from_json(json: &str) -> SealResult<Self> {
        serde_json::from_str(json).map_err(|err| SealError::CorruptRecord(err.to_string()))
    }
}

/// Byte fields are written as base64 strings. Reading also accepts arrays
/// of signed bytes, which is how the Android app's Gson encoded `ByteArray`.
mod record_bytes {
    use base64::Engine as _;

    use super::{Deserialize, Deserializer, Serializer, STANDARD};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Encoded {
        Base64(String),
        Signed(Vec<i8>),
        Unsigned(Vec<u8>),
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Encoded::deserialize(deserializer)? {
            Encoded::Base64(text) => STANDARD.decode(text).map_err(serde::de::Error::custom),
            #[allow(clippy::cast_sign_loss)]
            Encoded::Signed(values) => Ok(values.into_iter().map(|value| value as u8).collect()),
            Encoded::Unsigned(values) => Ok(values),
        }
    }
}

/// Seals `plaintext` with an authorized seal-mode operation.
///
/// # Errors
///
/// - [`SealError::ModeMismatch`] if `operation` is not in seal mode.
/// - [`SealError::NotAuthenticated`] if `operation` was never authorized.
/// - [`SealError::EncryptionFailed`] if the primitive rejects the input.
pub fn seal(plaintext: &str, mut operation: CipherOperation) -> SealResult<SealedRecord> {
    ensure_mode(&operation, CipherMode::Seal)?;
    let ciphertext = operation.process(plaintext.as_bytes())?;
    let nonce = operation
        .captured_nonce()
        .ok_or_else(|| SealError::EncryptionFailed("primitive returned no nonce".to_string()))?
        .to_vec();
    Ok(SealedRecord { ciphertext, nonce })
}

/// Unseals `record` with an authorized unseal-mode operation built from
/// `record.nonce`.
///
/// # Errors
///
/// - [`SealError::ModeMismatch`] if `operation` is not in unseal mode.
/// - [`SealError::NotAuthenticated`] if `operation` was never authorized.
/// - [`SealError::IntegrityCheckFailed`] if the ciphertext, nonce or key do
///   not match, or the plaintext is not UTF-8.
pub fn unseal(record: &SealedRecord, mut operation: CipherOperation) -> SealResult<SessionToken> {
    ensure_mode(&operation, CipherMode::Unseal)?;
    let plaintext = zeroize::Zeroizing::new(operation.process(&record.ciphertext)?);
    let text = std::str::from_utf8(&plaintext).map_err(|_| SealError::IntegrityCheckFailed)?;
    Ok(SessionToken::new(text))
}

fn ensure_mode(operation: &CipherOperation, expected: CipherMode) -> SealResult<()> {
    if operation.mode() == expected {
        Ok(())
    } else {
        Err(SealError::ModeMismatch {
            expected,
            actual: operation.mode(),
        })
    }
}

/// Namespaced entry points mirroring the component name used by hosts.
pub struct SealedSecretCodec;

impl SealedSecretCodec {
    /// See [`seal`].
    ///
    /// # Errors
    ///
    /// See [`seal`].
    pub fn seal(plaintext: &str, operation: CipherOperation) -> SealResult<SealedRecord> {
        seal(plaintext, operation)
    }

    /// See [`unseal`].
    ///
    /// # Errors
    ///
    /// See [`unseal`].
    pub fn unseal(record: &SealedRecord, operation: CipherOperation) -> SealResult<SessionToken> {
        unseal(record, operation)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cipher::CipherSession;
    use crate::keystore::{Authorization, SecretKeyHandle, SecureKeyStore, SoftwareKeystore};

    fn authorized(mut op: CipherOperation) -> CipherOperation {
        op.authorize(Authorization::granted()).expect("authorize");
        op
    }

    fn session() -> (CipherSession, SecretKeyHandle) {
        let keystore = Arc::new(SoftwareKeystore::in_memory());
        let key = keystore.get_or_create_key("app_key").expect("create key");
        (CipherSession::new(keystore), key)
    }

    fn seal_token(session: &CipherSession, key: &SecretKeyHandle, token: &str) -> SealedRecord {
        let op = authorized(session.for_seal(key).expect("for seal"));
        seal(token, op).expect("seal")
    }

    #[test]
    fn test_seal_unseal_round_trip() {
        let (session, key) = session();
        let longest = "x".repeat(4096);
        for token in ["tok-123", "", "päßwörd ✓ 🔐", longest.as_str()] {
            let record = seal_token(&session, &key, token);
            assert_ne!(record.ciphertext.as_slice(), token.as_bytes());
            let op = authorized(session.for_unseal(&key, &record.nonce).expect("for unseal"));
            let recovered = unseal(&record, op).expect("unseal");
            assert_eq!(recovered.expose(), token);
        }
    }

    #[test]
    fn test_every_bit_flip_is_detected() {
        let (session, key) = session();
        let record = seal_token(&session, &key, "tok-123");
        for byte in 0..record.ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = record.clone();
                tampered.ciphertext[byte] ^= 1 << bit;
                let op = authorized(session.for_unseal(&key, &record.nonce).expect("for unseal"));
                assert!(matches!(
                    unseal(&tampered, op),
                    Err(SealError::IntegrityCheckFailed)
                ));
            }
        }
    }

    #[test]
    fn test_cross_key_unseal_fails() {
        let keystore = Arc::new(SoftwareKeystore::in_memory());
        let key_a = keystore.get_or_create_key("key_a").expect("key a");
        let key_b = keystore.get_or_create_key("key_b").expect("key b");
        let session = CipherSession::new(keystore);

        let record = seal_token(&session, &key_a, "tok-123");
        let op = authorized(session.for_unseal(&key_b, &record.nonce).expect("for unseal"));
        assert!(matches!(
            unseal(&record, op),
            Err(SealError::IntegrityCheckFailed)
        ));
    }

    #[test]
    fn test_mode_is_checked() {
        let (session, key) = session();
        let record = seal_token(&session, &key, "tok-123");

        let unseal_op = authorized(session.for_unseal(&key, &record.nonce).expect("for unseal"));
        assert!(matches!(
            seal("tok-123", unseal_op),
            Err(SealError::ModeMismatch {
                expected: CipherMode::Seal,
                actual: CipherMode::Unseal
            })
        ));

        let seal_op = authorized(session.for_seal(&key).expect("for seal"));
        assert!(matches!(
            unseal(&record, seal_op),
            Err(SealError::ModeMismatch { .. })
        ));
    }

    #[test]
    fn test_unauthorized_operation_is_refused() {
        let (session, key) = session();
        let op = session.for_seal(&key).expect("for seal");
        assert!(matches!(
            seal("tok-123", op),
            Err(SealError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_record_json_round_trip() {
        let record = SealedRecord {
            ciphertext: vec![0, 1, 2, 250, 255],
            nonce: vec![9; 12],
        };
        let json = record.to_json().expect("to json");
        assert!(json.contains("\"cipherText\":\"AAEC+v8=\""));
        assert!(json.contains("\"initializationVector\""));
        assert_eq!(SealedRecord::from_json(&json).expect("from json"), record);
    }

    #[test]
    fn test_record_accepts_gson_byte_arrays() {
        let json = r#"{"cipherText":[0,1,-6,-1],"initializationVector":[1,2,3,4,5,6,7,8,9,10,11,127]}"#;
        let record = SealedRecord::from_json(json).expect("from json");
        assert_eq!(record.ciphertext, vec![0, 1, 250, 255]);
        assert_eq!(record.nonce.len(), 12);
        assert_eq!(record.nonce[11], 127);
    }

    #[test]
    fn test_malformed_record_is_corrupt() {
        for json in [
            "",
            "{}",
            "not json",
            r#"{"cipherText":"***","initializationVector":"AAAA"}"#,
        ] {
            assert!(matches!(
                SealedRecord::from_json(json),
                Err(SealError::CorruptRecord(_))
            ));
        }
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = SessionToken::new("tok-123");
        assert_eq!(format!("{token:?}"), "SessionToken([REDACTED])");
        assert_ne!(SessionToken::fabricate(), SessionToken::fabricate());
    }
}

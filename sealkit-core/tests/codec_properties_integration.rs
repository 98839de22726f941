//! Integration tests.

mod common;

use std::sync::Arc;

use common::ScriptedPresenter;
use sealkit_core::keystore::{KeyAlgorithm, KeyPolicy};
use sealkit_core::{
    AuthenticationGate, AuthenticationOutcome, CancelSignal, CipherOperation, CipherSession,
    PromptConfig, SealError, SealedRecord, SealedSecretCodec, SecretKeyHandle, SecureKeyStore,
    SoftwareKeystore,
};
use test_case::test_case;

struct Harness {
    keystore: Arc<SoftwareKeystore>,
    session: CipherSession,
    gate: AuthenticationGate<ScriptedPresenter>,
}

impl Harness {
    fn new() -> Self {
        let keystore = Arc::new(SoftwareKeystore::in_memory());
        Self {
            session: CipherSession::new(keystore.clone()),
            keystore,
            gate: AuthenticationGate::new(ScriptedPresenter::approving()),
        }
    }

    fn key(&self, name: &str, algorithm: KeyAlgorithm) -> SecretKeyHandle {
        self.keystore
            .get_or_create_key_with_policy(
                name,
                KeyPolicy {
                    algorithm,
                    ..KeyPolicy::default()
                },
            )
            .expect("key")
    }

    async fn authorize(&self, operation: CipherOperation) -> CipherOperation {
        let outcome = self
            .gate
            .authenticate(operation, &PromptConfig::default(), &CancelSignal::never())
            .await
            .expect("authenticate");
        match outcome {
            AuthenticationOutcome::Success(operation) => operation,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    async fn seal(&self, key: &SecretKeyHandle, plaintext: &str) -> SealedRecord {
        let operation = self.authorize(self.session.for_seal(key).expect("for seal")).await;
        SealedSecretCodec::seal(plaintext, operation).expect("seal")
    }

    async fn unseal(&self, key: &SecretKeyHandle, record: &SealedRecord) -> Result<String, SealError> {
        let operation = self.session.for_unseal(key, &record.nonce)?;
        let operation = self.authorize(operation).await;
        SealedSecretCodec::unseal(record, operation).map(|token| token.expose().to_string())
    }
}

#[test_case(KeyAlgorithm::Aes256Gcm ; "aes-256-gcm")]
#[test_case(KeyAlgorithm::XChaCha20Poly1305 ; "xchacha20-poly1305")]
#[tokio::test]
async fn test_round_trip_through_gate(algorithm: KeyAlgorithm) {
    let harness = Harness::new();
    let key = harness.key("app_key", algorithm);
    let long = "é".repeat(2048);
    for plaintext in ["tok-123", "", long.as_str()] {
        let record = harness.seal(&key, plaintext).await;
        let json = record.to_json().expect("to json");
        let reloaded = SealedRecord::from_json(&json).expect("from json");
        assert_eq!(harness.unseal(&key, &reloaded).await.expect("unseal"), plaintext);
    }
}

#[tokio::test]
async fn test_fresh_nonce_per_seal() {
    let harness = Harness::new();
    let key = harness.key("app_key", KeyAlgorithm::Aes256Gcm);
    let first = harness.seal(&key, "tok-123").await;
    let second = harness.seal(&key, "tok-123").await;
    assert_ne!(first.nonce, second.nonce);
    assert_ne!(first.ciphertext, second.ciphertext);
}

#[tokio::test]
async fn test_tampered_nonce_or_ciphertext_never_unseals() {
    let harness = Harness::new();
    let key = harness.key("app_key", KeyAlgorithm::Aes256Gcm);
    let record = harness.seal(&key, "tok-123").await;

    let mut other_nonce = record.clone();
    other_nonce.nonce[0] ^= 0x80;
    assert!(matches!(
        harness.unseal(&key, &other_nonce).await,
        Err(SealError::IntegrityCheckFailed)
    ));

    let mut truncated = record.clone();
    truncated.ciphertext.pop();
    assert!(matches!(
        harness.unseal(&key, &truncated).await,
        Err(SealError::IntegrityCheckFailed)
    ));

    let short_nonce = SealedRecord {
        nonce: vec![0; 11],
        ..record
    };
    assert!(matches!(
        harness.unseal(&key, &short_nonce).await,
        Err(SealError::InvalidNonceLength {
            expected: 12,
            actual: 11
        })
    ));
}

#[tokio::test]
async fn test_cross_key_isolation() {
    let harness = Harness::new();
    let key_a = harness.key("key_a", KeyAlgorithm::Aes256Gcm);
    let key_b = harness.key("key_b", KeyAlgorithm::Aes256Gcm);
    let record = harness.seal(&key_a, "tok-123").await;
    assert!(matches!(
        harness.unseal(&key_b, &record).await,
        Err(SealError::IntegrityCheckFailed)
    ));
}

#[tokio::test]
async fn test_authorized_operation_is_single_use() {
    let harness = Harness::new();
    let key = harness.key("app_key", KeyAlgorithm::Aes256Gcm);
    let mut operation = harness
        .authorize(harness.session.for_seal(&key).expect("for seal"))
        .await;
    operation.process(b"tok-123").expect("first use");
    assert!(matches!(
        operation.process(b"tok-123"),
        Err(SealError::OperationConsumed)
    ));

    // A consumed operation cannot be authorized again either.
    let result = harness
        .gate
        .authenticate(operation, &PromptConfig::default(), &CancelSignal::never())
        .await;
    assert!(matches!(result, Err(SealError::OperationConsumed)));
}

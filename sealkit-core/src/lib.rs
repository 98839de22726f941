#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Biometric-gated sealing of a session token under a device-bound key.
//!
//! A local authentication event unlocks exactly one use of a 256-bit key
//! held by a [`keystore::SecureKeyStore`]; that key protects the session
//! token at rest with authenticated encryption. The platform prompt, the
//! key-value store and the capability probe are supplied by the host.

pub mod capability;
pub mod cipher;
pub mod codec;
pub mod config;
pub mod defaults;
pub mod gate;
pub mod keystore;
pub mod logger;
pub mod orchestrator;
pub mod persistence;

mod error;
pub use error::*;

pub use capability::{BiometricCapability, CapabilityProbe, FixedCapability};
pub use cipher::{CipherMode, CipherOperation, CipherSession};
pub use codec::{SealedRecord, SealedSecretCodec, SessionToken};
pub use config::SealConfig;
pub use gate::{
    AuthenticationGate, AuthenticationOutcome, CancelHandle, CancelSignal, ErrorBucket,
    ErrorCode, PromptConfig, PromptFallback, PromptPresenter, PromptResult,
};
pub use keystore::{SecretKeyHandle, SecureKeyStore, SoftwareKeystore};
pub use orchestrator::{EnrollmentOrchestrator, FlowState, StartState};
pub use persistence::{KeyValueStore, SealedSecretStore, SessionPreferences};

// private modules
mod utils;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!("sealkit_core");

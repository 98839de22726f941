//! Common test utilities shared across integration tests.

#![allow(dead_code, missing_docs)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use sealkit_core::gate::CryptoBinding;
use sealkit_core::orchestrator::KeyLocks;
use sealkit_core::persistence::{FileKeyValueStore, MemoryKeyValueStore};
use sealkit_core::{
    BiometricCapability, EnrollmentOrchestrator, FixedCapability, KeyValueStore, PromptConfig,
    PromptPresenter, PromptResult, SealConfig, SoftwareKeystore,
};

/// What the scripted prompt does for one presentation.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Answer(PromptResult),
    /// Never answers; only a cancel signal ends the attempt.
    Hang,
}

/// Presenter that replays a script, then approves every further prompt.
#[derive(Default)]
pub struct ScriptedPresenter {
    script: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<CryptoBinding>>,
}

impl ScriptedPresenter {
    pub fn approving() -> Self {
        Self::default()
    }

    pub fn with_script(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            seen: Mutex::default(),
        }
    }

    pub fn push(&self, step: Step) {
        self.script.lock().expect("lock").push_back(step);
    }

    pub fn presentations(&self) -> Vec<CryptoBinding> {
        self.seen.lock().expect("lock").clone()
    }
}

impl PromptPresenter for ScriptedPresenter {
    async fn present(&self, _prompt: &PromptConfig, binding: &CryptoBinding) -> PromptResult {
        self.seen.lock().expect("lock").push(binding.clone());
        let step = self
            .script
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Step::Answer(PromptResult::Succeeded));
        match step {
            Step::Answer(result) => result,
            Step::Hang => std::future::pending().await,
        }
    }
}

/// Shared collaborators, so several orchestrator runs see the same device.
///
/// Each device has its own lock table so parallel tests on the same key
/// name do not wait on each other.
pub struct Device {
    pub keystore: Arc<SoftwareKeystore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub capability: BiometricCapability,
    pub locks: KeyLocks,
}

impl Device {
    pub fn in_memory() -> Self {
        Self {
            keystore: Arc::new(SoftwareKeystore::in_memory()),
            kv: Arc::new(MemoryKeyValueStore::new()),
            capability: BiometricCapability::Available,
            locks: KeyLocks::new(),
        }
    }

    pub fn on_disk(root: &Path) -> Self {
        Self {
            keystore: Arc::new(SoftwareKeystore::open(root.join("keystore.cbor")).expect("keystore")),
            kv: Arc::new(FileKeyValueStore::new(root.join("prefs")).expect("kv store")),
            capability: BiometricCapability::Available,
            locks: KeyLocks::new(),
        }
    }

    pub fn orchestrator(
        &self,
        presenter: ScriptedPresenter,
    ) -> EnrollmentOrchestrator<ScriptedPresenter> {
        self.orchestrator_with(app_config(), presenter)
    }

    pub fn orchestrator_with(
        &self,
        config: SealConfig,
        presenter: ScriptedPresenter,
    ) -> EnrollmentOrchestrator<ScriptedPresenter> {
        self.default_orchestrator(config, presenter)
            .with_locks(self.locks.clone())
    }

    /// Built with [`EnrollmentOrchestrator::new`] alone, so it uses the
    /// process-wide lock table.
    pub fn default_orchestrator(
        &self,
        config: SealConfig,
        presenter: ScriptedPresenter,
    ) -> EnrollmentOrchestrator<ScriptedPresenter> {
        EnrollmentOrchestrator::new(
            config,
            self.keystore.clone(),
            Arc::clone(&self.kv),
            Arc::new(FixedCapability(self.capability)),
            presenter,
        )
        .expect("orchestrator")
    }
}

pub fn app_config() -> SealConfig {
    SealConfig {
        key_name: "app_key".to_string(),
        ..SealConfig::default()
    }
}

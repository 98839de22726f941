use std::future::Future;

use tokio::sync::oneshot;

use super::{CryptoBinding, ErrorCode, PromptConfig, PromptPresenter, PromptResult};

/// Callback-style entry point for platform prompts.
///
/// `launch` shows the prompt and returns immediately. The platform later
/// reports the result through the [`PromptResponder`].
pub trait PromptLauncher: Send + Sync {
    /// Shows the prompt for `binding`.
    fn launch(&self, prompt: &PromptConfig, binding: &CryptoBinding, responder: PromptResponder);

    /// Dismisses the prompt launched for `binding`. Called when the caller
    /// stops waiting before the platform answered. Any answer reported
    /// afterwards is discarded.
    fn cancel(&self, binding: &CryptoBinding);
}

/// One-shot reply channel for a launched prompt.
///
/// Dropping a responder without answering reports
/// [`ErrorCode::Canceled`], so a prompt torn down by the platform never
/// leaves the caller waiting.
#[derive(Debug)]
pub struct PromptResponder {
    tx: Option<oneshot::Sender<PromptResult>>,
}

impl PromptResponder {
    /// The user authenticated.
    pub fn succeeded(self) {
        self.respond(PromptResult::Succeeded);
    }

    /// The biometric was not recognized.
    pub fn failed(self) {
        self.respond(PromptResult::Failed);
    }

    /// The prompt ended with raw platform error `code`.
    pub fn error(self, code: i32) {
        self.respond(PromptResult::Error(ErrorCode::from_code(code)));
    }

    /// Reports `result`.
    pub fn respond(mut self, result: PromptResult) {
        if let Some(tx) = self.tx.take() {
            // The receiver is gone when the caller was canceled first.
            let _ = tx.send(result);
        }
    }
}

impl Drop for PromptResponder {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(PromptResult::Error(ErrorCode::Canceled));
        }
    }
}

/// Adapts a [`PromptLauncher`] into an async [`PromptPresenter`].
#[derive(Debug)]
pub struct PromptBridge<L> {
    launcher: L,
}

impl<L: PromptLauncher> PromptBridge<L> {
    /// Wraps `launcher`.
    #[must_use]
    pub const fn new(launcher: L) -> Self {
        Self { launcher }
    }

    /// The wrapped launcher.
    #[must_use]
    pub const fn launcher(&self) -> &L {
        &self.launcher
    }
}

impl<L: PromptLauncher> PromptPresenter for PromptBridge<L> {
    fn present(
        &self,
        prompt: &PromptConfig,
        binding: &CryptoBinding,
    ) -> impl Future<Output = PromptResult> + Send {
        let (tx, rx) = oneshot::channel();
        self.launcher
            .launch(prompt, binding, PromptResponder { tx: Some(tx) });
        let mut pending = PendingPrompt {
            launcher: &self.launcher,
            binding: binding.clone(),
            resolved: false,
        };
        async move {
            let result = rx
                .await
                .unwrap_or(PromptResult::Error(ErrorCode::Canceled));
            pending.resolved = true;
            result
        }
    }
}

/// Dismisses the platform prompt if the bridge future is dropped before the
/// platform answered.
struct PendingPrompt<'a, L: PromptLauncher> {
    launcher: &'a L,
    binding: CryptoBinding,
    resolved: bool,
}

impl<L: PromptLauncher> Drop for PendingPrompt<'_, L> {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::debug!(key_name = %self.binding.key_name, "dismissing abandoned prompt");
            self.launcher.cancel(&self.binding);
        }
    }
}

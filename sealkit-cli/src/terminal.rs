use std::io::{BufRead, Write as _};

use sealkit_core::gate::CryptoBinding;
use sealkit_core::{ErrorCode, PromptConfig, PromptFallback, PromptPresenter, PromptResult};
use tokio::sync::{mpsc, Mutex};

/// Presents the biometric prompt as a terminal question.
///
/// `y` authenticates, `n` simulates an unrecognized finger, `f` takes the
/// fallback and `c` cancels. End of input counts as a platform cancel.
///
/// Input is read on a dedicated thread, so a read still pending when the
/// flow is canceled never holds up runtime shutdown.
pub struct TerminalPresenter {
    lines: Mutex<mpsc::Receiver<String>>,
}

impl TerminalPresenter {
    /// Reads answers from standard input.
    pub fn stdin() -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()))
    }

    /// Reads answers line by line from `input`.
    pub fn new(input: impl BufRead + Send + 'static) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let reader = std::thread::Builder::new()
            .name("sealkit-input".to_string())
            .spawn(move || {
                for line in input.lines() {
                    let Ok(line) = line else { break };
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
            });
        if let Err(err) = reader {
            // The sender went with the closure, so every prompt reads as canceled.
            tracing::warn!(%err, "failed to start input reader");
        }
        Self {
            lines: Mutex::new(rx),
        }
    }

    async fn read_answer(&self) -> Option<String> {
        let line = self.lines.lock().await.recv().await?;
        Some(line.trim().to_ascii_lowercase())
    }
}

fn render(prompt: &PromptConfig, binding: &CryptoBinding) -> String {
    let fallback = match &prompt.fallback {
        PromptFallback::NegativeButton(label) => format!("[f] {label}"),
        PromptFallback::DeviceCredential => "[f] use device PIN".to_string(),
    };
    format!(
        "\n== {} ==\n{}\n{}\n({} `{}`)\n[y] touch sensor  [n] wrong finger  {fallback}  [c] cancel\n> ",
        prompt.title, prompt.subtitle, prompt.description, binding.mode, binding.key_name
    )
}

/// Maps one answer onto a prompt result. `None` asks again.
fn interpret(answer: &str, fallback: &PromptFallback) -> Option<PromptResult> {
    match answer {
        "y" | "yes" => Some(PromptResult::Succeeded),
        "n" | "no" => Some(PromptResult::Failed),
        // The device credential authenticates the user just like a biometric.
        "f" => Some(match fallback {
            PromptFallback::NegativeButton(_) => PromptResult::Error(ErrorCode::NegativeButton),
            PromptFallback::DeviceCredential => PromptResult::Succeeded,
        }),
        "c" => Some(PromptResult::Error(ErrorCode::UserCanceled)),
        _ => None,
    }
}

impl PromptPresenter for TerminalPresenter {
    async fn present(&self, prompt: &PromptConfig, binding: &CryptoBinding) -> PromptResult {
        let text = render(prompt, binding);
        loop {
            {
                let mut stderr = std::io::stderr().lock();
                let _ = stderr.write_all(text.as_bytes());
                let _ = stderr.flush();
            }
            let Some(answer) = self.read_answer().await else {
                return PromptResult::Error(ErrorCode::Canceled);
            };
            if let Some(result) = interpret(&answer, &prompt.fallback) {
                return result;
            }
            tracing::debug!(%answer, "unrecognized prompt answer");
        }
    }
}

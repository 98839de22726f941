use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{bail, eyre, WrapErr as _};
use sealkit_core::keystore::KeyStatus;
use sealkit_core::orchestrator::{FailureReason, StartState};
use sealkit_core::persistence::FileKeyValueStore;
use sealkit_core::{
    CancelHandle, CancelSignal, EnrollmentOrchestrator, ErrorBucket, FixedCapability, FlowState,
    SealConfig, SessionToken, SoftwareKeystore,
};
use serde::Serialize;

use crate::terminal::TerminalPresenter;
use crate::{Cli, Commands};

const KEYSTORE_FILE: &str = "keystore.cbor";
const PREFS_DIR: &str = "prefs";

struct Context {
    keystore: Arc<SoftwareKeystore>,
    orchestrator: EnrollmentOrchestrator<TerminalPresenter>,
}

impl Context {
    fn open(cli: &Cli) -> eyre::Result<Self> {
        let home = resolve_home(cli.home.as_deref())?;
        let mut config = match &cli.config {
            Some(path) => load_config(path)?,
            None => SealConfig::default(),
        };
        if let Some(key_name) = &cli.key_name {
            config.key_name.clone_from(key_name);
        }

        let keystore = Arc::new(
            SoftwareKeystore::open(home.join(KEYSTORE_FILE)).wrap_err("failed to open keystore")?,
        );
        let kv = Arc::new(
            FileKeyValueStore::new(home.join(PREFS_DIR)).wrap_err("failed to open preferences")?,
        );
        let orchestrator = EnrollmentOrchestrator::new(
            config,
            keystore.clone(),
            kv,
            Arc::new(FixedCapability(cli.capability.into())),
            TerminalPresenter::stdin(),
        )?;
        tracing::debug!(home = %home.display(), "opened sealkit state");
        Ok(Self {
            keystore,
            orchestrator,
        })
    }
}

fn resolve_home(home: Option<&Path>) -> eyre::Result<PathBuf> {
    match home {
        Some(home) => Ok(home.to_path_buf()),
        None => dirs::home_dir()
            .map(|dir| dir.join(".sealkit"))
            .ok_or_else(|| eyre!("could not determine home directory; pass --home")),
    }
}

fn load_config(path: &Path) -> eyre::Result<SealConfig> {
    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
    SealConfig::from_json(&json).wrap_err_with(|| format!("invalid config {}", path.display()))
}

/// Runs one command against the state directory.
pub async fn execute(cli: Cli) -> eyre::Result<()> {
    let ctx = Context::open(&cli)?;
    let prefs = ctx.orchestrator.preferences();

    match cli.command {
        Commands::Login { username } => {
            prefs.set_username(&username)?;
            prefs.set_token(&SessionToken::fabricate())?;
            println!("logged in as {username}");
        }
        Commands::Enable => {
            let Some(token) = prefs.token()? else {
                bail!("not logged in; run `sealkit login <username>` first");
            };
            let orchestrator = &ctx.orchestrator;
            let state =
                with_cancel(|cancel| async move { orchestrator.enroll(&token, &cancel).await })
                    .await?;
            report(state)?;
        }
        Commands::Unlock => {
            let orchestrator = &ctx.orchestrator;
            let state =
                with_cancel(|cancel| async move { orchestrator.unlock(&cancel).await }).await?;
            report(state)?;
        }
        Commands::Disable => {
            ctx.orchestrator.disable().await?;
            println!("biometric login disabled");
        }
        Commands::Logout => {
            ctx.orchestrator.logout().await?;
            println!("logged out");
        }
        Commands::Status => {
            let status = status(&ctx)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::SimulateEnrollmentChange => {
            let invalidated = ctx.keystore.notify_enrollment_changed()?;
            println!("biometric enrollment changed; {invalidated} key(s) invalidated");
        }
    }
    Ok(())
}

/// Runs `flow` with a cancel signal that fires on Ctrl-C.
async fn with_cancel<F, Fut, T>(flow: F) -> T
where
    F: FnOnce(CancelSignal) -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let (handle, signal) = CancelHandle::new();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted; canceling prompt");
            handle.cancel();
        }
    });
    let result = flow(signal).await;
    watcher.abort();
    result
}

fn report(state: FlowState) -> eyre::Result<()> {
    match state {
        FlowState::Enrolled => println!("biometric login enabled"),
        FlowState::Unlocked(token) => println!("{}", token.expose()),
        FlowState::NoCapability(capability) => {
            bail!("biometric authentication not available on this device: {capability}")
        }
        FlowState::NeedsEnrollment(reason) => {
            bail!("biometric login is not enabled ({reason}); run `sealkit enable`")
        }
        FlowState::Failed { reason, bucket } => {
            let reason = match reason {
                FailureReason::Rejected => "biometric not recognized".to_string(),
                FailureReason::Prompt(code) => format!("prompt ended: {code}"),
                FailureReason::IntegrityCheckFailed => "sealed token failed verification".to_string(),
                FailureReason::KeyStoreUnavailable => "keystore unavailable".to_string(),
            };
            match bucket {
                ErrorBucket::Retryable => bail!("{reason}; try again"),
                ErrorBucket::Fallback => bail!("{reason}; log in with your password"),
            }
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct Status {
    username: Option<String>,
    logged_in: bool,
    biometric_enabled: bool,
    key_name: String,
    key: &'static str,
    start: String,
}

fn status(ctx: &Context) -> eyre::Result<Status> {
    let prefs = ctx.orchestrator.preferences();
    let key_name = ctx.orchestrator.config().key_name.clone();
    let key = match ctx.keystore.status_of(&key_name)? {
        KeyStatus::Missing => "missing",
        KeyStatus::Valid => "valid",
        KeyStatus::Invalidated => "invalidated",
    };
    let start = match ctx.orchestrator.start()? {
        StartState::NoCapability(capability) => format!("no_capability: {capability}"),
        StartState::NeedsEnrollment(reason) => format!("needs_enrollment: {reason}"),
        StartState::ReadyToUnlock(_) => "ready_to_unlock".to_string(),
    };
    Ok(Status {
        username: prefs.username()?,
        logged_in: prefs.token()?.is_some(),
        biometric_enabled: prefs.is_biometric_enabled()?,
        key_name,
        key,
        start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_home_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            resolve_home(Some(dir.path())).expect("home"),
            dir.path().to_path_buf()
        );
    }

    #[test]
    fn test_config_file_is_loaded_and_validated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{"key_name":"app_key"}"#).expect("write");
        assert_eq!(load_config(&good).expect("config").key_name, "app_key");

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"namespace":""}"#).expect("write");
        assert!(load_config(&bad).is_err());
        assert!(load_config(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_failed_flow_is_an_error() {
        assert!(report(FlowState::Enrolled).is_ok());
        assert!(report(FlowState::Failed {
            reason: FailureReason::Rejected,
            bucket: ErrorBucket::Retryable,
        })
        .is_err());
    }
}

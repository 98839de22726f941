//! `sealkit`: drives the biometric enrollment and unlock flow from a
//! terminal, with a file-backed software keystore standing in for the
//! device keystore.

mod commands;
mod terminal;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sealkit_core::BiometricCapability;
use tracing_subscriber::EnvFilter;

/// SealKit developer CLI.
#[derive(Parser, Debug)]
#[command(name = "sealkit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// State directory holding the keystore and preferences. Defaults to `~/.sealkit`.
    #[arg(long, global = true, env = "SEALKIT_HOME")]
    pub home: Option<PathBuf>,

    /// Keystore alias of the sealing key. Overrides the config file.
    #[arg(long, global = true, env = "SEALKIT_KEY_NAME")]
    pub key_name: Option<String>,

    /// JSON flow configuration (key name, namespace, prompt).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Capability the simulated device reports.
    #[arg(long, global = true, value_enum, default_value_t = Capability::Available)]
    pub capability: Capability,

    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// `sealkit` subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with a password (simulated): stores the username and a fresh token.
    Login {
        /// Account name to remember.
        username: String,
    },

    /// Turn biometric login on: seal the stored token under the key.
    Enable,

    /// Unlock with biometrics and print the session token.
    Unlock,

    /// Turn biometric login off and remove the sealed token.
    Disable,

    /// Forget the username, token and sealed token.
    Logout,

    /// Show login, enrollment and key state.
    Status,

    /// Pretend the user enrolled a new fingerprint, invalidating the key.
    SimulateEnrollmentChange,
}

/// Simulated result of the device capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Capability {
    /// Hardware present, fingerprint enrolled.
    Available,
    /// No biometric hardware.
    NoHardware,
    /// Hardware present, nothing enrolled.
    NoneEnrolled,
    /// Platform security update pending.
    SecurityUpdateRequired,
}

impl From<Capability> for BiometricCapability {
    fn from(capability: Capability) -> Self {
        match capability {
            Capability::Available => Self::Available,
            Capability::NoHardware => Self::NoHardware,
            Capability::NoneEnrolled => Self::NoneEnrolled,
            Capability::SecurityUpdateRequired => Self::SecurityUpdateRequired,
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // RUST_LOG=sealkit=debug for verbose output. Tokens are never logged.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sealkit=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    commands::execute(cli).await
}

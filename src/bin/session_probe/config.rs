//! CLI arguments for the session probe.
//!
//! Endpoints and tuning come from the environment, see
//! [`drift_session::config::EnvConfig`].

use std::time::Duration;

use clap::Parser;
use drift_session::types::Pubkey;

#[derive(Debug, Parser)]
#[command(name = "session-probe")]
#[command(about = "Establishes a Drift session for a wallet and reports its accounts")]
pub struct CliConfig {
    /// Wallet public key (base58) to bind as a watch-only identity
    #[arg(long)]
    pub authority: Pubkey,

    /// Give up if the session is not settled within this many seconds
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Keep the session open and report slot updates for this many seconds
    #[arg(long, default_value_t = 0)]
    pub watch_secs: u64,
}

impl CliConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn watch(&self) -> Duration {
        Duration::from_secs(self.watch_secs)
    }
}

//! Session probe for Drift.
//!
//! This binary binds a watch-only wallet, waits for the session to settle
//! while logging every status transition, prints the wallet's Drift accounts
//! and optionally follows slot updates before tearing the session down.

mod config;

use std::process::exit;

use clap::Parser;
use drift_session::{
    config::EnvConfig,
    identity::Identity,
    status::{ConnectionStatus, StatusSnapshot},
};
use tokio::{
    sync::broadcast::error::RecvError,
    time::{Instant, timeout_at},
};
use tracing::{error, info, warn};

use config::CliConfig;

#[tokio::main]
async fn main() {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    let env_config = match EnvConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to parse environment configuration: {}", e);
            exit(1);
        }
    };

    let cli_config = CliConfig::parse();

    // Set up logging
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let manager = match drift_session::session_manager(&env_config) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            exit(1);
        }
    };
    info!(
        endpoints = manager.controller().pool().len(),
        authority = %cli_config.authority,
        "Starting session probe"
    );

    let mut transitions = manager.transitions();
    let identity = Identity::watch_only(cli_config.authority);
    let Some(task) = manager.bind_identity(identity).await else {
        error!("Identity is already bound");
        exit(1);
    };

    let deadline = Instant::now() + cli_config.timeout();
    let settled = timeout_at(deadline, async {
        loop {
            match transitions.recv().await {
                Ok(snapshot) => {
                    log_transition(&snapshot);
                    if snapshot.status.is_terminal() {
                        return Some(snapshot);
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed status transitions"),
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;

    let snapshot = match settled {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            error!("Status feed closed before the session settled");
            exit(1);
        }
        Err(_) => {
            error!(timeout = ?cli_config.timeout(), "Session did not settle in time");
            manager.unbind().await;
            exit(1);
        }
    };
    if let Err(e) = task.await {
        warn!(%e, "Session task failed");
    }

    if snapshot.status == ConnectionStatus::Failed {
        error!(error = snapshot.error.as_deref().unwrap_or_default(), "Session failed");
        exit(1);
    }

    if let Some(session) = manager.session().await {
        for account in session.accounts() {
            println!(
                "{}\t{}\t{} SOL",
                account.address(),
                account.name(),
                account.balance()
            );
        }

        if !cli_config.watch().is_zero() {
            let mut slot = session.client().slot();
            let _ = tokio::time::timeout(cli_config.watch(), async {
                while slot.changed().await.is_ok() {
                    if let Some(slot) = *slot.borrow_and_update() {
                        info!(slot, endpoint = %session.endpoint(), "Slot update");
                    }
                }
            })
            .await;
        }
    }

    manager.unbind().await;
}

fn log_transition(snapshot: &StatusSnapshot) {
    let endpoint = snapshot
        .current_endpoint
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    match &snapshot.error {
        Some(e) => warn!(status = ?snapshot.status, %endpoint, error = %e, "Status changed"),
        None => info!(status = ?snapshot.status, %endpoint, "Status changed"),
    }
}

//! Drift session SDK.
//!
//! # Overview
//!
//! Resilient session to the Drift protocol over a pool of Solana RPC
//! endpoints, bound to one wallet identity at a time.
//!
//! Use [`config::EnvConfig`] to load endpoints and tuning from the environment,
//! then [`manager::SessionManager::bind_identity`] to establish a session for
//! a wallet. Progress is published through [`status::StatusBoard`]: the latest
//! [`status::StatusSnapshot`] via a watch channel and every transition via a
//! broadcast feed.
//!
//! Establishment walks the endpoints in configuration order. Each endpoint is
//! dialed, probed, validated and subscribed with bounded exponential backoff
//! (see [`retry::Retrier`]); rate-limited endpoints are abandoned immediately
//! and the next one is tried.
//!
//! See `./tests` for examples.
//!
//! # Limitations/follow-ups
//!
//! * Subscriptions are emulated by polling the current slot. Future versions
//!   could use WebSocket `slotSubscribe` instead.
//!
//! * There is no automatic reconnection once a session settles in
//!   [`status::ConnectionStatus::Failed`]: binding the identity again is
//!   the only way to retry.
//!
//! # Testing
//!
//! [`testing`] module provides a scripted client surface to exercise
//! retry, failover and lifecycle behaviour without network access.
//!

pub mod client;
pub mod config;
pub mod controller;
pub mod endpoint;
pub mod error;
pub mod establish;
pub mod identity;
pub mod manager;
pub mod num;
pub mod retry;
pub mod rpc;
pub mod session;
pub mod status;
pub mod stream;
pub mod testing;
pub mod types;

use retry::{Retrier, TokioSleep};

/// Session manager over Solana JSON-RPC endpoints.
pub type RpcSessionManager = manager::SessionManager<rpc::RpcConnector, TokioSleep>;

/// Builds a session manager over the endpoints and tuning in `config`.
pub fn session_manager(config: &config::EnvConfig) -> Result<RpcSessionManager, error::SessionError> {
    let pool = config.endpoint_pool()?;
    let connector = rpc::RpcConnector::new(
        config.program_id()?,
        config.commitment,
        config.poll_interval(),
    );
    let establisher = establish::Establisher::new(
        connector,
        Retrier::new(TokioSleep),
        config.establish_config()?,
    );
    let controller = controller::FailoverController::new(pool, establisher, config.failover_config());
    Ok(manager::SessionManager::new(controller))
}

//! Surface of the wrapped SDK client the session core depends on.
//!
//! [`Connector`] dials endpoints and builds clients, [`Transport`] is the
//! live connection to one endpoint and [`SessionClient`] the stateful client
//! bound to a transport and an identity. See [`crate::rpc`] for the Solana
//! JSON-RPC implementation and [`crate::testing`] for a scripted one.

use std::fmt;

use crate::{
    endpoint::Endpoint,
    error::SessionError,
    identity::Identity,
    types::{AccountSummary, SignedOperation, TxSignature},
};

/// Operation a client may expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    Subscribe,
    Unsubscribe,
    AccountsForIdentity,
    SubmitOperation,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::AccountsForIdentity => "accounts_for_identity",
            Self::SubmitOperation => "submit_operation",
        };
        f.write_str(name)
    }
}

/// Minimum surface a client must expose to back a session.
pub const REQUIRED_CAPABILITIES: [Capability; 3] = [
    Capability::Subscribe,
    Capability::Unsubscribe,
    Capability::AccountsForIdentity,
];

/// Every capability a full client exposes.
pub const ALL_CAPABILITIES: [Capability; 4] = [
    Capability::Subscribe,
    Capability::Unsubscribe,
    Capability::AccountsForIdentity,
    Capability::SubmitOperation,
];

/// Returns the required capabilities missing from `exposed`.
pub fn missing_capabilities(exposed: &[Capability]) -> Vec<Capability> {
    REQUIRED_CAPABILITIES
        .into_iter()
        .filter(|c| !exposed.contains(c))
        .collect()
}

/// Dials endpoints and builds clients bound to them.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;
    type Client: SessionClient;

    /// Opens a transport to the endpoint.
    fn connect(
        &self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<Self::Transport, SessionError>> + Send;

    /// Constructs a client bound to the transport and identity.
    fn build_client(
        &self,
        transport: &Self::Transport,
        identity: &Identity,
    ) -> Result<Self::Client, SessionError>;
}

/// Live connection to a single endpoint.
pub trait Transport: Send + Sync + 'static {
    /// Minimal read-only call confirming the endpoint actually serves requests.
    fn health_probe(&self) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Stateful client bound to a transport and an identity.
pub trait SessionClient: Send + Sync + 'static {
    fn capabilities(&self) -> &[Capability];

    /// Subscribes to the update stream.
    ///
    /// Returns whether the subscription is actually established; `false`
    /// is reported by some clients instead of an error.
    fn subscribe(&self) -> impl Future<Output = Result<bool, SessionError>> + Send;

    fn unsubscribe(&self) -> impl Future<Output = Result<(), SessionError>> + Send;

    fn accounts_for_identity(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Vec<AccountSummary>, SessionError>> + Send;

    fn submit_operation(
        &self,
        operation: &SignedOperation,
    ) -> impl Future<Output = Result<TxSignature, SessionError>> + Send;
}

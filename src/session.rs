use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use tracing::{info, warn};

use crate::{
    client::{Connector, SessionClient},
    endpoint::Endpoint,
    identity::Identity,
    types::AccountSummary,
};

/// Live, subscribed binding between an [`Identity`] and one endpoint's client.
///
/// Built by the failover controller and handed out read-only; closing is the
/// only state change after that and happens at most once.
pub struct Session<C: Connector> {
    endpoint: Endpoint,
    identity: Identity,
    // Owns the connection the client runs over
    _transport: C::Transport,
    client: C::Client,
    subscribed: AtomicBool,
    accounts: Vec<AccountSummary>,
}

impl<C: Connector> Session<C> {
    pub(crate) fn new(
        endpoint: Endpoint,
        identity: Identity,
        transport: C::Transport,
        client: C::Client,
    ) -> Self {
        Self {
            endpoint,
            identity,
            _transport: transport,
            client,
            subscribed: AtomicBool::new(true),
            accounts: Vec::new(),
        }
    }

    pub(crate) fn set_accounts(&mut self, accounts: Vec<AccountSummary>) {
        self.accounts = accounts;
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn client(&self) -> &C::Client {
        &self.client
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }

    /// Accounts loaded right after subscribing. Empty if loading failed.
    pub fn accounts(&self) -> &[AccountSummary] {
        &self.accounts
    }

    /// Unsubscribes the client. Only the first call reaches the client;
    /// teardown failures are logged and swallowed.
    pub async fn close(&self) {
        if !self.subscribed.swap(false, Ordering::AcqRel) {
            return;
        }
        match self.client.unsubscribe().await {
            Ok(()) => info!(endpoint = %self.endpoint, identity = %self.identity, "Session closed"),
            Err(e) => warn!(
                endpoint = %self.endpoint,
                identity = %self.identity,
                %e,
                "Error unsubscribing session client"
            ),
        }
    }
}

impl<C: Connector> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("identity", &self.identity)
            .field("subscribed", &self.is_subscribed())
            .field("accounts", &self.accounts.len())
            .finish_non_exhaustive()
    }
}

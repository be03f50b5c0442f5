//! Session lifecycle: one session per bound identity, torn down whenever the
//! identity changes or the consumer lets go.

use std::sync::Arc;

use tokio::{
    sync::{Mutex, broadcast, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    client::{Connector, SessionClient},
    controller::FailoverController,
    error::SessionError,
    identity::Identity,
    retry::Sleep,
    session::Session,
    status::{StatusBoard, StatusSnapshot},
    types::{AccountSummary, OperationRequest, TxSignature},
};

struct Binding<C: Connector> {
    identity: Option<Identity>,
    in_flight: bool,
    cancel: CancellationToken,
    session: Option<Arc<Session<C>>>,
}

impl<C: Connector> Binding<C> {
    fn new() -> Self {
        Self {
            identity: None,
            in_flight: false,
            cancel: CancellationToken::new(),
            session: None,
        }
    }

    /// Invalidates the current binding, returning its session for teardown.
    ///
    /// The status is reset to idle in the same step that cancels the
    /// binding's establishment, so it cannot publish over the reset.
    fn reset(&mut self, status: &StatusBoard) -> Option<Arc<Session<C>>> {
        status.supersede(&self.cancel);
        self.identity = None;
        self.in_flight = false;
        self.session.take()
    }
}

/// Owns the session for the currently bound identity.
///
/// Binding a new identity supersedes the previous one: its in-flight
/// establishment is cancelled cooperatively (its eventual result is
/// discarded) and its active session is closed in the background.
pub struct SessionManager<C: Connector, S> {
    controller: Arc<FailoverController<C, S>>,
    binding: Arc<Mutex<Binding<C>>>,
}

impl<C: Connector, S: Sleep> SessionManager<C, S> {
    pub fn new(controller: FailoverController<C, S>) -> Self {
        Self {
            controller: Arc::new(controller),
            binding: Arc::new(Mutex::new(Binding::new())),
        }
    }

    pub fn controller(&self) -> &FailoverController<C, S> {
        &self.controller
    }

    pub fn status(&self) -> StatusSnapshot {
        self.controller.status().snapshot()
    }

    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.controller.status().watch()
    }

    pub fn transitions(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.controller.status().transitions()
    }

    /// Active session, if any.
    pub async fn session(&self) -> Option<Arc<Session<C>>> {
        self.binding.lock().await.session.clone()
    }

    /// Currently bound identity, if any.
    pub async fn identity(&self) -> Option<Identity> {
        self.binding.lock().await.identity.clone()
    }

    /// Binds `identity` and starts establishing its session.
    ///
    /// Returns `None` without doing anything if the same identity is already
    /// being established or has an active session. Otherwise returns the
    /// handle of the establishment task, which completes once the outcome is
    /// published (or discarded, if superseded meanwhile).
    pub async fn bind_identity(&self, identity: Identity) -> Option<JoinHandle<()>> {
        let mut binding = self.binding.lock().await;
        if binding.identity.as_ref() == Some(&identity)
            && (binding.in_flight || binding.session.is_some())
        {
            debug!(%identity, "Session already initializing or initialized");
            return None;
        }

        let previous = binding.reset(self.controller.status());
        let cancel = CancellationToken::new();
        binding.identity = Some(identity.clone());
        binding.in_flight = true;
        binding.cancel = cancel.clone();
        drop(binding);

        if let Some(session) = previous {
            tokio::spawn(async move { session.close().await });
        }

        info!(%identity, "Identity bound, initializing session");
        let controller = Arc::clone(&self.controller);
        let binding = Arc::clone(&self.binding);
        Some(tokio::spawn(async move {
            let result = controller.run(&identity, &cancel).await;
            let mut guard = binding.lock().await;
            if cancel.is_cancelled() {
                drop(guard);
                debug!(%identity, "Discarding outcome of superseded initialization");
                if let Ok(session) = result {
                    session.close().await;
                }
                return;
            }
            guard.in_flight = false;
            if let Ok(session) = result {
                guard.session = Some(Arc::new(session));
            }
        }))
    }

    /// Tears down the active session and forgets the bound identity.
    ///
    /// Teardown failures are logged, never returned.
    pub async fn unbind(&self) {
        let previous = self.binding.lock().await.reset(self.controller.status());
        if let Some(session) = previous {
            info!(identity = %session.identity(), "Unbinding session");
            session.close().await;
        }
    }

    /// Active session with the token that is cancelled once it is unbound.
    async fn active(&self) -> Result<(Arc<Session<C>>, CancellationToken), SessionError> {
        let binding = self.binding.lock().await;
        let session = binding.session.clone().ok_or(SessionError::NotReady)?;
        Ok((session, binding.cancel.clone()))
    }

    /// Fetches the bound identity's accounts through the active session.
    ///
    /// Retrying stops once the identity is unbound or superseded.
    pub async fn refresh_accounts(&self) -> Result<Vec<AccountSummary>, SessionError> {
        let (session, cancel) = self.active().await?;
        let client = session.client();
        let identity = session.identity();
        self.controller
            .establisher()
            .retrier()
            .execute(
                &self.controller.establisher().config().retry,
                session.endpoint().as_str(),
                &cancel,
                move || client.accounts_for_identity(identity),
            )
            .await
    }

    /// Signs `request` with the bound identity and submits it through the
    /// active session.
    ///
    /// The transaction is signed once; only sending is retried.
    pub async fn submit_operation(
        &self,
        request: OperationRequest,
    ) -> Result<TxSignature, SessionError> {
        let (session, cancel) = self.active().await?;
        let signed = session
            .identity()
            .signer()
            .sign_transaction(request.transaction().to_vec())
            .await?;
        let signed = request.signed(signed);

        let client = session.client();
        let signed = &signed;
        let signature = self
            .controller
            .establisher()
            .retrier()
            .execute(
                &self.controller.establisher().config().retry,
                session.endpoint().as_str(),
                &cancel,
                move || client.submit_operation(signed),
            )
            .await?;
        info!(endpoint = %session.endpoint(), %signature, "Operation submitted");
        Ok(signature)
    }
}

impl<C: Connector, S> Drop for SessionManager<C, S> {
    fn drop(&mut self) {
        if let Ok(mut binding) = self.binding.try_lock() {
            if let Some(session) = binding.reset(self.controller.status()) {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move { session.close().await });
                } else {
                    warn!("No runtime to close the active session on drop");
                }
            }
        }
    }
}

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    client::{Connector, SessionClient},
    endpoint::{Endpoint, EndpointPool},
    error::{ErrorKind, EstablishStep, SessionError},
    establish::{self, Establisher},
    identity::Identity,
    retry::Sleep,
    session::Session,
    status::{ConnectionStatus, StatusBoard, StatusSnapshot},
};

/// Timing of the failover loop itself.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FailoverConfig {
    /// Fixed pause before moving to the next endpoint.
    pub endpoint_switch_delay: Duration,
    /// Pause between subscribing and loading the identity's accounts.
    pub accounts_delay: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            endpoint_switch_delay: Duration::from_secs(1),
            accounts_delay: Duration::from_secs(2),
        }
    }
}

/// Walks the endpoint pool, one endpoint at a time, until a session is
/// established or the pool is exhausted.
#[derive(Debug)]
pub struct FailoverController<C, S> {
    pool: EndpointPool,
    establisher: Establisher<C, S>,
    config: FailoverConfig,
    status: StatusBoard,
}

impl<C, S> FailoverController<C, S> {
    pub fn status(&self) -> &StatusBoard {
        &self.status
    }
}

impl<C: Connector, S: Sleep> FailoverController<C, S> {
    pub fn new(pool: EndpointPool, establisher: Establisher<C, S>, config: FailoverConfig) -> Self {
        Self {
            pool,
            establisher,
            config,
            status: StatusBoard::new(),
        }
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn establisher(&self) -> &Establisher<C, S> {
        &self.establisher
    }

    /// Establishes a session for `identity`, failing over across the pool.
    ///
    /// Nothing is published once `cancel` fires. On terminal failure the
    /// status settles in [`ConnectionStatus::Failed`] and the last error is
    /// returned; there is no automatic retry after that.
    pub async fn run(
        &self,
        identity: &Identity,
        cancel: &CancellationToken,
    ) -> Result<Session<C>, SessionError> {
        let endpoints = self.pool.list_endpoints();
        let sleep = self.establisher.retrier().sleeper();
        let mut last_error = None;

        for (index, endpoint) in endpoints.iter().enumerate() {
            if index > 0 {
                sleep.sleep(self.config.endpoint_switch_delay).await;
                establish::ensure_current(cancel)?;
            }
            info!(
                %endpoint,
                attempt = index + 1,
                endpoints = endpoints.len(),
                %identity,
                "Attempting session initialization"
            );
            self.publish(cancel, ConnectionStatus::Connecting, endpoint, None);

            let result = self
                .establisher
                .establish(endpoint, identity, cancel, |step| {
                    if step == EstablishStep::Subscribe {
                        self.publish(cancel, ConnectionStatus::Subscribing, endpoint, None);
                    }
                })
                .await;

            let err = match result {
                Ok(session) => return self.finish(session, cancel).await,
                Err(err) => err,
            };
            if err.is_cancelled() || cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            match err.kind() {
                ErrorKind::Fatal | ErrorKind::Configuration => {
                    error!(%endpoint, %err, "Session initialization failed, not retrying");
                    self.publish(cancel, ConnectionStatus::Failed, endpoint, Some(err.to_string()));
                    return Err(err);
                }
                ErrorKind::RateLimited | ErrorKind::Rejected | ErrorKind::NullState => {
                    warn!(%endpoint, %err, "Endpoint unusable, trying next endpoint");
                }
                _ => {
                    warn!(%endpoint, %err, "Failed to initialize after retries, trying next endpoint");
                }
            }
            last_error = Some(err);
        }

        let err = last_error.unwrap_or_else(|| {
            SessionError::Configuration("no RPC endpoint configured".to_string())
        });
        let message = format!(
            "Failed to connect after trying all {} RPC endpoints. Last error: {err}",
            endpoints.len()
        );
        error!(%identity, %err, "{message}");
        if let Some(endpoint) = endpoints.last() {
            self.publish(cancel, ConnectionStatus::Failed, endpoint, Some(message));
        }
        Err(err)
    }

    /// Loads the identity's accounts into a freshly subscribed session and
    /// publishes it as ready, or degraded if the accounts could not be loaded.
    async fn finish(
        &self,
        mut session: Session<C>,
        cancel: &CancellationToken,
    ) -> Result<Session<C>, SessionError> {
        let retrier = self.establisher.retrier();
        retrier.sleeper().sleep(self.config.accounts_delay).await;
        if cancel.is_cancelled() {
            session.close().await;
            return Err(SessionError::Cancelled);
        }

        let endpoint = session.endpoint().clone();
        let client = session.client();
        let identity = session.identity();
        let accounts = retrier
            .execute(
                &self.establisher.config().retry,
                endpoint.as_str(),
                cancel,
                move || client.accounts_for_identity(identity),
            )
            .await;
        if cancel.is_cancelled() {
            session.close().await;
            return Err(SessionError::Cancelled);
        }

        match accounts {
            Ok(accounts) => {
                info!(%endpoint, accounts = accounts.len(), "Session ready");
                session.set_accounts(accounts);
                self.publish(cancel, ConnectionStatus::Ready, &endpoint, None);
            }
            Err(e) => {
                let e = e.at(EstablishStep::LoadAccounts);
                warn!(%endpoint, %e, "Failed to load accounts, continuing without them");
                self.publish(
                    cancel,
                    ConnectionStatus::FallbackDegraded,
                    &endpoint,
                    Some(e.to_string()),
                );
            }
        }
        Ok(session)
    }

    fn publish(
        &self,
        cancel: &CancellationToken,
        status: ConnectionStatus,
        endpoint: &Endpoint,
        error: Option<String>,
    ) {
        let mut snapshot = StatusSnapshot::new(status, Some(endpoint.clone()));
        snapshot.error = error;
        self.status.publish(cancel, snapshot);
    }
}

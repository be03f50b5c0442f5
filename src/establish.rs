use std::time::Duration;

use itertools::Itertools;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    client::{self, Connector, SessionClient, Transport},
    endpoint::Endpoint,
    error::{EstablishStep, SessionError},
    identity::Identity,
    retry::{Retrier, RetryPolicy, Sleep},
    session::Session,
};

/// Timing of session establishment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstablishConfig {
    pub retry: RetryPolicy,
    /// Grace period between building the client and subscribing it.
    pub settle_delay: Duration,
    /// Wall-clock limit of a single subscribe attempt.
    pub subscribe_timeout: Duration,
}

impl Default for EstablishConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            settle_delay: Duration::from_secs(5),
            subscribe_timeout: Duration::from_secs(30),
        }
    }
}

/// Opens a transport to an endpoint, probes it and binds a subscribed
/// client to it.
#[derive(Debug)]
pub struct Establisher<C, S> {
    connector: C,
    retrier: Retrier<S>,
    config: EstablishConfig,
}

impl<C: Connector, S: Sleep> Establisher<C, S> {
    pub fn new(connector: C, retrier: Retrier<S>, config: EstablishConfig) -> Self {
        Self {
            connector,
            retrier,
            config,
        }
    }

    pub fn retrier(&self) -> &Retrier<S> {
        &self.retrier
    }

    pub fn config(&self) -> &EstablishConfig {
        &self.config
    }

    /// Establishes a ready session on `endpoint` for `identity`.
    ///
    /// `on_step` is invoked as each step starts. The cancellation token is
    /// checked after every suspension point; a cancelled attempt unsubscribes
    /// whatever it managed to subscribe and reports [`SessionError::Cancelled`].
    pub async fn establish(
        &self,
        endpoint: &Endpoint,
        identity: &Identity,
        cancel: &CancellationToken,
        mut on_step: impl FnMut(EstablishStep) + Send,
    ) -> Result<Session<C>, SessionError> {
        let policy = &self.config.retry;
        let label = endpoint.as_str();

        on_step(EstablishStep::Connect);
        let connector = &self.connector;
        let transport = self
            .retrier
            .execute(policy, label, cancel, move || async move {
                info!(%endpoint, "Connecting to RPC");
                let transport = connector.connect(endpoint).await?;
                transport.health_probe().await?;
                Ok(transport)
            })
            .await
            .map_err(|e| e.at(EstablishStep::Connect))?;
        ensure_current(cancel)?;
        info!(%endpoint, "Connected to RPC");

        on_step(EstablishStep::Validate);
        let client = self
            .connector
            .build_client(&transport, identity)
            .map_err(|e| e.at(EstablishStep::Validate))?;
        let missing = client::missing_capabilities(client.capabilities());
        if !missing.is_empty() {
            return Err(SessionError::Fatal(format!(
                "malformed client, missing: {}",
                missing.iter().join(", ")
            ))
            .at(EstablishStep::Validate));
        }

        on_step(EstablishStep::Subscribe);
        self.retrier.sleeper().sleep(self.config.settle_delay).await;
        ensure_current(cancel)?;

        let timeout = self.config.subscribe_timeout;
        let subscriber = &client;
        self.retrier
            .execute(policy, label, cancel, move || async move {
                debug!(%endpoint, "Subscribing client");
                match tokio::time::timeout(timeout, subscriber.subscribe()).await {
                    Ok(Ok(true)) => Ok(()),
                    Ok(Ok(false)) => Err(SessionError::NullState(
                        "client reported subscription as not established".to_string(),
                    )),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(SessionError::Timeout(timeout)),
                }
            })
            .await
            .map_err(|e| e.at(EstablishStep::Subscribe))?;

        let session = Session::new(endpoint.clone(), identity.clone(), transport, client);
        if cancel.is_cancelled() {
            session.close().await;
            return Err(SessionError::Cancelled);
        }
        info!(%endpoint, %identity, "Client subscribed");
        Ok(session)
    }
}

pub(crate) fn ensure_current(cancel: &CancellationToken) -> Result<(), SessionError> {
    if cancel.is_cancelled() {
        Err(SessionError::Cancelled)
    } else {
        Ok(())
    }
}

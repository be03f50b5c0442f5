//! Scripted client surface and test utilities.
//!
//! [`MockConnector`] implements [`Connector`] over in-memory endpoints whose
//! behaviour is scripted per endpoint and per [`Call`]: every call pops the
//! next [`Reply`] from its script and succeeds once the script runs dry.
//! Calls are counted so tests can assert how often each endpoint was hit.
//!
//! [`RecordingSleep`] records requested delays and returns immediately, which
//! keeps retry and failover tests fast and lets them assert the backoff.
//!

use std::{
    collections::VecDeque,
    future,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::Notify;

use crate::{
    client::{ALL_CAPABILITIES, Capability, Connector, SessionClient, Transport},
    controller::{FailoverConfig, FailoverController},
    endpoint::{Endpoint, EndpointPool},
    error::SessionError,
    establish::{EstablishConfig, Establisher},
    identity::{Identity, Signer},
    manager::SessionManager,
    retry::{Retrier, RetryPolicy, Sleep},
    types::{AccountSummary, Pubkey, SignedOperation, TxSignature},
};

pub const RETRY_DELAY: Duration = Duration::from_millis(10);
pub const SETTLE_DELAY: Duration = Duration::from_millis(5);
pub const SWITCH_DELAY: Duration = Duration::from_millis(1);
pub const ACCOUNTS_DELAY: Duration = Duration::from_millis(2);
pub const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(30);

/// [`Sleep`] recording every requested delay without actually sleeping.
#[derive(Clone, Debug, Default)]
pub struct RecordingSleep {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleep {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleep for RecordingSleep {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.delays.lock().unwrap().push(duration);
        future::ready(())
    }
}

/// Scriptable client surface call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Call {
    Connect,
    Probe,
    Subscribe,
    Unsubscribe,
    Accounts,
    Submit,
}

/// Failure an endpoint can be scripted to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    RateLimited,
    Transient,
    NullState,
    Rejected,
}

impl From<Fault> for SessionError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::RateLimited => SessionError::RateLimited("429 Too Many Requests".to_string()),
            Fault::Transient => SessionError::Transient("connection reset by peer".to_string()),
            Fault::NullState => SessionError::NullState("client connection is null".to_string()),
            Fault::Rejected => SessionError::Rejected("HTTP error 403: Forbidden".to_string()),
        }
    }
}

/// Scripted outcome of a single call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Fail(Fault),
    /// Never completes.
    Hang,
    /// Subscribe completes without establishing the subscription.
    NotSubscribed,
}

impl Reply {
    async fn resolve(self) -> Result<bool, SessionError> {
        match self {
            Reply::Ok => Ok(true),
            Reply::Fail(fault) => Err(fault.into()),
            Reply::Hang => future::pending().await,
            Reply::NotSubscribed => Ok(false),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    scripts: DashMap<(Endpoint, Call), VecDeque<Reply>>,
    calls: DashMap<(Endpoint, Call), usize>,
    capabilities: DashMap<Endpoint, Vec<Capability>>,
    accounts: DashMap<Endpoint, Vec<AccountSummary>>,
    gates: DashMap<Endpoint, Arc<Notify>>,
    dials: Mutex<Vec<Endpoint>>,
}

impl State {
    fn next(&self, endpoint: &Endpoint, call: Call) -> Reply {
        let key = (endpoint.clone(), call);
        *self.calls.entry(key.clone()).or_default() += 1;
        self.scripts
            .get_mut(&key)
            .and_then(|mut script| script.pop_front())
            .unwrap_or(Reply::Ok)
    }
}

/// In-memory [`Connector`] with per-endpoint scripted behaviour.
///
/// Clones share scripts and counters.
#[derive(Clone, Debug, Default)]
pub struct MockConnector {
    state: Arc<State>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends replies to the script of `call` on `endpoint`.
    pub fn script(&self, endpoint: &str, call: Call, replies: impl IntoIterator<Item = Reply>) {
        self.state
            .scripts
            .entry((endpoint.into(), call))
            .or_default()
            .extend(replies);
    }

    /// Makes `call` on `endpoint` fail the next `times` times.
    pub fn fail(&self, endpoint: &str, call: Call, fault: Fault, times: usize) {
        self.script(endpoint, call, std::iter::repeat_n(Reply::Fail(fault), times));
    }

    /// Capabilities exposed by clients built for `endpoint`; all of them by default.
    pub fn set_capabilities(&self, endpoint: &str, capabilities: Vec<Capability>) {
        self.state.capabilities.insert(endpoint.into(), capabilities);
    }

    /// Accounts reported on `endpoint`; a single [`account`] of the identity by default.
    pub fn set_accounts(&self, endpoint: &str, accounts: Vec<AccountSummary>) {
        self.state.accounts.insert(endpoint.into(), accounts);
    }

    /// Holds the next dial of `endpoint` until the returned gate is notified.
    pub fn gate(&self, endpoint: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.gates.insert(endpoint.into(), Arc::clone(&gate));
        gate
    }

    pub fn calls(&self, endpoint: &str, call: Call) -> usize {
        self.state
            .calls
            .get(&(Endpoint::from(endpoint), call))
            .map(|count| *count)
            .unwrap_or_default()
    }

    /// Endpoints in the order they were dialed.
    pub fn dials(&self) -> Vec<Endpoint> {
        self.state.dials.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;
    type Client = MockClient;

    async fn connect(&self, endpoint: &Endpoint) -> Result<MockTransport, SessionError> {
        self.state.dials.lock().unwrap().push(endpoint.clone());
        let gate = self.state.gates.remove(endpoint).map(|(_, gate)| gate);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.state.next(endpoint, Call::Connect).resolve().await?;
        Ok(MockTransport {
            endpoint: endpoint.clone(),
            state: Arc::clone(&self.state),
        })
    }

    fn build_client(
        &self,
        transport: &MockTransport,
        identity: &Identity,
    ) -> Result<MockClient, SessionError> {
        let capabilities = self
            .state
            .capabilities
            .get(&transport.endpoint)
            .map(|c| c.value().clone())
            .unwrap_or_else(|| ALL_CAPABILITIES.to_vec());
        Ok(MockClient {
            endpoint: transport.endpoint.clone(),
            identity: identity.clone(),
            capabilities,
            state: Arc::clone(&self.state),
        })
    }
}

#[derive(Debug)]
pub struct MockTransport {
    endpoint: Endpoint,
    state: Arc<State>,
}

impl Transport for MockTransport {
    async fn health_probe(&self) -> Result<(), SessionError> {
        self.state.next(&self.endpoint, Call::Probe).resolve().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockClient {
    endpoint: Endpoint,
    identity: Identity,
    capabilities: Vec<Capability>,
    state: Arc<State>,
}

impl MockClient {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl SessionClient for MockClient {
    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn subscribe(&self) -> Result<bool, SessionError> {
        self.state.next(&self.endpoint, Call::Subscribe).resolve().await
    }

    async fn unsubscribe(&self) -> Result<(), SessionError> {
        self.state.next(&self.endpoint, Call::Unsubscribe).resolve().await?;
        Ok(())
    }

    async fn accounts_for_identity(
        &self,
        identity: &Identity,
    ) -> Result<Vec<AccountSummary>, SessionError> {
        self.state.next(&self.endpoint, Call::Accounts).resolve().await?;
        Ok(self
            .state
            .accounts
            .get(&self.endpoint)
            .map(|a| a.value().clone())
            .unwrap_or_else(|| vec![account(identity)]))
    }

    async fn submit_operation(&self, operation: &SignedOperation) -> Result<TxSignature, SessionError> {
        self.state.next(&self.endpoint, Call::Submit).resolve().await?;
        Ok(bs58::encode(operation.transaction()).into_string())
    }
}

/// Signer prefixing transactions with a fixed 64-byte signature.
#[derive(Debug)]
pub struct TestSigner {
    seed: u8,
    signatures: AtomicUsize,
}

impl TestSigner {
    pub fn new(seed: u8) -> Self {
        Self {
            seed,
            signatures: AtomicUsize::new(0),
        }
    }

    /// Number of transactions signed so far.
    pub fn signatures(&self) -> usize {
        self.signatures.load(Ordering::SeqCst)
    }
}

impl Signer for TestSigner {
    fn sign_transaction(&self, tx: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>, SessionError>> {
        self.signatures.fetch_add(1, Ordering::SeqCst);
        let mut signed = vec![self.seed; 64];
        signed.extend(tx);
        Box::pin(future::ready(Ok(signed)))
    }
}

/// Identity with public key `[seed; 32]` and a [`TestSigner`].
pub fn identity(seed: u8) -> Identity {
    signing_identity(seed).0
}

pub fn signing_identity(seed: u8) -> (Identity, Arc<TestSigner>) {
    let signer = Arc::new(TestSigner::new(seed));
    let identity = Identity::new(Pubkey::new([seed; 32]), signer.clone());
    (identity, signer)
}

/// Default account reported for `identity`.
pub fn account(identity: &Identity) -> AccountSummary {
    let mut address = identity.public_key().to_bytes();
    address[0] ^= 0xff;
    AccountSummary::new(Pubkey::new(address), identity.public_key(), "Main Account", 35_143_680)
}

/// Establishment timing with short, distinguishable delays and no jitter.
pub fn establish_config(max_attempts: u32) -> EstablishConfig {
    EstablishConfig {
        retry: RetryPolicy {
            max_attempts,
            initial_delay: RETRY_DELAY,
            max_delay: RETRY_DELAY * 4,
            jitter_fraction: 0.0,
        },
        settle_delay: SETTLE_DELAY,
        subscribe_timeout: SUBSCRIBE_TIMEOUT,
    }
}

pub fn failover_config() -> FailoverConfig {
    FailoverConfig {
        endpoint_switch_delay: SWITCH_DELAY,
        accounts_delay: ACCOUNTS_DELAY,
    }
}

/// Failover controller over `endpoints` backed by `connector`.
pub fn controller<S: Sleep>(
    connector: MockConnector,
    sleep: S,
    endpoints: &[&str],
    max_attempts: u32,
) -> FailoverController<MockConnector, S> {
    let pool = EndpointPool::new(endpoints).unwrap();
    let establisher = Establisher::new(connector, Retrier::new(sleep), establish_config(max_attempts));
    FailoverController::new(pool, establisher, failover_config())
}

pub fn manager<S: Sleep>(
    connector: MockConnector,
    sleep: S,
    endpoints: &[&str],
    max_attempts: u32,
) -> SessionManager<MockConnector, S> {
    SessionManager::new(controller(connector, sleep, endpoints, max_attempts))
}

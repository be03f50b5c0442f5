//! Solana JSON-RPC implementation of the client surface.
//!
//! Uses the generic JSON-RPC client from `alloy` over HTTP. Subscriptions are
//! emulated by polling the current slot (see [`crate::stream::slots`]), the
//! same way log streams are kept continuous on EVM chains.

use std::{pin::pin, sync::Arc, time::Duration};

use alloy::rpc::client::RpcClient;
use base64::{Engine, engine::general_purpose::STANDARD};
use futures::StreamExt;
use serde_json::json;
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    client::{ALL_CAPABILITIES, Capability, Connector, SessionClient, Transport},
    endpoint::Endpoint,
    error::SessionError,
    identity::Identity,
    stream,
    types::{AccountSummary, Commitment, Pubkey, SignedOperation, TxSignature},
};

/// Drift program on devnet and mainnet-beta.
pub const DRIFT_PROGRAM_ID: &str = "dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH";

/// Offset of the authority key in a Drift `User` account.
const USER_AUTHORITY_OFFSET: usize = 8;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpochInfo {
    absolute_slot: u64,
    epoch: u64,
}

#[derive(Debug, serde::Deserialize)]
struct KeyedAccount {
    pubkey: String,
    account: EncodedAccount,
}

#[derive(Debug, serde::Deserialize)]
struct EncodedAccount {
    lamports: u64,
    /// `[data, encoding]`
    data: (String, String),
}

pub(crate) async fn get_slot(client: &RpcClient, commitment: Commitment) -> Result<u64, SessionError> {
    let slot = client
        .request("getSlot", vec![json!({ "commitment": commitment.as_str() })])
        .await?;
    Ok(slot)
}

/// Dials Solana RPC endpoints over HTTP.
#[derive(Clone, Debug)]
pub struct RpcConnector {
    program_id: Pubkey,
    commitment: Commitment,
    poll_interval: Duration,
}

impl RpcConnector {
    pub fn new(program_id: Pubkey, commitment: Commitment, poll_interval: Duration) -> Self {
        Self {
            program_id,
            commitment,
            poll_interval,
        }
    }
}

impl Connector for RpcConnector {
    type Transport = RpcTransport;
    type Client = RpcSessionClient;

    async fn connect(&self, endpoint: &Endpoint) -> Result<RpcTransport, SessionError> {
        let url = Url::parse(endpoint.as_str())?;
        Ok(RpcTransport {
            client: RpcClient::new_http(url),
            commitment: self.commitment,
        })
    }

    fn build_client(
        &self,
        transport: &RpcTransport,
        _identity: &Identity,
    ) -> Result<RpcSessionClient, SessionError> {
        Ok(RpcSessionClient {
            client: transport.client.clone(),
            program_id: self.program_id,
            commitment: self.commitment,
            poll_interval: self.poll_interval,
            slot: Arc::new(watch::channel(None).0),
            poller: Mutex::new(None),
        })
    }
}

/// HTTP connection to one RPC endpoint.
#[derive(Debug)]
pub struct RpcTransport {
    client: RpcClient,
    commitment: Commitment,
}

impl RpcTransport {
    pub fn client(&self) -> &RpcClient {
        &self.client
    }
}

impl Transport for RpcTransport {
    async fn health_probe(&self) -> Result<(), SessionError> {
        let info: EpochInfo = self
            .client
            .request(
                "getEpochInfo",
                vec![json!({ "commitment": self.commitment.as_str() })],
            )
            .await?;
        debug!(epoch = info.epoch, slot = info.absolute_slot, "RPC health probe passed");
        Ok(())
    }
}

/// Client for Drift accounts over Solana JSON-RPC.
#[derive(Debug)]
pub struct RpcSessionClient {
    client: RpcClient,
    program_id: Pubkey,
    commitment: Commitment,
    poll_interval: Duration,
    slot: Arc<watch::Sender<Option<u64>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl RpcSessionClient {
    /// Latest slot seen by the subscription, `None` while unsubscribed.
    pub fn slot(&self) -> watch::Receiver<Option<u64>> {
        self.slot.subscribe()
    }
}

impl SessionClient for RpcSessionClient {
    fn capabilities(&self) -> &[Capability] {
        &ALL_CAPABILITIES
    }

    async fn subscribe(&self) -> Result<bool, SessionError> {
        let mut poller = self.poller.lock().await;
        if poller.is_some() {
            return Ok(true);
        }
        let slot = get_slot(&self.client, self.commitment).await?;
        self.slot.send_replace(Some(slot));

        let slots = stream::slots(
            self.client.clone(),
            self.commitment,
            self.poll_interval,
            tokio::time::sleep,
        );
        let sender = Arc::clone(&self.slot);
        *poller = Some(tokio::spawn(async move {
            let mut slots = pin!(slots);
            while let Some(slot) = slots.next().await {
                match slot {
                    Ok(slot) => {
                        sender.send_replace(Some(slot));
                    }
                    Err(e) => warn!(%e, "Slot poll failed"),
                }
            }
        }));
        debug!(slot, "Subscribed to slot updates");
        Ok(true)
    }

    async fn unsubscribe(&self) -> Result<(), SessionError> {
        if let Some(poller) = self.poller.lock().await.take() {
            poller.abort();
        }
        self.slot.send_replace(None);
        Ok(())
    }

    async fn accounts_for_identity(
        &self,
        identity: &Identity,
    ) -> Result<Vec<AccountSummary>, SessionError> {
        let params = json!([
            self.program_id.to_string(),
            {
                "encoding": "base64",
                "commitment": self.commitment.as_str(),
                "filters": [
                    { "memcmp": { "offset": USER_AUTHORITY_OFFSET, "bytes": identity.public_key().to_string() } }
                ]
            }
        ]);
        let accounts: Vec<KeyedAccount> = self.client.request("getProgramAccounts", params).await?;
        Ok(accounts.into_iter().filter_map(decode_user_account).collect())
    }

    async fn submit_operation(&self, operation: &SignedOperation) -> Result<TxSignature, SessionError> {
        let params = json!([
            STANDARD.encode(operation.transaction()),
            {
                "encoding": "base64",
                "skipPreflight": operation.skip_preflight(),
                "preflightCommitment": self.commitment.as_str()
            }
        ]);
        let signature: TxSignature = self.client.request("sendTransaction", params).await?;
        Ok(signature)
    }
}

impl Drop for RpcSessionClient {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.get_mut().take() {
            poller.abort();
        }
    }
}

fn decode_user_account(keyed: KeyedAccount) -> Option<AccountSummary> {
    let address = match keyed.pubkey.parse::<Pubkey>() {
        Ok(address) => address,
        Err(e) => {
            warn!(pubkey = %keyed.pubkey, %e, "Skipping account with invalid address");
            return None;
        }
    };
    let (data, encoding) = &keyed.account.data;
    if encoding != "base64" {
        warn!(%address, %encoding, "Skipping account with unexpected encoding");
        return None;
    }
    let data = match STANDARD.decode(data) {
        Ok(data) => data,
        Err(e) => {
            warn!(%address, %e, "Skipping account with undecodable data");
            return None;
        }
    };
    let account = AccountSummary::from_user_account(address, keyed.account.lamports, &data);
    if account.is_none() {
        warn!(%address, len = data.len(), "Skipping account too short to be a Drift user");
    }
    account
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(pubkey: &str, data: Vec<u8>, encoding: &str) -> KeyedAccount {
        KeyedAccount {
            pubkey: pubkey.to_string(),
            account: EncodedAccount {
                lamports: 35_143_680,
                data: (STANDARD.encode(data), encoding.to_string()),
            },
        }
    }

    #[test]
    fn test_decode_user_account() {
        let mut data = vec![0u8; 200];
        data[8..40].copy_from_slice(&[9; 32]);
        data[72..79].copy_from_slice(b"Primary");

        let account = decode_user_account(keyed(DRIFT_PROGRAM_ID, data, "base64")).unwrap();
        assert_eq!(account.address().to_string(), DRIFT_PROGRAM_ID);
        assert_eq!(account.authority(), Pubkey::new([9; 32]));
        assert_eq!(account.name(), "Primary");
    }

    #[test]
    fn test_decode_skips_malformed_accounts() {
        assert!(decode_user_account(keyed("not-base58!", vec![0; 200], "base64")).is_none());
        assert!(decode_user_account(keyed(DRIFT_PROGRAM_ID, vec![0; 200], "base58")).is_none());
        assert!(decode_user_account(keyed(DRIFT_PROGRAM_ID, vec![0; 16], "base64")).is_none());
    }

    #[test]
    fn test_program_accounts_response_shape() {
        let raw = json!([{
            "pubkey": DRIFT_PROGRAM_ID,
            "account": {
                "lamports": 35143680,
                "owner": DRIFT_PROGRAM_ID,
                "data": [STANDARD.encode([0u8; 104]), "base64"],
                "executable": false,
                "rentEpoch": 18446744073709551615u64,
                "space": 104
            }
        }]);
        let accounts: Vec<KeyedAccount> = serde_json::from_value(raw).unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(decode_user_account(accounts.into_iter().next().unwrap()).is_some());
    }

    #[tokio::test]
    #[ignore = "requires access to Solana devnet"]
    async fn test_devnet_session_client() {
        let connector = RpcConnector::new(
            DRIFT_PROGRAM_ID.parse().unwrap(),
            Commitment::Confirmed,
            Duration::from_millis(400),
        );
        let transport = connector
            .connect(&"https://api.devnet.solana.com".into())
            .await
            .unwrap();
        transport.health_probe().await.unwrap();

        let identity = Identity::watch_only(Pubkey::new([1; 32]));
        let client = connector.build_client(&transport, &identity).unwrap();
        assert!(client.subscribe().await.unwrap());
        assert!(client.slot().borrow().is_some());
        let accounts = client.accounts_for_identity(&identity).await.unwrap();
        assert!(accounts.is_empty());
        client.unsubscribe().await.unwrap();
        assert!(client.slot().borrow().is_none());
    }
}

use std::{fmt, sync::Arc};

use futures::future::{self, BoxFuture};

use crate::{error::SessionError, types::Pubkey};

/// Signing capability supplied by the wallet collaborator.
///
/// The session only invokes it when a submitted operation needs a signature;
/// it is never persisted or transmitted.
pub trait Signer: Send + Sync {
    fn sign_transaction(&self, tx: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>, SessionError>>;

    fn sign_all_transactions(
        &self,
        txs: Vec<Vec<u8>>,
    ) -> BoxFuture<'_, Result<Vec<Vec<u8>>, SessionError>> {
        Box::pin(async move {
            let mut signed = Vec::with_capacity(txs.len());
            for tx in txs {
                signed.push(self.sign_transaction(tx).await?);
            }
            Ok(signed)
        })
    }
}

/// Signer of a wallet that is only observed, refusing every request.
#[derive(Clone, Copy, Debug, Default)]
pub struct WatchOnly;

impl Signer for WatchOnly {
    fn sign_transaction(&self, _tx: Vec<u8>) -> BoxFuture<'_, Result<Vec<u8>, SessionError>> {
        Box::pin(future::ready(Err(SessionError::Signing(
            "watch-only identity can not sign".to_string(),
        ))))
    }
}

/// Who is connecting: wallet public key plus signing capability.
///
/// Identities compare by public key only.
#[derive(Clone, derive_more::Debug)]
pub struct Identity {
    #[debug("{public_key}")]
    public_key: Pubkey,
    #[debug(skip)]
    signer: Arc<dyn Signer>,
}

impl Identity {
    pub fn new(public_key: Pubkey, signer: Arc<dyn Signer>) -> Self {
        Self { public_key, signer }
    }

    pub fn watch_only(public_key: Pubkey) -> Self {
        Self::new(public_key, Arc::new(WatchOnly))
    }

    pub fn public_key(&self) -> Pubkey {
        self.public_key
    }

    pub fn signer(&self) -> &dyn Signer {
        self.signer.as_ref()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for Identity {}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.public_key, f)
    }
}

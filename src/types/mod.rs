mod account;
mod operation;
mod pubkey;

pub use account::AccountSummary;
pub use operation::{OperationRequest, SignedOperation};
pub use pubkey::{Pubkey, PubkeyParseError};

/// Base58 encoded transaction signature returned by the cluster.
pub type TxSignature = String;

/// Commitment level requests are made with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

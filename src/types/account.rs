use fastnum::UD128;

use super::Pubkey;
use crate::num;

const DISCRIMINATOR_LEN: usize = 8;
const AUTHORITY_OFFSET: usize = DISCRIMINATOR_LEN;
const NAME_OFFSET: usize = AUTHORITY_OFFSET + 32 + 32; // authority, delegate
const NAME_LEN: usize = 32;

/// Drift user account owned by an identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountSummary {
    address: Pubkey,
    authority: Pubkey,
    name: String,
    lamports: u64,
}

impl AccountSummary {
    pub fn new(address: Pubkey, authority: Pubkey, name: impl Into<String>, lamports: u64) -> Self {
        Self {
            address,
            authority,
            name: name.into(),
            lamports,
        }
    }

    /// Decodes the leading fields of a raw Drift `User` account.
    ///
    /// Returns `None` if the data is too short to hold them.
    pub fn from_user_account(address: Pubkey, lamports: u64, data: &[u8]) -> Option<Self> {
        let authority = Pubkey::read(data.get(AUTHORITY_OFFSET..)?)?;
        let name = data.get(NAME_OFFSET..NAME_OFFSET + NAME_LEN)?;
        // Names are fixed-width, padded with zeroes and/or spaces
        let name = String::from_utf8_lossy(name)
            .replace('\0', "")
            .trim()
            .to_string();
        Some(Self::new(address, authority, name, lamports))
    }

    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn authority(&self) -> Pubkey {
        self.authority
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lamports(&self) -> u64 {
        self.lamports
    }

    /// Account rent balance in SOL.
    pub fn balance(&self) -> UD128 {
        num::Converter::sol().from_units(self.lamports)
    }
}

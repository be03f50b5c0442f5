use std::{fmt, str::FromStr};

/// 32-byte ed25519 public key, displayed in base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pubkey([u8; 32]);

#[derive(Debug, thiserror::Error)]
pub enum PubkeyParseError {
    #[error("invalid base58: {0}")]
    Encoding(#[from] bs58::decode::Error),

    #[error("expected 32 bytes, got {0}")]
    Length(usize),
}

impl Pubkey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Reads a key from the first 32 bytes of `data`.
    pub fn read(data: &[u8]) -> Option<Self> {
        data.get(..32)
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .map(Self)
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Pubkey {
    type Err = PubkeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s).into_vec()?;
        let len = bytes.len();
        <[u8; 32]>::try_from(bytes)
            .map(Self)
            .map_err(|_| PubkeyParseError::Length(len))
    }
}

impl From<[u8; 32]> for Pubkey {
    fn from(value: [u8; 32]) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubkey_base58() {
        let key: Pubkey = "dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH".parse().unwrap();
        assert_eq!(key.to_string(), "dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH");
        assert_eq!(Pubkey::default().to_string(), "11111111111111111111111111111111");
    }

    #[test]
    fn test_pubkey_invalid() {
        assert!(matches!("0OIl".parse::<Pubkey>(), Err(PubkeyParseError::Encoding(_))));
        assert!(matches!("2g".parse::<Pubkey>(), Err(PubkeyParseError::Length(_))));
    }
}

//! Environment configuration.
//!
//! Endpoints come from `RPC_URL`, `BACKUP_RPC_URL` and `FALLBACK_RPC_URL`, tried
//! in that order. The public devnet endpoint is only added when
//! `USE_PUBLIC_DEVNET` is set. Everything else is tuning with defaults.

use std::time::Duration;

use url::Url;

use crate::{
    controller::FailoverConfig,
    endpoint::EndpointPool,
    error::SessionError,
    establish::EstablishConfig,
    retry::RetryPolicy,
    rpc,
    types::{Commitment, Pubkey},
};

/// Public Solana devnet endpoint.
pub const PUBLIC_DEVNET_URL: &str = "https://api.devnet.solana.com";

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_fraction() -> f64 {
    0.2
}

fn default_endpoint_switch_delay_ms() -> u64 {
    1_000
}

fn default_settle_delay_ms() -> u64 {
    5_000
}

fn default_accounts_delay_ms() -> u64 {
    2_000
}

fn default_subscribe_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    400
}

fn default_program_id() -> String {
    rpc::DRIFT_PROGRAM_ID.to_string()
}

/// Environment configuration (endpoints and tuning).
#[derive(Clone, Debug, serde::Deserialize)]
pub struct EnvConfig {
    /// Primary RPC URL
    pub rpc_url: Option<String>,

    /// Secondary RPC URL, e.g. a dedicated provider
    pub backup_rpc_url: Option<String>,

    /// Last resort RPC URL
    pub fallback_rpc_url: Option<String>,

    /// Append the public devnet endpoint to the configured ones
    #[serde(default)]
    pub use_public_devnet: bool,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,

    #[serde(default = "default_endpoint_switch_delay_ms")]
    pub endpoint_switch_delay_ms: u64,

    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_accounts_delay_ms")]
    pub accounts_delay_ms: u64,

    #[serde(default = "default_subscribe_timeout_ms")]
    pub subscribe_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub commitment: Commitment,

    /// Drift program ID
    #[serde(default = "default_program_id")]
    pub program_id: String,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, SessionError> {
        Ok(envy::from_env()?)
    }

    /// Load configuration from explicit key/value pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::from_iter(pairs)?)
    }

    /// Builds the endpoint pool. Every configured URL must parse.
    pub fn endpoint_pool(&self) -> Result<EndpointPool, SessionError> {
        let mut entries: Vec<&str> = [&self.rpc_url, &self.backup_rpc_url, &self.fallback_rpc_url]
            .into_iter()
            .flatten()
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
            .collect();
        if self.use_public_devnet {
            entries.push(PUBLIC_DEVNET_URL);
        }
        for entry in &entries {
            Url::parse(entry).map_err(|e| {
                SessionError::Configuration(format!("invalid RPC URL {entry:?}: {e}"))
            })?;
        }
        EndpointPool::new(entries)
    }

    pub fn program_id(&self) -> Result<Pubkey, SessionError> {
        self.program_id
            .parse()
            .map_err(|e| SessionError::Configuration(format!("invalid program ID: {e}")))
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, SessionError> {
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(SessionError::Configuration(format!(
                "jitter fraction must be within [0, 1], got {}",
                self.jitter_fraction
            )));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(SessionError::Configuration(
                "initial retry delay exceeds max retry delay".to_string(),
            ));
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter_fraction: self.jitter_fraction,
        })
    }

    pub fn establish_config(&self) -> Result<EstablishConfig, SessionError> {
        Ok(EstablishConfig {
            retry: self.retry_policy()?,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            subscribe_timeout: Duration::from_millis(self.subscribe_timeout_ms),
        })
    }

    pub fn failover_config(&self) -> FailoverConfig {
        FailoverConfig {
            endpoint_switch_delay: Duration::from_millis(self.endpoint_switch_delay_ms),
            accounts_delay: Duration::from_millis(self.accounts_delay_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{endpoint::Endpoint, error::ErrorKind};

    fn load(pairs: &[(&str, &str)]) -> Result<EnvConfig, SessionError> {
        EnvConfig::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    #[test]
    fn test_endpoints_in_priority_order() {
        let config = load(&[
            ("FALLBACK_RPC_URL", "https://fallback.example.com"),
            ("RPC_URL", "https://primary.example.com"),
            ("BACKUP_RPC_URL", "https://primary.example.com"),
        ])
        .unwrap();

        let pool = config.endpoint_pool().unwrap();
        assert_eq!(
            pool.list_endpoints(),
            &[
                Endpoint::from("https://primary.example.com"),
                Endpoint::from("https://fallback.example.com")
            ]
        );
    }

    #[test]
    fn test_public_devnet_is_opt_in() {
        let config = load(&[("RPC_URL", ""), ("USE_PUBLIC_DEVNET", "true")]).unwrap();
        let pool = config.endpoint_pool().unwrap();
        assert_eq!(pool.list_endpoints(), &[Endpoint::from(PUBLIC_DEVNET_URL)]);
    }

    #[test]
    fn test_no_endpoint_fails_closed() {
        let config = load(&[("RPC_URL", " ")]).unwrap();
        assert_eq!(config.endpoint_pool().unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = load(&[("RPC_URL", "not a url")]).unwrap();
        assert_eq!(config.endpoint_pool().unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("RPC_URL", PUBLIC_DEVNET_URL)]).unwrap();
        assert_eq!(config.retry_policy().unwrap(), RetryPolicy::default());
        assert_eq!(config.establish_config().unwrap(), EstablishConfig::default());
        assert_eq!(config.failover_config(), FailoverConfig::default());
        assert_eq!(config.commitment, Commitment::Confirmed);
        assert_eq!(config.program_id().unwrap().to_string(), rpc::DRIFT_PROGRAM_ID);
    }

    #[test]
    fn test_invalid_tuning_rejected() {
        let config = load(&[("JITTER_FRACTION", "1.5")]).unwrap();
        assert_eq!(config.retry_policy().unwrap_err().kind(), ErrorKind::Configuration);

        let config = load(&[("MAX_ATTEMPTS", "three")]);
        assert_eq!(config.unwrap_err().kind(), ErrorKind::Configuration);
    }
}

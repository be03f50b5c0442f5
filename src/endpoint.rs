use std::fmt;

use itertools::Itertools;

use crate::error::SessionError;

/// Network address of a candidate service instance.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({})", self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Ordered list of candidate endpoints, first tried first.
///
/// Fixed for the lifetime of the pool: endpoints come from configuration
/// only, there is no discovery.
#[derive(Clone, Debug)]
pub struct EndpointPool {
    endpoints: Vec<Endpoint>,
}

impl EndpointPool {
    /// Builds the pool from configured entries, dropping blank ones and
    /// repeated ones (first occurrence wins).
    pub fn new<I, S>(entries: I) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints: Vec<_> = entries
            .into_iter()
            .map(|entry| entry.as_ref().trim().to_string())
            .filter(|entry| !entry.is_empty())
            .unique()
            .map(Endpoint)
            .collect();
        if endpoints.is_empty() {
            return Err(SessionError::Configuration(
                "no RPC endpoint configured".to_string(),
            ));
        }
        Ok(Self { endpoints })
    }

    pub fn list_endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

use std::time::Duration;

use alloy::transports::{RpcError, TransportError, TransportErrorKind};

/// Step of session establishment an error is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum EstablishStep {
    #[display("connect")]
    Connect,
    #[display("client validation")]
    Validate,
    #[display("subscribe")]
    Subscribe,
    #[display("account load")]
    LoadAccounts,
}

/// Failure class an error belongs to, independent of the context
/// it was reported with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    RateLimited,
    Rejected,
    Transient,
    Timeout,
    NullState,
    Fatal,
    RetryExhausted,
    Signing,
    NotReady,
    Cancelled,
}

impl ErrorKind {
    /// Whether an operation failing with this kind may succeed if invoked again
    /// against the same endpoint.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Timeout | Self::NullState)
    }
}

/// Error produced while establishing or using a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The endpoint refused the request (authorization, unknown path or
    /// method). Another endpoint may still serve it.
    #[error("rejected by endpoint: {0}")]
    Rejected(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid client state: {0}")]
    NullState(String),

    /// The wrapped client is unusable regardless of the endpoint.
    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<SessionError>,
    },

    #[error("{step} failed: {source}")]
    Step {
        step: EstablishStep,
        #[source]
        source: Box<SessionError>,
    },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("no active session")]
    NotReady,

    #[error("superseded by a newer identity binding")]
    Cancelled,
}

impl SessionError {
    /// Attributes the error to an establishment step.
    pub fn at(self, step: EstablishStep) -> Self {
        Self::Step {
            step,
            source: Box::new(self),
        }
    }

    /// Failure class, looking through step context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Rejected(_) => ErrorKind::Rejected,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::NullState(_) => ErrorKind::NullState,
            Self::Fatal(_) => ErrorKind::Fatal,
            Self::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            Self::Step { source, .. } => source.kind(),
            Self::Signing(_) => ErrorKind::Signing,
            Self::NotReady => ErrorKind::NotReady,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Innermost error, looking through step context and exhausted retries.
    pub fn root_cause(&self) -> &SessionError {
        match self {
            Self::Step { source, .. } => source.root_cause(),
            Self::RetryExhausted { last, .. } => last.root_cause(),
            _ => self,
        }
    }

    /// Step the error was attributed to, if any.
    pub fn step(&self) -> Option<EstablishStep> {
        match self {
            Self::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

/// Returns true if the message carries a throttling marker some providers
/// put into otherwise generic error responses.
fn is_rate_limit_message(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    msg.contains("rate limit") || msg.contains("too many requests")
}

impl From<TransportError> for SessionError {
    fn from(value: TransportError) -> Self {
        match value {
            RpcError::ErrorResp(ref resp) => {
                let msg = resp.message.to_string();
                if resp.code == 429 || resp.code == -32429 || is_rate_limit_message(&msg) {
                    Self::RateLimited(msg)
                } else if resp.code == -32600 || resp.code == -32601 || resp.code == -32602 {
                    // Malformed request or method the node does not serve
                    Self::Rejected(value.to_string())
                } else {
                    Self::Transient(value.to_string())
                }
            }
            RpcError::NullResp => Self::NullState("unexpected empty RPC response".into()),
            RpcError::DeserError { .. } => Self::NullState(value.to_string()),
            RpcError::Transport(kind) => Self::from(kind),
            _ => Self::Rejected(value.to_string()),
        }
    }
}

impl From<TransportErrorKind> for SessionError {
    fn from(value: TransportErrorKind) -> Self {
        match value {
            TransportErrorKind::HttpError(ref http) if http.status == 429 => {
                Self::RateLimited(value.to_string())
            }
            TransportErrorKind::HttpError(ref http) if (400..500).contains(&http.status) => {
                Self::Rejected(value.to_string())
            }
            _ => {
                let msg = value.to_string();
                if is_rate_limit_message(&msg) {
                    Self::RateLimited(msg)
                } else {
                    Self::Transient(msg)
                }
            }
        }
    }
}

impl From<envy::Error> for SessionError {
    fn from(value: envy::Error) -> Self {
        Self::Configuration(value.to_string())
    }
}

impl From<url::ParseError> for SessionError {
    fn from(value: url::ParseError) -> Self {
        Self::Configuration(value.to_string())
    }
}

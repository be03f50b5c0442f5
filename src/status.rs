use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;

const TRANSITIONS_CAPACITY: usize = 64;

/// Externally observed state of the session for the bound identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Subscribing,
    Ready,
    /// Session is live but the identity's accounts could not be loaded.
    FallbackDegraded,
    Failed,
}

impl ConnectionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::FallbackDegraded | Self::Failed)
    }
}

/// Status surface exposed to consumers.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: ConnectionStatus,
    pub current_endpoint: Option<Endpoint>,
    pub error: Option<String>,
}

impl StatusSnapshot {
    pub fn new(status: ConnectionStatus, current_endpoint: Option<Endpoint>) -> Self {
        Self {
            status,
            current_endpoint,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Publishes status transitions: the latest snapshot through a watch channel
/// and every transition through a broadcast feed.
#[derive(Debug)]
pub struct StatusBoard {
    current: watch::Sender<StatusSnapshot>,
    transitions: broadcast::Sender<StatusSnapshot>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (current, _) = watch::channel(StatusSnapshot::default());
        let (transitions, _) = broadcast::channel(TRANSITIONS_CAPACITY);
        Self {
            current,
            transitions,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<StatusSnapshot> {
        self.current.subscribe()
    }

    /// Feed of transitions published after this call. Slow receivers
    /// lag rather than block publishing.
    pub fn transitions(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.transitions.subscribe()
    }

    /// Publishes `snapshot` unless `cancel` has fired, returning whether it
    /// was published.
    ///
    /// The check and the write happen under the watch channel's lock, the same
    /// lock [`StatusBoard::supersede`] cancels under, so a superseded
    /// publisher can never overwrite the status of its successor.
    pub(crate) fn publish(&self, cancel: &CancellationToken, snapshot: StatusSnapshot) -> bool {
        self.current.send_if_modified(|current| {
            if cancel.is_cancelled() {
                return false;
            }
            *current = snapshot.clone();
            // No receivers is fine
            let _ = self.transitions.send(snapshot);
            true
        })
    }

    /// Cancels the publisher holding `cancel` and resets the status to idle.
    pub(crate) fn supersede(&self, cancel: &CancellationToken) {
        self.current.send_modify(|current| {
            cancel.cancel();
            *current = StatusSnapshot::default();
            let _ = self.transitions.send(StatusSnapshot::default());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_watchers_and_feed() {
        let board = StatusBoard::new();
        let watcher = board.watch();
        let mut feed = board.transitions();
        let cancel = CancellationToken::new();

        assert!(board.publish(&cancel, StatusSnapshot::new(ConnectionStatus::Connecting, Some("A".into()))));
        assert!(board.publish(
            &cancel,
            StatusSnapshot::new(ConnectionStatus::Failed, Some("A".into())).with_error("boom")
        ));

        assert_eq!(watcher.borrow().status, ConnectionStatus::Failed);
        assert_eq!(watcher.borrow().error.as_deref(), Some("boom"));
        assert_eq!(feed.try_recv().unwrap().status, ConnectionStatus::Connecting);
        assert_eq!(feed.try_recv().unwrap().status, ConnectionStatus::Failed);
        assert!(feed.try_recv().is_err());
    }

    #[test]
    fn test_superseded_publisher_is_ignored() {
        let board = StatusBoard::new();
        let mut feed = board.transitions();
        let stale = CancellationToken::new();

        assert!(board.publish(&stale, StatusSnapshot::new(ConnectionStatus::Subscribing, Some("A".into()))));
        board.supersede(&stale);
        assert!(stale.is_cancelled());
        assert!(!board.publish(&stale, StatusSnapshot::new(ConnectionStatus::Ready, Some("A".into()))));

        assert_eq!(board.snapshot(), StatusSnapshot::default());
        assert_eq!(feed.try_recv().unwrap().status, ConnectionStatus::Subscribing);
        assert_eq!(feed.try_recv().unwrap(), StatusSnapshot::default());
        assert!(feed.try_recv().is_err());

        let current = CancellationToken::new();
        assert!(board.publish(&current, StatusSnapshot::new(ConnectionStatus::Connecting, Some("B".into()))));
        assert_eq!(board.snapshot().current_endpoint, Some("B".into()));
    }

    #[test]
    fn test_snapshot_serializes_for_ui() {
        let snapshot = StatusSnapshot::new(
            ConnectionStatus::Ready,
            Some("https://api.devnet.solana.com".into()),
        );
        assert_eq!(
            serde_json::to_string(&snapshot).unwrap(),
            r#"{"status":"Ready","currentEndpoint":"https://api.devnet.solana.com","error":null}"#
        );
    }
}

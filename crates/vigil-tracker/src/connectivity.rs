//! Connectivity-change signal consumed by trackers.
//!
//! The notifier is an injected capability rather than a process-wide
//! singleton: hosts forward platform network-change callbacks into a
//! [`ConnectivityNotifier`], and each tracker subscribes once at construction.
//! Dropping the returned [`ConnectivityStream`] is the unsubscribe.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::debug;

use crate::error::TrackerResult;

/// Default buffer for undelivered connectivity events per subscriber.
const DEFAULT_CAPACITY: usize = 16;

/// Network connection classes reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// Connected through an unidentified medium.
    Unknown,
    /// Wired ethernet.
    Ethernet,
    /// Wireless LAN.
    Wifi,
    /// 2G cellular.
    Cellular2g,
    /// 3G cellular.
    Cellular3g,
    /// 4G cellular.
    Cellular4g,
    /// No connectivity.
    None,
    /// Bluetooth tethering.
    Bluetooth,
}

impl ConnectionType {
    /// Whether the connection can carry traffic.
    #[must_use]
    pub const fn is_online(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ethernet => "ethernet",
            Self::Wifi => "wifi",
            Self::Cellular2g => "cellular_2g",
            Self::Cellular3g => "cellular_3g",
            Self::Cellular4g => "cellular_4g",
            Self::None => "none",
            Self::Bluetooth => "bluetooth",
        }
    }
}

/// Source of connectivity-change events.
pub trait ConnectivitySource: Send + Sync {
    /// Subscribe to future connectivity changes.
    ///
    /// # Errors
    ///
    /// Returns `TrackerError::ConnectivitySubscribe` when the source cannot
    /// accept new observers.
    fn subscribe(&self) -> TrackerResult<ConnectivityStream>;
}

/// In-process connectivity notifier built on `tokio::broadcast`.
#[derive(Debug, Clone)]
pub struct ConnectivityNotifier {
    sender: broadcast::Sender<ConnectionType>,
}

impl ConnectivityNotifier {
    /// Construct a notifier buffering up to `capacity` events per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "connectivity notifier capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Construct a notifier with the default buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Publish a connectivity change to every subscriber.
    ///
    /// Returns the number of subscribers that will observe the change.
    pub fn notify(&self, connection: ConnectionType) -> usize {
        self.sender.send(connection).unwrap_or(0)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ConnectivityNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivitySource for ConnectivityNotifier {
    fn subscribe(&self) -> TrackerResult<ConnectivityStream> {
        Ok(ConnectivityStream::new(self.sender.subscribe()))
    }
}

/// Subscription to connectivity changes; dropping it unsubscribes.
#[derive(Debug)]
pub struct ConnectivityStream {
    inner: BroadcastStream<ConnectionType>,
}

impl ConnectivityStream {
    /// Wrap a broadcast receiver.
    #[must_use]
    pub fn new(receiver: broadcast::Receiver<ConnectionType>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }

    /// Receive the next change, or `None` once the source has gone away.
    ///
    /// Events dropped because this subscriber lagged are skipped; delivery
    /// resumes with the oldest retained event.
    pub async fn next(&mut self) -> Option<ConnectionType> {
        loop {
            match self.inner.next().await? {
                Ok(connection) => return Some(connection),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!(skipped, "connectivity subscriber lagged");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_none_is_offline() {
        assert!(!ConnectionType::None.is_online());
        for connection in [
            ConnectionType::Unknown,
            ConnectionType::Ethernet,
            ConnectionType::Wifi,
            ConnectionType::Cellular2g,
            ConnectionType::Cellular3g,
            ConnectionType::Cellular4g,
            ConnectionType::Bluetooth,
        ] {
            assert!(connection.is_online(), "{} should be online", connection.as_str());
        }
    }

    #[tokio::test]
    async fn subscribers_receive_changes_in_order() {
        let notifier = ConnectivityNotifier::new();
        let mut stream = notifier.subscribe().expect("subscribe succeeds");
        assert_eq!(notifier.subscriber_count(), 1);

        assert_eq!(notifier.notify(ConnectionType::None), 1);
        assert_eq!(notifier.notify(ConnectionType::Wifi), 1);

        assert_eq!(stream.next().await, Some(ConnectionType::None));
        assert_eq!(stream.next().await, Some(ConnectionType::Wifi));
    }

    #[tokio::test]
    async fn dropping_stream_unsubscribes() {
        let notifier = ConnectivityNotifier::new();
        let stream = notifier.subscribe().expect("subscribe succeeds");
        drop(stream);
        assert_eq!(notifier.subscriber_count(), 0);
        assert_eq!(notifier.notify(ConnectionType::Ethernet), 0);
    }

    #[tokio::test]
    async fn lagged_subscriber_resumes_with_retained_events() {
        let notifier = ConnectivityNotifier::with_capacity(2);
        let mut stream = notifier.subscribe().expect("subscribe succeeds");
        notifier.notify(ConnectionType::None);
        notifier.notify(ConnectionType::Wifi);
        notifier.notify(ConnectionType::None);
        notifier.notify(ConnectionType::Ethernet);

        assert_eq!(stream.next().await, Some(ConnectionType::None));
        assert_eq!(stream.next().await, Some(ConnectionType::Ethernet));
    }

    #[tokio::test]
    async fn stream_ends_when_notifier_dropped() {
        let notifier = ConnectivityNotifier::new();
        let mut stream = notifier.subscribe().expect("subscribe succeeds");
        drop(notifier);
        assert_eq!(stream.next().await, None);
    }
}

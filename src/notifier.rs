//! Outbound event delivery to client connections

use crate::protocol::ServerEvent;
use crate::types::ConnectionId;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Trait for delivering server events to connections
///
/// Delivery is fire-and-forget: a vanished connection is not an error for the
/// caller, since disconnects are reported separately.
pub trait ClientNotifier: Send + Sync {
    fn send(&self, connection_id: ConnectionId, event: ServerEvent);

    /// Send the same event to several connections
    fn broadcast(&self, connections: &[ConnectionId], event: &ServerEvent) {
        for connection_id in connections {
            self.send(*connection_id, event.clone());
        }
    }
}

/// Routes events to per-connection unbounded channels drained by the gateway
#[derive(Debug, Default)]
pub struct ChannelNotifier {
    senders: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>>,
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and get the receiving end of its outbound channel
    pub fn register(&self, connection_id: ConnectionId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.senders.write() {
            Ok(mut senders) => {
                senders.insert(connection_id, tx);
            }
            Err(_) => warn!("Failed to acquire notifier lock, {} not registered", connection_id),
        }
        rx
    }

    pub fn unregister(&self, connection_id: ConnectionId) {
        if let Ok(mut senders) = self.senders.write() {
            senders.remove(&connection_id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.senders.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl ClientNotifier for ChannelNotifier {
    fn send(&self, connection_id: ConnectionId, event: ServerEvent) {
        let Ok(senders) = self.senders.read() else {
            warn!("Failed to acquire notifier lock, dropping {}", event.kind());
            return;
        };
        match senders.get(&connection_id) {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!("Connection {} closed, event dropped", connection_id);
                }
            }
            None => debug!(
                "No channel for connection {}, dropping {}",
                connection_id,
                event.kind()
            ),
        }
    }
}

/// Records every event for inspection in tests
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<(ConnectionId, ServerEvent)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded (connection, event) pair, in send order
    pub fn all(&self) -> Vec<(ConnectionId, ServerEvent)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events delivered to one connection, in send order
    pub fn events_for(&self, connection_id: ConnectionId) -> Vec<ServerEvent> {
        self.all()
            .into_iter()
            .filter(|(c, _)| *c == connection_id)
            .map(|(_, e)| e)
            .collect()
    }

    /// Events of one wire kind delivered to one connection
    pub fn kinds_for(&self, connection_id: ConnectionId, kind: &str) -> Vec<ServerEvent> {
        self.events_for(connection_id)
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    /// Number of events of one wire kind across all connections
    pub fn count_kind(&self, kind: &str) -> usize {
        self.all().iter().filter(|(_, e)| e.kind() == kind).count()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl ClientNotifier for RecordingNotifier {
    fn send(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push((connection_id, event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_channel_notifier_routes_by_connection() {
        let notifier = ChannelNotifier::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx_a = notifier.register(a);
        let mut rx_b = notifier.register(b);

        notifier.send(a, ServerEvent::notice("hello a"));
        notifier.broadcast(&[a, b], &ServerEvent::notice("hello all"));

        assert_eq!(rx_a.recv().await, Some(ServerEvent::notice("hello a")));
        assert_eq!(rx_a.recv().await, Some(ServerEvent::notice("hello all")));
        assert_eq!(rx_b.recv().await, Some(ServerEvent::notice("hello all")));
        assert_eq!(notifier.connection_count(), 2);
    }

    #[test]
    fn test_unregistered_connection_is_ignored() {
        let notifier = ChannelNotifier::new();
        let a = Uuid::new_v4();
        let rx = notifier.register(a);
        drop(rx);
        notifier.send(a, ServerEvent::notice("gone"));
        notifier.unregister(a);
        notifier.send(a, ServerEvent::notice("gone again"));
        assert_eq!(notifier.connection_count(), 0);
    }

    #[test]
    fn test_recording_notifier_filters() {
        let notifier = RecordingNotifier::new();
        let a = Uuid::new_v4();
        notifier.send(a, ServerEvent::notice("x"));
        notifier.send(Uuid::new_v4(), ServerEvent::LatencyProbe { sent_at: 1 });
        assert_eq!(notifier.events_for(a).len(), 1);
        assert_eq!(notifier.count_kind("latency-probe"), 1);
        assert_eq!(notifier.kinds_for(a, "server-notice").len(), 1);
        notifier.clear();
        assert!(notifier.all().is_empty());
    }
}

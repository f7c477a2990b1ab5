//! Cross-connection push delivery.
//!
//! A connection worker owns the receiving end of an unbounded channel; the
//! [`ConnectionHandle`] wraps the sending end plus the connection's numeric
//! id and is what gets stored in the presence directory. Delivery enqueues a
//! [`PushEvent`] for the target worker, which turns it into an unscheduled
//! transaction on its own connection — the sender never blocks on, or even
//! learns about, the receiver's progress.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use packet::ValueMap;

use crate::presence::PresenceDirectory;

/// A server-initiated transaction addressed to one connection.
///
/// For the session protocol `service` is the 4-character service table
/// (`fsys`, `pres`, ...) and `txn` the transaction name within it. The
/// game-hosting protocol has no service/transaction split, so its pushes
/// carry the raw message code in both fields.
#[derive(Debug, Clone)]
pub struct PushEvent {
    pub service: String,
    pub txn: String,
    pub body: ValueMap,
}

impl PushEvent {
    pub fn new(service: impl Into<String>, txn: impl Into<String>, body: ValueMap) -> Self {
        Self {
            service: service.into(),
            txn: txn.into(),
            body,
        }
    }
}

/// Cheap-to-clone address of a live connection worker.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    connection_id: u64,
    sender: mpsc::UnboundedSender<PushEvent>,
}

impl ConnectionHandle {
    pub fn new(connection_id: u64, sender: mpsc::UnboundedSender<PushEvent>) -> Self {
        Self {
            connection_id,
            sender,
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Hands the event to the target worker. At-most-once, no
    /// acknowledgement; returns false when the worker is already gone.
    pub fn deliver(&self, event: PushEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Resolves an identity through the presence directory and delivers to
/// whichever connection currently serves it.
pub struct Router {
    directory: Arc<PresenceDirectory>,
}

impl Router {
    pub fn new(directory: Arc<PresenceDirectory>) -> Self {
        Self { directory }
    }

    /// Delivers `event` to the connection registered for `identity`.
    ///
    /// An unregistered identity, or one whose connection vanished between
    /// lookup and delivery, is not an error — the target is offline and the
    /// push is dropped. Returns whether the event was handed off.
    pub fn notify(&self, identity: &str, event: PushEvent) -> bool {
        match self.directory.lookup(identity) {
            Some(handle) => handle.deliver(event),
            None => {
                trace!(identity, "push target offline, dropping");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_to_a_dropped_worker_is_absorbed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new(1, tx);
        drop(rx);
        assert!(!handle.deliver(PushEvent::new("fsys", "Ping", ValueMap::new())));
    }

    #[test]
    fn router_drops_pushes_for_offline_identities() {
        let directory = Arc::new(PresenceDirectory::new());
        let router = Router::new(directory);
        assert!(!router.notify("nobody", PushEvent::new("fsys", "Ping", ValueMap::new())));
    }
}

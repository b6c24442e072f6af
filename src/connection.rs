//! Connection manager interface (spec.md §1, §6): the abstract peer I/O
//! collaborator. The manager itself (real TCP plumbing, reconnection,
//! framing) is explicitly out of scope; FLE only depends on this trait.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::vote::Sid;

/// A raw (undecoded) inbound message together with its sender.
pub type RawMessage = (Sid, Vec<u8>);

/// The external connection-manager contract (spec.md §6):
/// `send`, `pollRecv`, `haveDelivered`, `connectAll`, `halt`.
pub trait ConnectionManager: Send + Sync {
    /// Hands `bytes` to the transport for delivery to `destination`. May
    /// block on a per-peer send buffer (spec.md §5).
    fn send(&self, destination: Sid, bytes: Vec<u8>);

    /// Blocks up to `timeout` for the next raw inbound message. `None` on
    /// timeout; not an error (spec.md §4.2).
    fn poll_recv(&self, timeout: Duration) -> Option<RawMessage>;

    /// Whether recent sends have actually been delivered. `false` triggers
    /// the election loop's reconnect-and-rebroadcast path (spec.md §4.5,
    /// §7).
    fn have_delivered(&self) -> bool;

    /// Ensures the manager is attempting connections to every peer.
    /// Contractually non-blocking (spec.md §4.5).
    fn connect_all(&self);

    /// Clean shutdown signal; safe to call more than once.
    fn halt(&self);
}

/// An in-memory [`ConnectionManager`] test double wiring multiple local
/// `ElectionLoop`s together through channels, in the spirit of the
/// teacher's hand-built `new_mock_log` fixture
/// (`server/peer.rs::tests::new_mock_log`) rather than a real socket.
pub struct ChannelConnectionManager {
    self_id: Sid,
    inbox: Receiver<RawMessage>,
    peers: Mutex<HashMap<Sid, Sender<RawMessage>>>,
    delivered: Arc<Mutex<bool>>,
}

impl ChannelConnectionManager {
    /// Creates a manager for `self_id` and returns it along with the
    /// `Sender` other managers should register under `self_id` to reach it.
    pub fn new(self_id: Sid) -> (ChannelConnectionManager, Sender<RawMessage>) {
        let (tx, rx) = mpsc::channel();
        (
            ChannelConnectionManager {
                self_id,
                inbox: rx,
                peers: Mutex::new(HashMap::new()),
                delivered: Arc::new(Mutex::new(true)),
            },
            tx,
        )
    }

    /// Registers the sender side of a peer's inbox so this manager can
    /// reach it with [`ConnectionManager::send`].
    pub fn register_peer(&self, sid: Sid, sender: Sender<RawMessage>) {
        self.peers.lock().unwrap().insert(sid, sender);
    }

    pub fn self_id(&self) -> Sid {
        self.self_id
    }
}

impl ConnectionManager for ChannelConnectionManager {
    fn send(&self, destination: Sid, bytes: Vec<u8>) {
        let peers = self.peers.lock().unwrap();
        let delivered = match peers.get(&destination) {
            Some(sender) => sender.send((self.self_id, bytes)).is_ok(),
            None => false,
        };
        *self.delivered.lock().unwrap() = delivered;
    }

    fn poll_recv(&self, timeout: Duration) -> Option<RawMessage> {
        self.inbox.recv_timeout(timeout).ok()
    }

    fn have_delivered(&self) -> bool {
        *self.delivered.lock().unwrap()
    }

    fn connect_all(&self) {
        // Nothing to reconnect: peers are registered up front in tests.
    }

    fn halt(&self) {
        // The Receiver is dropped along with this manager; no explicit
        // teardown needed for the in-memory double.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_a_message_between_two_managers() {
        let (mgr_a, tx_a) = ChannelConnectionManager::new(1);
        let (mgr_b, tx_b) = ChannelConnectionManager::new(2);
        mgr_a.register_peer(2, tx_b);
        mgr_b.register_peer(1, tx_a);

        mgr_a.send(2, vec![1, 2, 3]);
        let (sender, bytes) = mgr_b.poll_recv(Duration::from_millis(100)).unwrap();
        assert_eq!(sender, 1);
        assert_eq!(bytes, vec![1, 2, 3]);
        assert!(mgr_a.have_delivered());
    }

    #[test]
    fn send_to_unregistered_peer_marks_undelivered() {
        let (mgr_a, _tx_a) = ChannelConnectionManager::new(1);
        mgr_a.send(42, vec![9]);
        assert!(!mgr_a.have_delivered());
    }

    #[test]
    fn poll_recv_times_out_when_empty() {
        let (mgr, _tx) = ChannelConnectionManager::new(1);
        assert!(mgr.poll_recv(Duration::from_millis(10)).is_none());
    }
}

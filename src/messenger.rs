//! The messenger: owns the send/receive queues and the sender/receiver
//! worker threads that bridge the election loop to the connection manager
//! (spec.md §4.2).
//!
//! Grounded directly on the teacher's `Peer` background-thread pattern
//! (`server/peer.rs`): a struct holding a channel half, spawned with
//! `thread::spawn`, looping on blocking receive until told to stop
//! (teacher's `PeerThreadMessage::Shutdown`; here, a stop flag observed at
//! every poll timeout per spec.md §5's cancellation contract, since the
//! connection manager's `poll_recv`/`send` are the actual blocking points).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, warn};

use crate::codec::{decode, encode};
use crate::config::MESSENGER_POLL_TIMEOUT;
use crate::connection::ConnectionManager;
use crate::peer::VotingView;
use crate::state::ElectionStateHandle;
use crate::vote::{Notification, PeerState, ToSend};

/// A clonable handle onto `sendqueue`.
#[derive(Clone)]
pub struct OutboundHandle {
    tx: Sender<ToSend>,
}

impl OutboundHandle {
    pub fn send(&self, to_send: ToSend) {
        let _ = self.tx.send(to_send);
    }
}

/// Owns `sendqueue`/`recvqueue` and the two background workers that drain
/// and fill them (spec.md §3 "recvset"/queues invariants, §4.2, §5).
pub struct Messenger {
    outbound: OutboundHandle,
    recv_rx: Receiver<Notification>,
    recv_tx: Sender<Notification>,
    stop: Arc<AtomicBool>,
    sender_thread: Option<JoinHandle<()>>,
    receiver_thread: Option<JoinHandle<()>>,
}

impl Messenger {
    /// Spawns the sender and receiver workers against `manager`, sharing
    /// `state` and `voting_view` with the receiver's reply policies.
    pub fn start(
        manager: Arc<dyn ConnectionManager>,
        state: Arc<ElectionStateHandle>,
        voting_view: Arc<VotingView>,
    ) -> Messenger {
        let (send_tx, send_rx) = mpsc::channel::<ToSend>();
        let (recv_tx, recv_rx) = mpsc::channel::<Notification>();
        let stop = Arc::new(AtomicBool::new(false));

        let outbound = OutboundHandle { tx: send_tx };

        let sender_thread = {
            let manager = manager.clone();
            let stop = stop.clone();
            thread::spawn(move || sender_loop(manager, send_rx, stop))
        };

        let receiver_thread = {
            let manager = manager.clone();
            let stop = stop.clone();
            let reply_handle = outbound.clone();
            let recv_tx = recv_tx.clone();
            thread::spawn(move || {
                receiver_loop(manager, recv_tx, reply_handle, state, voting_view, stop)
            })
        };

        Messenger {
            outbound,
            recv_rx,
            recv_tx,
            stop,
            sender_thread: Some(sender_thread),
            receiver_thread: Some(receiver_thread),
        }
    }

    /// Delivers `notification` straight into `recvqueue`, bypassing the
    /// connection manager. Mirrors the real implementation's loop-back of
    /// self-addressed notifications in the connection layer, since a peer
    /// has no transport connection to itself (spec.md §4.5 "Broadcast the
    /// proposal to every voting peer", B1: a lone voter must still see its
    /// own proposal to elect itself).
    pub fn deliver_self(&self, notification: Notification) {
        let _ = self.recv_tx.send(notification);
    }

    /// Clones a handle the election loop can use to enqueue outbound
    /// notifications (broadcasts and rebroadcasts, spec.md §4.5).
    pub fn send_handle(&self) -> OutboundHandle {
        self.outbound.clone()
    }

    /// Blocks the election loop's polling step on `recvqueue` (spec.md
    /// §4.5 "Starvation handling").
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Notification, RecvTimeoutError> {
        self.recv_rx.recv_timeout(timeout)
    }

    /// Signals both workers to stop at their next poll timeout (spec.md
    /// §5 "Cancellation").
    pub fn halt(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(t) = self.sender_thread.take() {
            let _ = t.join();
        }
        if let Some(t) = self.receiver_thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for Messenger {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn sender_loop(manager: Arc<dyn ConnectionManager>, send_rx: Receiver<ToSend>, stop: Arc<AtomicBool>) {
    loop {
        if stop.load(Ordering::Acquire) {
            return;
        }
        match send_rx.recv_timeout(MESSENGER_POLL_TIMEOUT) {
            Ok(to_send) => {
                let bytes = encode(&to_send.vote);
                manager.send(to_send.destination, bytes);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn receiver_loop(
    manager: Arc<dyn ConnectionManager>,
    recv_tx: Sender<Notification>,
    reply_handle: OutboundHandle,
    state: Arc<ElectionStateHandle>,
    voting_view: Arc<VotingView>,
    stop: Arc<AtomicBool>,
) {
    loop {
        if stop.load(Ordering::Acquire) {
            return;
        }
        let (sender, bytes) = match manager.poll_recv(MESSENGER_POLL_TIMEOUT) {
            Some(msg) => msg,
            None => continue,
        };

        let vote = match decode(&bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!("dropping malformed election message from {}: {}", sender, e);
                continue;
            }
        };
        let notification = Notification::new(sender, vote);
        handle_notification(&notification, &recv_tx, &reply_handle, &state, &voting_view);
    }
}

/// Applies the §4.2 reply policies, in order, and enqueues onto `recvqueue`
/// exactly when the spec says to.
fn handle_notification(
    n: &Notification,
    recv_tx: &Sender<Notification>,
    reply_handle: &OutboundHandle,
    state: &ElectionStateHandle,
    voting_view: &VotingView,
) {
    // Policy 1: non-voter sender. Reply with our current vote; discard.
    if !voting_view.is_voter(n.sid) {
        let current_vote = state.snapshot().current_vote;
        debug!("replying to non-voter {} with current vote", n.sid);
        reply_handle.send(ToSend::new(n.sid, current_vote));
        return;
    }

    let snapshot = state.snapshot();

    if snapshot.current_state == PeerState::Looking {
        // Policy 2: voter sender while we're LOOKING. Always enqueue.
        let _ = recv_tx.send(*n);
        if n.vote.state == PeerState::Looking && n.vote.election_epoch < snapshot.logical_clock {
            debug!("sending catch-up proposal to laggard {}", n.sid);
            reply_handle.send(ToSend::new(n.sid, snapshot.proposal));
        }
        return;
    }

    // Policy 3: voter sender while we're not LOOKING. Never enqueue.
    if n.vote.state == PeerState::Looking {
        let reply_vote = if n.vote.version > 0 {
            snapshot.current_vote
        } else {
            snapshot.bc_vote
        };
        debug!("replying to LOOKING voter {} with finalized vote", n.sid);
        reply_handle.send(ToSend::new(n.sid, reply_vote));
    }
    // Otherwise: drop.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ChannelConnectionManager;
    use crate::peer::QuorumServer;
    use crate::vote::Vote;

    fn view_with_voters(sids: &[u64]) -> VotingView {
        let mut view = VotingView::new();
        for &sid in sids {
            view.add_voter(QuorumServer {
                sid,
                addr: "127.0.0.1:2888".parse().unwrap(),
            });
        }
        view
    }

    fn noop_reply_handle() -> (OutboundHandle, Receiver<ToSend>) {
        let (tx, rx) = mpsc::channel();
        (OutboundHandle { tx }, rx)
    }

    #[test]
    fn non_voter_gets_current_vote_and_is_discarded() {
        let finalized = Vote::new(1, 5, 3, 0, PeerState::Leading);
        let state = Arc::new(ElectionStateHandle::new(1, finalized));
        state.finalize(PeerState::Leading, finalized);
        let view = Arc::new(view_with_voters(&[1, 2, 3]));

        let (recv_tx, recv_rx) = mpsc::channel();
        let (reply_handle, reply_rx) = noop_reply_handle();
        let n = Notification::new(9, Vote::new(9, 0, 1, 0, PeerState::Looking));
        handle_notification(&n, &recv_tx, &reply_handle, &state, &view);

        assert!(
            recv_rx.try_recv().is_err(),
            "non-voter message must not be enqueued"
        );
        let reply = reply_rx.recv_timeout(Duration::from_millis(50)).unwrap();
        assert_eq!(reply.destination, 9);
        assert_eq!(reply.vote, finalized);
    }

    #[test]
    fn looking_peer_enqueues_and_sends_catchup_to_laggard() {
        let proposal = Vote::new(1, 7, 5, 0, PeerState::Looking);
        let state = Arc::new(ElectionStateHandle::new(1, proposal));
        let view = Arc::new(view_with_voters(&[1, 2]));

        let (recv_tx, recv_rx) = mpsc::channel();
        let (reply_handle, reply_rx) = noop_reply_handle();
        let n = Notification::new(2, Vote::new(2, 3, 4, 0, PeerState::Looking));
        handle_notification(&n, &recv_tx, &reply_handle, &state, &view);

        let enqueued = recv_rx.recv_timeout(Duration::from_millis(50)).unwrap();
        assert_eq!(enqueued, n);
        let reply = reply_rx.recv_timeout(Duration::from_millis(50)).unwrap();
        assert_eq!(reply.destination, 2);
        assert_eq!(reply.vote, proposal);
    }

    #[test]
    fn looking_peer_same_epoch_sends_no_catchup() {
        let proposal = Vote::new(1, 7, 5, 0, PeerState::Looking);
        let state = Arc::new(ElectionStateHandle::new(1, proposal));
        let view = Arc::new(view_with_voters(&[1, 2]));

        let (recv_tx, recv_rx) = mpsc::channel();
        let (reply_handle, reply_rx) = noop_reply_handle();
        let n = Notification::new(2, Vote::new(2, 3, 5, 0, PeerState::Looking));
        handle_notification(&n, &recv_tx, &reply_handle, &state, &view);

        assert!(recv_rx.try_recv().is_ok());
        assert!(reply_rx.try_recv().is_err());
    }

    #[test]
    fn not_looking_peer_replies_to_looking_voter_and_drops_others() {
        let finalized = Vote::new(1, 5, 3, 0, PeerState::Leading);
        let state = Arc::new(ElectionStateHandle::new(1, finalized));
        state.finalize(PeerState::Leading, finalized);
        let view = Arc::new(view_with_voters(&[1, 2]));

        let (recv_tx, recv_rx) = mpsc::channel();
        let (reply_handle, reply_rx) = noop_reply_handle();

        // A LOOKING voter gets a reply and is not enqueued.
        let looking = Notification::new(2, Vote::new(2, 0, 1, 0, PeerState::Looking));
        handle_notification(&looking, &recv_tx, &reply_handle, &state, &view);
        assert!(recv_rx.try_recv().is_err());
        let reply = reply_rx.recv_timeout(Duration::from_millis(50)).unwrap();
        assert_eq!(reply.vote, finalized);

        // A FOLLOWING voter at a different epoch is dropped outright.
        let following = Notification::new(2, Vote::new(1, 5, 1, 0, PeerState::Following));
        handle_notification(&following, &recv_tx, &reply_handle, &state, &view);
        assert!(recv_rx.try_recv().is_err());
        assert!(reply_rx.try_recv().is_err());
    }

    #[test]
    fn legacy_looking_voter_gets_backward_compatible_vote() {
        let finalized = Vote::new(1, 5, 3, 0, PeerState::Leading);
        let state = Arc::new(ElectionStateHandle::new(1, finalized));
        state.finalize(PeerState::Leading, finalized);
        let view = Arc::new(view_with_voters(&[1, 2]));

        let (recv_tx, _recv_rx) = mpsc::channel();
        let (reply_handle, reply_rx) = noop_reply_handle();
        let mut legacy_vote = Vote::new(2, 0, 1, 0, PeerState::Looking);
        legacy_vote.version = 0;
        let n = Notification::new(2, legacy_vote);
        handle_notification(&n, &recv_tx, &reply_handle, &state, &view);

        let reply = reply_rx.recv_timeout(Duration::from_millis(50)).unwrap();
        assert_eq!(reply.vote, finalized); // bc_vote == finalized in this fixture
    }

    #[test]
    fn messenger_end_to_end_between_two_channel_managers() {
        let (mgr_a, tx_a) = ChannelConnectionManager::new(1);
        let (mgr_b, tx_b) = ChannelConnectionManager::new(2);
        mgr_a.register_peer(2, tx_b);
        mgr_b.register_peer(1, tx_a);

        let vote_a = Vote::new(1, 0, 1, 0, PeerState::Looking);
        let vote_b = Vote::new(2, 0, 1, 0, PeerState::Looking);
        let state_a = Arc::new(ElectionStateHandle::new(1, vote_a));
        let state_b = Arc::new(ElectionStateHandle::new(2, vote_b));
        let view = Arc::new(view_with_voters(&[1, 2]));

        let mut messenger_a = Messenger::start(Arc::new(mgr_a), state_a, view.clone());
        let mut messenger_b = Messenger::start(Arc::new(mgr_b), state_b, view);

        messenger_a.send_handle().send(ToSend::new(2, vote_a));

        let received = messenger_b
            .recv_timeout(Duration::from_secs(1))
            .expect("peer b should receive a's proposal");
        assert_eq!(received.sid, 1);
        assert_eq!(received.vote, vote_a);

        messenger_a.halt();
        messenger_b.halt();
    }
}

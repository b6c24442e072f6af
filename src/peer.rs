//! Peer registry: the voting view and observer view (spec.md §1, §6).
//!
//! This is a thin stand-in for the real `QuorumPeer`/peer-registry
//! collaborator, which spec.md §1 places out of scope. Grounded on the
//! teacher's `Config` (`cluster: HashMap<u64, SocketAddr>` in
//! `server/mod.rs`), generalized to separate voters from observers.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::vote::Sid;

/// A single member of the ensemble as known to the local peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumServer {
    pub sid: Sid,
    pub addr: SocketAddr,
}

/// The set of peers the local peer exchanges election notifications with,
/// split into voters (participate in quorum) and observers (never vote,
/// spec.md §4.5 "OBSERVING").
#[derive(Debug, Clone, Default)]
pub struct VotingView {
    voters: HashMap<Sid, QuorumServer>,
    observers: HashMap<Sid, QuorumServer>,
}

impl VotingView {
    pub fn new() -> VotingView {
        VotingView {
            voters: HashMap::new(),
            observers: HashMap::new(),
        }
    }

    pub fn with_voters(voters: impl IntoIterator<Item = QuorumServer>) -> VotingView {
        let mut view = VotingView::new();
        for server in voters {
            view.add_voter(server);
        }
        view
    }

    pub fn add_voter(&mut self, server: QuorumServer) {
        self.voters.insert(server.sid, server);
    }

    pub fn add_observer(&mut self, server: QuorumServer) {
        self.observers.insert(server.sid, server);
    }

    /// Is `sid` a voting member of this ensemble (spec.md §4.2 "Non-voter
    /// sender" policy; §4.5 "Filter")?
    pub fn is_voter(&self, sid: Sid) -> bool {
        self.voters.contains_key(&sid)
    }

    pub fn is_observer(&self, sid: Sid) -> bool {
        self.observers.contains_key(&sid)
    }

    pub fn voter_sids(&self) -> Vec<Sid> {
        self.voters.keys().copied().collect()
    }

    pub fn voter(&self, sid: Sid) -> Option<&QuorumServer> {
        self.voters.get(&sid)
    }

    pub fn voters(&self) -> impl Iterator<Item = &QuorumServer> {
        self.voters.values()
    }
}

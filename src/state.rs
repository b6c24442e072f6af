//! The small piece of state shared between the election loop and the
//! messenger's receiver worker (spec.md §5: "Shared state & discipline").
//!
//! Grounded on the teacher's `ServerState` (`server/mod.rs`): one struct
//! behind one lock, mutated only by the owning loop, read by a background
//! worker that needs a consistent snapshot to build catch-up replies.

use std::sync::Mutex;

use crate::vote::{PeerState, Sid, Vote};

/// A consistent snapshot of the fields the messenger's receiver needs to
/// build replies (spec.md §4.2).
#[derive(Debug, Clone, Copy)]
pub struct ElectionSnapshot {
    /// The local logical clock / election epoch (spec.md §3).
    pub logical_clock: u64,
    /// LOOKING / FOLLOWING / LEADING / OBSERVING (spec.md §3).
    pub current_state: PeerState,
    /// The proposal triple for the in-progress round, tagged with
    /// `logical_clock` (spec.md §3 "Proposal triple").
    pub proposal: Vote,
    /// The most recently finalized vote (spec.md §4.2 policy 1 and 3).
    pub current_vote: Vote,
    /// The backward-compatible saved vote, used to reply to legacy
    /// (`version == 0`) LOOKING senders while not LOOKING ourselves
    /// (spec.md §4.2 policy 3).
    pub bc_vote: Vote,
}

struct Inner {
    logical_clock: u64,
    current_state: PeerState,
    proposal: Vote,
    current_vote: Vote,
    bc_vote: Vote,
}

/// Shared, lock-guarded election state. Reads tolerate slight staleness
/// (spec.md §5): a race can produce one redundant notification but never a
/// wrong decision, because any accepted vote is re-validated in the
/// election loop.
pub struct ElectionStateHandle {
    self_id: Sid,
    inner: Mutex<Inner>,
}

impl ElectionStateHandle {
    pub fn new(self_id: Sid, initial_vote: Vote) -> ElectionStateHandle {
        ElectionStateHandle {
            self_id,
            inner: Mutex::new(Inner {
                logical_clock: initial_vote.election_epoch,
                current_state: PeerState::Looking,
                proposal: initial_vote,
                current_vote: initial_vote,
                bc_vote: initial_vote,
            }),
        }
    }

    pub fn self_id(&self) -> Sid {
        self.self_id
    }

    pub fn snapshot(&self) -> ElectionSnapshot {
        let inner = self.inner.lock().unwrap();
        ElectionSnapshot {
            logical_clock: inner.logical_clock,
            current_state: inner.current_state,
            proposal: inner.proposal,
            current_vote: inner.current_vote,
            bc_vote: inner.bc_vote,
        }
    }

    /// Bumps the logical clock and installs a new in-round proposal,
    /// returning the new clock value (spec.md §4.5 "Initialization" and
    /// the `n.electionEpoch > logicalclock` branch).
    pub fn advance_clock(&self, new_clock: u64, proposal: Vote) {
        let mut inner = self.inner.lock().unwrap();
        inner.logical_clock = new_clock;
        inner.current_state = PeerState::Looking;
        inner.proposal = proposal;
    }

    /// Replaces the in-round proposal without changing the clock (spec.md
    /// §4.5: adopting a better vote within the same epoch).
    pub fn set_proposal(&self, proposal: Vote) {
        self.inner.lock().unwrap().proposal = proposal;
    }

    /// Records the final decision: state transition plus the finalized
    /// vote the receiver should hand out to laggards and observers from
    /// now on (spec.md §4.5 "Exit", §4.2 policy 1 and 3).
    pub fn finalize(&self, state: PeerState, vote: Vote) {
        let mut inner = self.inner.lock().unwrap();
        inner.current_state = state;
        inner.current_vote = vote;
        inner.bc_vote = vote;
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::PeerState;

    #[test]
    fn snapshot_reflects_latest_update() {
        let v0 = Vote::new(1, 0, 1, 0, PeerState::Looking);
        let handle = ElectionStateHandle::new(1, v0);
        assert_eq!(handle.snapshot().logical_clock, 1);

        let v1 = Vote::new(2, 5, 2, 0, PeerState::Looking);
        handle.advance_clock(2, v1);
        let snap = handle.snapshot();
        assert_eq!(snap.logical_clock, 2);
        assert_eq!(snap.proposal, v1);
        assert_eq!(snap.current_state, PeerState::Looking);
    }

    #[test]
    fn finalize_updates_current_and_bc_vote() {
        let v0 = Vote::new(1, 0, 1, 0, PeerState::Looking);
        let handle = ElectionStateHandle::new(1, v0);
        let decided = Vote::new(3, 9, 1, 0, PeerState::Leading);
        handle.finalize(PeerState::Leading, decided);
        let snap = handle.snapshot();
        assert_eq!(snap.current_state, PeerState::Leading);
        assert_eq!(snap.current_vote, decided);
        assert_eq!(snap.bc_vote, decided);
    }
}

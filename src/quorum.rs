//! Quorum termination predicates (spec.md §4.4).

use std::collections::HashMap;

use crate::precedence::QuorumVerifier;
use crate::vote::{Notification, Sid, Vote};

/// `termPredicate`: does the set of `sid`s whose stored vote in `votes`
/// equals `v` (by `(leader, zxid, peerEpoch)`, spec.md §3) satisfy the
/// quorum verifier?
pub fn term_predicate(votes: &HashMap<Sid, Vote>, v: &Vote, verifier: &dyn QuorumVerifier) -> bool {
    let matching: Vec<Sid> = votes
        .iter()
        .filter(|(_, vote)| vote.term_key() == v.term_key())
        .map(|(sid, _)| *sid)
        .collect();
    verifier.contains_quorum(&matching)
}

/// `checkLeader`: does the claimed `leader` show itself as LEADING in this
/// `election_epoch`, or are we ourselves that leader in our own current
/// round? Prevents converging on a crashed ex-leader (spec.md §4.4, S5).
pub fn check_leader(
    votes: &HashMap<Sid, Vote>,
    leader: Sid,
    election_epoch: u64,
    self_id: Sid,
    self_logical_clock: u64,
) -> bool {
    if leader == self_id && self_logical_clock == election_epoch {
        return true;
    }
    votes
        .get(&leader)
        .map(|vote| vote.state == crate::vote::PeerState::Leading)
        .unwrap_or(false)
}

/// `ooePredicate`: conjunction of `termPredicate` over `recv` and
/// `checkLeader` over `outofelection`, both evaluated against the vote
/// carried by `n` (spec.md §4.4, §4.5 "join established ensemble" path).
pub fn ooe_predicate(
    recv: &HashMap<Sid, Vote>,
    outofelection: &HashMap<Sid, Vote>,
    n: &Notification,
    verifier: &dyn QuorumVerifier,
    self_id: Sid,
    self_logical_clock: u64,
) -> bool {
    term_predicate(recv, &n.vote, verifier)
        && check_leader(
            outofelection,
            n.vote.leader,
            n.vote.election_epoch,
            self_id,
            self_logical_clock,
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precedence::MajorityQuorumVerifier;
    use crate::vote::PeerState;

    fn vote(leader: Sid, zxid: u64, epoch: u64, peer_epoch: u64, state: PeerState) -> Vote {
        Vote::new(leader, zxid, epoch, peer_epoch, state)
    }

    #[test]
    fn term_predicate_holds_when_a_quorum_agrees() {
        let verifier = MajorityQuorumVerifier::new(vec![1, 2, 3]);
        let v = vote(3, 0, 1, 0, PeerState::Looking);
        let mut votes = HashMap::new();
        votes.insert(1, v);
        votes.insert(2, v);
        assert!(term_predicate(&votes, &v, &verifier));
    }

    #[test]
    fn term_predicate_fails_without_quorum() {
        let verifier = MajorityQuorumVerifier::new(vec![1, 2, 3, 4, 5]);
        let v = vote(3, 0, 1, 0, PeerState::Looking);
        let mut votes = HashMap::new();
        votes.insert(1, v);
        votes.insert(2, v);
        assert!(!term_predicate(&votes, &v, &verifier));
    }

    #[test]
    fn check_leader_true_for_self_in_current_epoch() {
        let votes = HashMap::new();
        assert!(check_leader(&votes, 1, 5, 1, 5));
        assert!(!check_leader(&votes, 1, 5, 1, 6));
    }

    #[test]
    fn check_leader_true_when_claimed_leader_reports_leading() {
        let mut votes = HashMap::new();
        votes.insert(2, vote(2, 0, 5, 0, PeerState::Leading));
        assert!(check_leader(&votes, 2, 5, 1, 99));
    }

    #[test]
    fn check_leader_false_for_crashed_ex_leader() {
        // S5: outofelection claims leader=7 but sid 7 never reported LEADING.
        let mut votes = HashMap::new();
        votes.insert(1, vote(7, 0, 5, 0, PeerState::Following));
        assert!(!check_leader(&votes, 7, 5, 1, 99));
    }
}

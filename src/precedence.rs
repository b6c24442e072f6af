//! Vote precedence: the total order `(peerEpoch, zxid, sid)` peers use to
//! compare candidate votes (spec.md §4.3).

use crate::vote::Sid;

/// Assigns quorum weight to peers and tells whether a set of sids forms a
/// quorum. Generalizes the teacher's `self.peers.len() / 2` majority count
/// (`server/mod.rs::Server::start_election`) into a pluggable verifier so
/// weighted / non-majority quorum schemes are expressible.
///
/// `Send + Sync` so an `Arc<dyn QuorumVerifier>` can be shared with the
/// election loop's background workers, same as [`crate::connection::ConnectionManager`].
pub trait QuorumVerifier: Send + Sync {
    /// Voting weight of `sid`. Non-voting peers (observers) have weight 0
    /// and can never win an election (spec.md §4.3 rule 1).
    fn weight(&self, sid: Sid) -> u64;

    /// Whether `sids` (each already known to be in the voting view)
    /// satisfies the quorum requirement.
    fn contains_quorum(&self, sids: &[Sid]) -> bool;
}

/// A strict-majority verifier over an equally-weighted voting view: every
/// listed sid has weight 1, and a quorum is any set covering more than half
/// the total voting weight. This is the common case (spec.md GLOSSARY:
/// "typically strict majority").
#[derive(Debug, Clone)]
pub struct MajorityQuorumVerifier {
    voters: Vec<Sid>,
}

impl MajorityQuorumVerifier {
    pub fn new(voters: Vec<Sid>) -> MajorityQuorumVerifier {
        MajorityQuorumVerifier { voters }
    }
}

impl QuorumVerifier for MajorityQuorumVerifier {
    fn weight(&self, sid: Sid) -> u64 {
        if self.voters.contains(&sid) {
            1
        } else {
            0
        }
    }

    fn contains_quorum(&self, sids: &[Sid]) -> bool {
        let total = self.voters.len();
        if total == 0 {
            return false;
        }
        let present = sids
            .iter()
            .filter(|sid| self.voters.contains(sid))
            .count();
        present * 2 > total
    }
}

/// `totalOrderPredicate` (spec.md §4.3): does the candidate
/// `(new_id, new_zxid, new_epoch)` strictly beat the incumbent
/// `(cur_id, cur_zxid, cur_epoch)`?
///
/// Non-voting candidates (weight 0) never win, regardless of how their
/// triple compares (rule 1). Otherwise the order is `peer_epoch`, then
/// `zxid`, then `sid`, each only consulted when every earlier field ties
/// (rule 2).
pub fn total_order_predicate(
    verifier: &dyn QuorumVerifier,
    new_id: Sid,
    new_zxid: u64,
    new_epoch: u64,
    cur_id: Sid,
    cur_zxid: u64,
    cur_epoch: u64,
) -> bool {
    if verifier.weight(new_id) == 0 {
        return false;
    }
    (new_epoch > cur_epoch)
        || (new_epoch == cur_epoch && new_zxid > cur_zxid)
        || (new_epoch == cur_epoch && new_zxid == cur_zxid && new_id > cur_id)
}

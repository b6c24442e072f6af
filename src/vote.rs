//! Core data model for Fast Leader Election (spec.md §3).

/// Stable peer identifier.
pub type Sid = u64;

/// 64-bit transaction id. The upper 32 bits are the peer epoch under which
/// the transaction was logged (spec.md GLOSSARY).
pub type Zxid = u64;

/// Current format version for wire notifications (spec.md §4.1, §6).
pub const CURRENT_VERSION: u32 = 0x1;

/// The four states a peer can be in during election (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    Looking,
    Following,
    Leading,
    Observing,
}

impl PeerState {
    /// Maps the §4.1 wire ordinal to a `PeerState`.
    ///
    /// # Errors
    /// Returns `None` for any ordinal other than 0-3; the caller drops the
    /// message (spec.md §4.1, §7).
    pub fn from_ordinal(ordinal: u32) -> Option<PeerState> {
        match ordinal {
            0 => Some(PeerState::Looking),
            1 => Some(PeerState::Following),
            2 => Some(PeerState::Leading),
            3 => Some(PeerState::Observing),
            _ => None,
        }
    }

    pub fn to_ordinal(self) -> u32 {
        match self {
            PeerState::Looking => 0,
            PeerState::Following => 1,
            PeerState::Leading => 2,
            PeerState::Observing => 3,
        }
    }
}

/// An immutable vote tuple (spec.md §3).
///
/// Equality for termination counting is by `(leader, zxid, peer_epoch)`
/// only; `election_epoch` and `state` are tracked separately. Use
/// [`Vote::term_key`] to get the termination-counting key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote {
    pub leader: Sid,
    pub zxid: Zxid,
    pub election_epoch: u64,
    pub peer_epoch: u64,
    pub state: PeerState,
    pub version: u32,
}

impl Vote {
    pub fn new(
        leader: Sid,
        zxid: Zxid,
        election_epoch: u64,
        peer_epoch: u64,
        state: PeerState,
    ) -> Vote {
        Vote {
            leader,
            zxid,
            election_epoch,
            peer_epoch,
            state,
            version: CURRENT_VERSION,
        }
    }

    /// The `(leader, zxid, peerEpoch)` key used by the termination
    /// predicate (spec.md §4.4, §3 "Equality is by...").
    pub fn term_key(&self) -> (Sid, Zxid, u64) {
        (self.leader, self.zxid, self.peer_epoch)
    }
}

/// An inbound decoded election message (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub sid: Sid,
    pub vote: Vote,
}

impl Notification {
    pub fn new(sid: Sid, vote: Vote) -> Notification {
        Notification { sid, vote }
    }
}

/// An outbound election message addressed to a specific peer (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToSend {
    pub destination: Sid,
    pub vote: Vote,
}

impl ToSend {
    pub fn new(destination: Sid, vote: Vote) -> ToSend {
        ToSend { destination, vote }
    }
}

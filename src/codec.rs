//! Fixed-layout binary encoding of election notifications (spec.md §4.1).
//!
//! ```text
//! offset  width  field
//! 0       4      state ordinal
//! 4       8      proposed leader sid
//! 12      8      proposed zxid
//! 20      8      election epoch
//! 28      8      peer epoch
//! 36      4      format version
//! ```
//! Total 40 bytes, big-endian. A 28-byte record (missing peer epoch and
//! version) is also accepted for backward compatibility; `peer_epoch` is
//! synthesized from the upper 32 bits of `zxid` and `version` is 0.

use byteorder::{BigEndian, ByteOrder};
use log::warn;

use crate::error::CodecError;
use crate::vote::{PeerState, Vote};

const MODERN_LEN: usize = 40;
const LEGACY_LEN: usize = 28;

/// Upper 32 bits of a zxid: the peer epoch under which it was logged
/// (spec.md GLOSSARY).
pub fn epoch_of_zxid(zxid: u64) -> u64 {
    zxid >> 32
}

/// Encodes `vote` into the modern 40-byte wire layout.
pub fn encode(vote: &Vote) -> Vec<u8> {
    let mut buf = vec![0u8; MODERN_LEN];
    BigEndian::write_u32(&mut buf[0..4], vote.state.to_ordinal());
    BigEndian::write_u64(&mut buf[4..12], vote.leader);
    BigEndian::write_u64(&mut buf[12..20], vote.zxid);
    BigEndian::write_u64(&mut buf[20..28], vote.election_epoch);
    BigEndian::write_u64(&mut buf[28..36], vote.peer_epoch);
    BigEndian::write_u32(&mut buf[36..40], vote.version);
    buf
}

/// Decodes a wire record into a `Vote`.
///
/// Records shorter than 28 bytes are rejected with [`CodecError::TooShort`]
/// (the caller logs and drops the message per spec.md §7). Unknown state
/// ordinals are rejected with [`CodecError::UnknownState`].
pub fn decode(buf: &[u8]) -> Result<Vote, CodecError> {
    if buf.len() < LEGACY_LEN {
        warn!("dropping election message: only {} bytes", buf.len());
        return Err(CodecError::TooShort(buf.len()));
    }

    let ordinal = BigEndian::read_u32(&buf[0..4]);
    let state = PeerState::from_ordinal(ordinal).ok_or(CodecError::UnknownState(ordinal))?;
    let leader = BigEndian::read_u64(&buf[4..12]);
    let zxid = BigEndian::read_u64(&buf[12..20]);
    let election_epoch = BigEndian::read_u64(&buf[20..28]);

    let (peer_epoch, version) = if buf.len() >= MODERN_LEN {
        (
            BigEndian::read_u64(&buf[28..36]),
            BigEndian::read_u32(&buf[36..40]),
        )
    } else {
        (epoch_of_zxid(zxid), 0)
    };

    Ok(Vote {
        leader,
        zxid,
        election_epoch,
        peer_epoch,
        state,
        version,
    })
}

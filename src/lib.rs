//! Fast Leader Election: the peer voting / quorum-decision subsystem that
//! elects a leader before atomic broadcast begins.
//!
//! See `vote`, `codec`, and `election` for the core data model, wire
//! format, and state machine respectively; `connection`, `peer`, and
//! `config` for the external collaborators FLE depends on but does not
//! own.

pub mod codec;
pub mod config;
pub mod connection;
pub mod election;
pub mod error;
pub mod messenger;
pub mod metrics;
pub mod peer;
pub mod precedence;
pub mod quorum;
pub mod state;
pub mod vote;

pub use election::{learning_state, DataTree, ElectionLoop};
pub use error::{FleError, FleResult};
pub use vote::{Notification, PeerState, Sid, ToSend, Vote, Zxid};

//! The election loop: `look_for_leader` and role decision (spec.md §4.5,
//! §4.6).
//!
//! Grounded on the teacher's `Server::start_election` /
//! `ServerState::transition_to_*` (`server/mod.rs`): a state machine driven
//! by `recv_timeout` on an mpsc receiver, mutating a single lock-guarded
//! struct, with `Instant`-based timeouts standing in for the teacher's
//! `thread::sleep`/`rx.recv_timeout` pattern.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::config::Config;
use crate::connection::ConnectionManager;
use crate::error::FleResult;
use crate::messenger::Messenger;
use crate::metrics::ElectionMetrics;
use crate::peer::VotingView;
use crate::precedence::{total_order_predicate, QuorumVerifier};
use crate::quorum::{ooe_predicate, term_predicate};
use crate::vote::{Notification, PeerState, Sid, ToSend, Vote, Zxid};

/// The external data-tree collaborator (spec.md §1, §6): supplies
/// `lastLoggedZxid` and `currentEpoch`. Reading `currentEpoch` can fail;
/// that is the only error spec.md allows to terminate `look_for_leader`
/// abnormally (§7).
pub trait DataTree: Send + Sync {
    fn last_logged_zxid(&self) -> Zxid;
    fn current_epoch(&self) -> FleResult<u64>;
}

/// Maps the final vote to LEADING / FOLLOWING / OBSERVING (spec.md §4.6).
/// The LEADING branch is decided by the caller (unconditional on
/// `self_id == proposed_leader`); this function only covers the
/// non-leader case.
pub fn learning_state(participant: bool) -> PeerState {
    if participant {
        PeerState::Following
    } else {
        PeerState::Observing
    }
}

/// Drives one full `look_for_leader` call for a single local peer.
pub struct ElectionLoop {
    self_id: Sid,
    participant: bool,
    voting_view: Arc<VotingView>,
    verifier: Arc<dyn QuorumVerifier>,
    config: Config,
    manager: Arc<dyn ConnectionManager>,
    messenger: Messenger,
    state: Arc<crate::state::ElectionStateHandle>,
    halted: Arc<AtomicBool>,
}

enum PollOutcome {
    Notification(Notification),
    Timeout,
    Halted,
}

impl ElectionLoop {
    /// `participant` is false for observers, which still run the loop to
    /// learn the ensemble's leader but can never be adopted as one
    /// (spec.md §4.5, §4.6).
    pub fn new(
        participant: bool,
        config: Config,
        verifier: Arc<dyn QuorumVerifier>,
        manager: Arc<dyn ConnectionManager>,
    ) -> ElectionLoop {
        let self_id = config.self_id;
        let voting_view = Arc::new(config.voting_view.clone());
        let bootstrap_vote = Vote::new(self_id, 0, 0, 0, PeerState::Looking);
        let state = Arc::new(crate::state::ElectionStateHandle::new(
            self_id,
            bootstrap_vote,
        ));
        let messenger = Messenger::start(manager.clone(), state.clone(), voting_view.clone());
        ElectionLoop {
            self_id,
            participant,
            voting_view,
            verifier,
            config,
            manager,
            messenger,
            state,
            halted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signals the loop to stop at its next iteration (spec.md §5
    /// "Cancellation").
    pub fn halt(&mut self) {
        self.halted.store(true, Ordering::Release);
        self.messenger.halt();
    }

    fn poll(&self, timeout: Duration) -> PollOutcome {
        if self.halted.load(Ordering::Acquire) {
            return PollOutcome::Halted;
        }
        match self.messenger.recv_timeout(timeout) {
            Ok(n) => PollOutcome::Notification(n),
            Err(RecvTimeoutError::Timeout) => PollOutcome::Timeout,
            Err(RecvTimeoutError::Disconnected) => PollOutcome::Halted,
        }
    }

    /// Sends `vote` to every voting peer, one `ToSend` per voter (spec.md
    /// §4.5). The self-addressed copy never touches the connection
    /// manager, since a peer has no transport connection to itself, and is
    /// delivered straight into `recvqueue` instead (spec.md B1: a lone
    /// voter must see its own proposal to elect itself).
    fn broadcast(&self, vote: Vote) {
        for sid in self.voting_view.voter_sids() {
            if sid == self.self_id {
                self.messenger.deliver_self(Notification::new(sid, vote));
            } else {
                self.messenger.send_handle().send(ToSend::new(sid, vote));
            }
        }
    }

    fn decide_vote(&self, leader: Sid, zxid: Zxid, election_epoch: u64, peer_epoch: u64) -> Vote {
        let state = if leader == self.self_id {
            PeerState::Leading
        } else {
            learning_state(self.participant)
        };
        Vote {
            leader,
            zxid,
            election_epoch,
            peer_epoch,
            state,
            version: crate::vote::CURRENT_VERSION,
        }
    }

    /// Runs the election to completion (spec.md §4.5). Bumps the logical
    /// clock exactly once, self-votes, broadcasts, then drives convergence
    /// off `recvqueue`. Returns `Ok(None)` if halted, `Ok(Some(vote))` on
    /// decision, `Err(FleError::CurrentEpochUnavailable)` if the data tree
    /// could not be read (the only abnormal-termination path, spec.md §7).
    pub fn look_for_leader(&mut self, data_tree: &dyn DataTree) -> FleResult<Option<Vote>> {
        let metrics = ElectionMetrics::start();
        let peer_epoch = data_tree.current_epoch()?;
        let last_logged_zxid = data_tree.last_logged_zxid();

        // Observers still run the loop to learn the current leader via the
        // non-voter reply policy, but their weight is 0 in the voting view,
        // so §4.3 rule 1 already guarantees they can never be adopted as a
        // candidate, so no Long.MIN_VALUE sentinel is needed for self-votes.
        let (init_leader, init_zxid, init_peer_epoch) = (self.self_id, last_logged_zxid, peer_epoch);

        let new_clock = self.state.snapshot().logical_clock + 1;
        let proposal = Vote::new(init_leader, init_zxid, new_clock, init_peer_epoch, PeerState::Looking);
        self.state.advance_clock(new_clock, proposal);
        info!("bumped logical clock to {}", new_clock);
        self.broadcast(proposal);

        let mut recvset: HashMap<Sid, Vote> = HashMap::new();
        let mut outofelection: HashMap<Sid, Vote> = HashMap::new();
        let mut not_timeout = self.config.finalize_wait;
        let mut pending: Option<Notification> = None;

        loop {
            let n = match pending.take() {
                Some(n) => n,
                None => match self.poll(not_timeout) {
                    PollOutcome::Halted => return Ok(None),
                    PollOutcome::Notification(n) => n,
                    PollOutcome::Timeout => {
                        if /* have_delivered */ self.have_delivered() {
                            let current_proposal = self.state.snapshot().proposal;
                            self.broadcast(current_proposal);
                        } else {
                            self.connect_all();
                        }
                        not_timeout = std::cmp::min(not_timeout * 2, self.config.max_notification_interval);
                        continue;
                    }
                },
            };

            if !self.voting_view.is_voter(n.sid) {
                debug!("ignoring notification from non-voter {}", n.sid);
                continue;
            }

            match n.vote.state {
                PeerState::Looking => {
                    let snapshot = self.state.snapshot();
                    if n.vote.election_epoch > snapshot.logical_clock {
                        debug!(
                            "advancing clock {} -> {} on notification from {}",
                            snapshot.logical_clock, n.vote.election_epoch, n.sid
                        );
                        recvset.clear();
                        let adopt = total_order_predicate(
                            &*self.verifier,
                            n.vote.leader,
                            n.vote.zxid,
                            n.vote.peer_epoch,
                            init_leader,
                            init_zxid,
                            init_peer_epoch,
                        );
                        let new_proposal = if adopt {
                            Vote::new(
                                n.vote.leader,
                                n.vote.zxid,
                                n.vote.election_epoch,
                                n.vote.peer_epoch,
                                PeerState::Looking,
                            )
                        } else {
                            Vote::new(
                                init_leader,
                                init_zxid,
                                n.vote.election_epoch,
                                init_peer_epoch,
                                PeerState::Looking,
                            )
                        };
                        self.state.advance_clock(n.vote.election_epoch, new_proposal);
                        self.broadcast(new_proposal);
                    } else if n.vote.election_epoch < snapshot.logical_clock {
                        debug!(
                            "dropping stale notification from {} (epoch {} < {})",
                            n.sid, n.vote.election_epoch, snapshot.logical_clock
                        );
                        continue;
                    } else {
                        let current_proposal = snapshot.proposal;
                        if total_order_predicate(
                            &*self.verifier,
                            n.vote.leader,
                            n.vote.zxid,
                            n.vote.peer_epoch,
                            current_proposal.leader,
                            current_proposal.zxid,
                            current_proposal.peer_epoch,
                        ) {
                            let new_proposal = Vote::new(
                                n.vote.leader,
                                n.vote.zxid,
                                current_proposal.election_epoch,
                                n.vote.peer_epoch,
                                PeerState::Looking,
                            );
                            self.state.set_proposal(new_proposal);
                            self.broadcast(new_proposal);
                        }
                    }

                    recvset.insert(n.sid, n.vote);

                    let proposal_now = self.state.snapshot().proposal;
                    if term_predicate(&recvset, &proposal_now, &*self.verifier) {
                        match self.finalize(proposal_now) {
                            FinalizeOutcome::Decided => {
                                let final_state = if proposal_now.leader == self.self_id {
                                    PeerState::Leading
                                } else {
                                    learning_state(self.participant)
                                };
                                let final_vote = Vote {
                                    state: final_state,
                                    ..proposal_now
                                };
                                self.state.finalize(final_state, final_vote);
                                metrics.decided(&final_vote);
                                return Ok(Some(final_vote));
                            }
                            FinalizeOutcome::Abort(better) => {
                                pending = Some(better);
                            }
                            FinalizeOutcome::Halted => return Ok(None),
                        }
                    }
                }
                PeerState::Observing => {
                    debug!("ignoring OBSERVING notification from {}", n.sid);
                }
                PeerState::Following | PeerState::Leading => {
                    let logical_clock = self.state.snapshot().logical_clock;
                    if n.vote.election_epoch == logical_clock {
                        recvset.insert(n.sid, n.vote);
                        if ooe_predicate(
                            &recvset,
                            &outofelection,
                            &n,
                            &*self.verifier,
                            self.self_id,
                            logical_clock,
                        ) {
                            let final_vote =
                                self.decide_vote(n.vote.leader, n.vote.zxid, n.vote.election_epoch, n.vote.peer_epoch);
                            self.state.finalize(final_vote.state, final_vote);
                            metrics.decided(&final_vote);
                            return Ok(Some(final_vote));
                        }
                    }

                    outofelection.insert(n.sid, n.vote);
                    if ooe_predicate(
                        &outofelection,
                        &outofelection,
                        &n,
                        &*self.verifier,
                        self.self_id,
                        logical_clock,
                    ) {
                        info!(
                            "joining established ensemble at electionEpoch {} without a fresh round",
                            n.vote.election_epoch
                        );
                        let final_vote =
                            self.decide_vote(n.vote.leader, n.vote.zxid, n.vote.election_epoch, n.vote.peer_epoch);
                        self.state.advance_clock(n.vote.election_epoch, final_vote);
                        self.state.finalize(final_vote.state, final_vote);
                        metrics.decided(&final_vote);
                        return Ok(Some(final_vote));
                    }
                }
            }
        }
    }

    /// Finalization drain (spec.md §4.5): keep polling with `finalize_wait`,
    /// discarding each notification that doesn't beat `proposal`, until
    /// either a strictly-better candidate arrives (abort, hand it back to
    /// be reprocessed as the next notification) or a poll times out with
    /// the queue quiet (decide). Per spec.md §9, this is "peek for a better
    /// candidate", not a full re-scan: only the one candidate that aborts
    /// finalization gets a second look; every non-better notification drained
    /// along the way is consumed for good.
    fn finalize(&self, proposal: Vote) -> FinalizeOutcome {
        loop {
            match self.poll(self.config.finalize_wait) {
                PollOutcome::Halted => return FinalizeOutcome::Halted,
                PollOutcome::Timeout => return FinalizeOutcome::Decided,
                PollOutcome::Notification(n) => {
                    let beats = total_order_predicate(
                        &*self.verifier,
                        n.vote.leader,
                        n.vote.zxid,
                        n.vote.peer_epoch,
                        proposal.leader,
                        proposal.zxid,
                        proposal.peer_epoch,
                    );
                    if beats {
                        return FinalizeOutcome::Abort(n);
                    }
                }
            }
        }
    }

    fn have_delivered(&self) -> bool {
        self.manager.have_delivered()
    }

    fn connect_all(&self) {
        self.manager.connect_all();
    }
}

#[derive(Debug)]
enum FinalizeOutcome {
    Decided,
    Abort(Notification),
    Halted,
}

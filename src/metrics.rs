//! Observability surface (spec.md §6): interface only. A real deployment
//! would register a management bean on entry to `look_for_leader` and
//! unregister it on exit; here that's represented as a small struct whose
//! lifetime brackets one election round and whose decision is logged, not
//! exported, since spec.md explicitly scopes metrics export out as "operational
//! plumbing" (§1), and nothing in the retrieved pack's election-shaped code
//! pulls in a metrics-export crate for this narrow a surface.

use std::time::Instant;

use log::info;

use crate::vote::Vote;

/// Tracks one `look_for_leader` invocation's start time and, once decided,
/// its latency.
pub struct ElectionMetrics {
    start: Instant,
}

impl ElectionMetrics {
    /// Registers the start of a new election round (spec.md §4.5
    /// "Initialization: Record start time").
    pub fn start() -> ElectionMetrics {
        info!("election round started");
        ElectionMetrics {
            start: Instant::now(),
        }
    }

    /// Records the final decision and its latency since `start`.
    pub fn decided(&self, vote: &Vote) {
        let latency = self.start.elapsed();
        info!(
            "election decided leader={} electionEpoch={} in {:?}",
            vote.leader, vote.election_epoch, latency
        );
    }
}

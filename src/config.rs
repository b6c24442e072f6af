//! Election-scoped configuration and constants (spec.md §6).

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::peer::{QuorumServer, VotingView};
use crate::vote::Sid;

/// Finalization drain window, and the initial notification timeout
/// (spec.md §4.5, §6).
pub const FINALIZE_WAIT: Duration = Duration::from_millis(200);

/// Backoff cap for the starvation-handling loop (spec.md §4.5, §6).
pub const MAX_NOTIFICATION_INTERVAL: Duration = Duration::from_millis(60_000);

/// Poll timeout used by the messenger's sender and receiver workers
/// (spec.md §4.2: "nominally 3 s").
pub const MESSENGER_POLL_TIMEOUT: Duration = Duration::from_secs(3);

/// A single cluster member as it appears in a config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub sid: Sid,
    pub addr: SocketAddr,
    #[serde(default)]
    pub observer: bool,
}

/// On-disk shape of the cluster config (spec.md §6's `votingView()`,
/// generalized from the teacher's `Config::new(cluster, leader, me, ...)`,
/// `server/mod.rs`).
#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    self_id: Sid,
    servers: Vec<ServerEntry>,
    #[serde(default = "default_finalize_wait_ms")]
    finalize_wait_ms: u64,
    #[serde(default = "default_max_notification_interval_ms")]
    max_notification_interval_ms: u64,
}

fn default_finalize_wait_ms() -> u64 {
    FINALIZE_WAIT.as_millis() as u64
}

fn default_max_notification_interval_ms() -> u64 {
    MAX_NOTIFICATION_INTERVAL.as_millis() as u64
}

/// Runtime configuration for one peer's election participation.
#[derive(Debug, Clone)]
pub struct Config {
    pub self_id: Sid,
    pub voting_view: VotingView,
    pub finalize_wait: Duration,
    pub max_notification_interval: Duration,
}

impl Config {
    pub fn new(self_id: Sid, voting_view: VotingView) -> Config {
        Config {
            self_id,
            voting_view,
            finalize_wait: FINALIZE_WAIT,
            max_notification_interval: MAX_NOTIFICATION_INTERVAL,
        }
    }

    /// Loads a cluster config from a TOML file. Generalizes the teacher's
    /// stubbed `Config::fromFile` (`server/mod.rs`, left as a TODO) into a
    /// real loader.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Config, ConfigError> {
        let raw: RawConfig = toml::from_str(contents)?;
        let mut voting_view = VotingView::new();
        for entry in &raw.servers {
            let server = QuorumServer {
                sid: entry.sid,
                addr: entry.addr,
            };
            if entry.observer {
                voting_view.add_observer(server);
            } else {
                voting_view.add_voter(server);
            }
        }
        Ok(Config {
            self_id: raw.self_id,
            voting_view,
            finalize_wait: Duration::from_millis(raw.finalize_wait_ms),
            max_notification_interval: Duration::from_millis(raw.max_notification_interval_ms),
        })
    }

    /// Per-peer voter weights, all-equal, as a plain map (used by callers
    /// who want a [`crate::precedence::MajorityQuorumVerifier`] without
    /// constructing one by hand).
    pub fn voter_weights(&self) -> HashMap<Sid, u64> {
        self.voting_view
            .voter_sids()
            .into_iter()
            .map(|sid| (sid, 1))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_voting_view_from_toml() {
        let toml_src = r#"
            self_id = 1

            [[servers]]
            sid = 1
            addr = "127.0.0.1:2888"

            [[servers]]
            sid = 2
            addr = "127.0.0.1:2889"

            [[servers]]
            sid = 9
            addr = "127.0.0.1:2890"
            observer = true
        "#;
        let config = Config::from_toml_str(toml_src).unwrap();
        assert_eq!(config.self_id, 1);
        assert!(config.voting_view.is_voter(1));
        assert!(config.voting_view.is_voter(2));
        assert!(config.voting_view.is_observer(9));
        assert_eq!(config.finalize_wait, FINALIZE_WAIT);
        assert_eq!(config.max_notification_interval, MAX_NOTIFICATION_INTERVAL);
    }

    #[test]
    fn overrides_timeouts_when_present() {
        let toml_src = r#"
            self_id = 1
            finalize_wait_ms = 50
            max_notification_interval_ms = 1000

            [[servers]]
            sid = 1
            addr = "127.0.0.1:2888"
        "#;
        let config = Config::from_toml_str(toml_src).unwrap();
        assert_eq!(config.finalize_wait, Duration::from_millis(50));
        assert_eq!(
            config.max_notification_interval,
            Duration::from_millis(1000)
        );
    }
}

//! Node Configuration
//!
//! Loaded from environment variables with the `CLEARNODE_` prefix.

use cn_signer::{EcdsaSigner, SignerResult};
use serde::{Deserialize, Serialize};
use std::env;

use crate::telemetry::LogConfig;

/// Clearnode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Shortest challenge period a home channel may be opened with
    #[serde(default = "default_min_challenge_duration")]
    pub min_challenge_duration_secs: u64,
    /// Most participants an app session may have
    #[serde(default = "default_max_participants")]
    pub max_participants: usize,
    /// Longest accepted session data, in bytes
    #[serde(default = "default_max_session_data_len")]
    pub max_session_data_len: usize,
    /// Most sessions one rebalance may touch
    #[serde(default = "default_max_rebalance_sessions")]
    pub max_rebalance_sessions: usize,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_min_challenge_duration() -> u64 {
    86_400
}

fn default_max_participants() -> usize {
    32
}

fn default_max_session_data_len() -> usize {
    65_536
}

fn default_max_rebalance_sessions() -> usize {
    16
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            min_challenge_duration_secs: default_min_challenge_duration(),
            max_participants: default_max_participants(),
            max_session_data_len: default_max_session_data_len(),
            max_rebalance_sessions: default_max_rebalance_sessions(),
            log: LogConfig::default(),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl NodeConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - CLEARNODE_MIN_CHALLENGE_DURATION: Minimum challenge duration in seconds
    /// - CLEARNODE_MAX_PARTICIPANTS: Maximum app session participants
    /// - CLEARNODE_MAX_SESSION_DATA_LEN: Maximum session data length in bytes
    /// - CLEARNODE_MAX_REBALANCE_SESSIONS: Maximum sessions per rebalance
    /// - CLEARNODE_LOG_LEVEL / CLEARNODE_LOG_FORMAT / RUST_LOG: Logging
    pub fn from_env() -> Self {
        Self {
            min_challenge_duration_secs: env_or(
                "CLEARNODE_MIN_CHALLENGE_DURATION",
                default_min_challenge_duration(),
            ),
            max_participants: env_or("CLEARNODE_MAX_PARTICIPANTS", default_max_participants()),
            max_session_data_len: env_or(
                "CLEARNODE_MAX_SESSION_DATA_LEN",
                default_max_session_data_len(),
            ),
            max_rebalance_sessions: env_or(
                "CLEARNODE_MAX_REBALANCE_SESSIONS",
                default_max_rebalance_sessions(),
            ),
            log: LogConfig::from_env(),
        }
    }

    /// Node signing key from `CLEARNODE_SIGNER_KEY`, if set
    pub fn signer_from_env() -> SignerResult<Option<EcdsaSigner>> {
        match env::var("CLEARNODE_SIGNER_KEY") {
            Ok(key) if !key.trim().is_empty() => EcdsaSigner::from_hex(&key).map(Some),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.min_challenge_duration_secs, 86_400);
        assert_eq!(config.max_participants, 32);
        assert_eq!(config.max_session_data_len, 65_536);
        assert_eq!(config.max_rebalance_sessions, 16);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"max_participants": 4}"#).unwrap();
        assert_eq!(config.max_participants, 4);
        assert_eq!(config.min_challenge_duration_secs, 86_400);
    }
}

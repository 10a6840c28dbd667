//! Logging Standards and Conventions
//!
//! # Log Levels
//!
//! | Level | Usage | Examples |
//! |-------|-------|----------|
//! | ERROR | Store failures, broken invariants after commit | Transaction commit failed |
//! | WARN  | Rejected signatures and quorum failures | Non-participant signer |
//! | INFO  | Accepted state changes | State countersigned, session closed |
//! | DEBUG | Intermediate validation | Transition applied, deltas computed |
//! | TRACE | Packed payloads (hex) | Signing digests |
//!
//! # Structured Logging Fields
//!
//! Always log identities as structured fields, never inside the message:
//!
//! ```ignore
//! use tracing::info;
//!
//! info!(
//!     wallet = %state.user_wallet,
//!     asset = %state.asset,
//!     version = state.version,
//!     "State countersigned"
//! );
//! ```

use serde::{Deserialize, Serialize};

/// Log level enumeration matching tracing levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Parse from string, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Standard log field names
pub mod fields {
    pub const WALLET: &str = "wallet";
    pub const ASSET: &str = "asset";
    pub const VERSION: &str = "version";
    pub const EPOCH: &str = "epoch";
    pub const TRANSITION: &str = "transition";
    pub const CHANNEL_ID: &str = "channel_id";
    pub const APP_SESSION_ID: &str = "app_session_id";
    pub const BATCH_ID: &str = "batch_id";
    pub const INTENT: &str = "intent";
    pub const SIGNER: &str = "signer";
    pub const ERROR: &str = "error";
    pub const COUNT: &str = "count";
}

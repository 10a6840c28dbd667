//! Clearnode Services
//!
//! Request handlers of the clearing node, independent of any transport.
//!
//! # Services
//!
//! ## Channels (`channels.v1`)
//! - `request_creation` - Open a home channel
//! - `submit_state` - Advance a channel state by one transition
//! - `get_home_channel`, `get_escrow_channel`, `get_latest_state`, `get_channels`
//!
//! ## App Sessions (`app_sessions.v1`)
//! - `create_app_session` - Open a session under participant quorum
//! - `submit_app_state` - Operate, withdraw or close
//! - `submit_deposit_state` - Deposit channel funds through a commit
//! - `rebalance_app_sessions` - Atomic multi-session rebalance
//! - `get_app_definition`, `get_app_sessions`, `get_last_key_states`
//!
//! # Usage
//!
//! ```ignore
//! use cn_node::{init_logging, ClearNode, NodeConfig};
//! use cn_store::{MemoryStore, StaticAssetStore};
//! use std::sync::Arc;
//!
//! let config = NodeConfig::from_env();
//! init_logging(&config.log)?;
//! let signer = NodeConfig::signer_from_env()?.ok_or("CLEARNODE_SIGNER_KEY is not set")?;
//! let node = ClearNode::new(
//!     Arc::new(signer),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(StaticAssetStore::new().with_asset("usdc", 6)),
//!     config,
//! );
//! ```

pub mod app_session;
pub mod apps;
pub mod channel;
pub mod config;
pub mod error;
pub mod node;
pub mod processor;
pub mod session_keys;
pub mod telemetry;

pub use app_session::{
    AppSessionService, CreateAppSessionRequest, CreateAppSessionResponse, RebalanceResponse,
    SubmitAppStateResponse, SubmitDepositRequest, SubmitDepositResponse,
};
pub use apps::AppRegistry;
pub use channel::{
    ChannelCreationRequest, ChannelCreationResponse, ChannelService, SubmitStateResponse,
};
pub use config::NodeConfig;
pub use error::{ErrorKind, NodeError, NodeResult};
pub use node::ClearNode;
pub use processor::StateProcessor;
pub use session_keys::{SessionKeyService, StoreKeyResolver};
pub use telemetry::{init_logging, LogConfig, LogFormat};

/// RPC method names
pub mod methods {
    pub const REQUEST_CREATION: &str = "channels.v1.request_creation";
    pub const SUBMIT_STATE: &str = "channels.v1.submit_state";
    pub const GET_HOME_CHANNEL: &str = "channels.v1.get_home_channel";
    pub const GET_ESCROW_CHANNEL: &str = "channels.v1.get_escrow_channel";
    pub const GET_LATEST_STATE: &str = "channels.v1.get_latest_state";
    pub const GET_CHANNELS: &str = "channels.v1.get_channels";

    pub const CREATE_APP_SESSION: &str = "app_sessions.v1.create_app_session";
    pub const GET_APP_DEFINITION: &str = "app_sessions.v1.get_app_definition";
    pub const GET_APP_SESSIONS: &str = "app_sessions.v1.get_app_sessions";
    pub const SUBMIT_APP_STATE: &str = "app_sessions.v1.submit_app_state";
    pub const SUBMIT_DEPOSIT_STATE: &str = "app_sessions.v1.submit_deposit_state";
    pub const REBALANCE_APP_SESSIONS: &str = "app_sessions.v1.rebalance_app_sessions";
    pub const GET_LAST_KEY_STATES: &str = "app_sessions.v1.get_last_key_states";
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

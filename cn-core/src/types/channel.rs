//! Channel records

use crate::types::{Address, ChannelId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Home,
    Escrow,
}

/// On-chain channel status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    /// Created off-chain, not yet confirmed on-chain
    Void,
    Open,
    Challenged,
    Closed,
}

impl ChannelStatus {
    /// Whether the node still accepts off-chain updates for the channel
    pub fn accepts_updates(&self) -> bool {
        matches!(self, Self::Void | Self::Open)
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Void => "void",
            Self::Open => "open",
            Self::Challenged => "challenged",
            Self::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Channel between the node and a user wallet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: ChannelId,
    pub user_wallet: Address,
    pub node_wallet: Address,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub asset: String,
    pub blockchain_id: u64,
    pub token_address: Address,
    pub nonce: u64,
    pub challenge_duration: u64,
    pub status: ChannelStatus,
    /// Latest state version the channel has been checkpointed at
    pub state_version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    pub fn is_home(&self) -> bool {
        self.channel_type == ChannelType::Home
    }
}

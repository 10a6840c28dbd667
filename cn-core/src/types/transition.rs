//! State transitions
//!
//! A transition is the typed, amount-bearing delta that advances a channel
//! state by exactly one version.

use crate::types::TxId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Transition type (closed set)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    HomeDeposit,
    HomeWithdrawal,
    EscrowDeposit,
    EscrowWithdraw,
    MutualLock,
    EscrowLock,
    TransferSend,
    TransferReceive,
    Migrate,
    Finalize,
    Commit,
    Release,
}

impl TransitionType {
    /// Every transition type, in packing-code order
    pub const ALL: [TransitionType; 12] = [
        Self::HomeDeposit,
        Self::HomeWithdrawal,
        Self::EscrowDeposit,
        Self::EscrowWithdraw,
        Self::MutualLock,
        Self::EscrowLock,
        Self::TransferSend,
        Self::TransferReceive,
        Self::Migrate,
        Self::Finalize,
        Self::Commit,
        Self::Release,
    ];

    /// Stable code used in canonical packing
    pub fn code(&self) -> u8 {
        match self {
            Self::HomeDeposit => 1,
            Self::HomeWithdrawal => 2,
            Self::EscrowDeposit => 3,
            Self::EscrowWithdraw => 4,
            Self::MutualLock => 5,
            Self::EscrowLock => 6,
            Self::TransferSend => 7,
            Self::TransferReceive => 8,
            Self::Migrate => 9,
            Self::Finalize => 10,
            Self::Commit => 11,
            Self::Release => 12,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::HomeDeposit => "home_deposit",
            Self::HomeWithdrawal => "home_withdrawal",
            Self::EscrowDeposit => "escrow_deposit",
            Self::EscrowWithdraw => "escrow_withdraw",
            Self::MutualLock => "mutual_lock",
            Self::EscrowLock => "escrow_lock",
            Self::TransferSend => "transfer_send",
            Self::TransferReceive => "transfer_receive",
            Self::Migrate => "migrate",
            Self::Finalize => "finalize",
            Self::Commit => "commit",
            Self::Release => "release",
        }
    }

    /// Issued by the node on the user's behalf, never submitted by a user
    pub fn is_node_issued(&self) -> bool {
        matches!(self, Self::TransferReceive | Self::Release)
    }

    /// Moves funds between a channel and an app session
    pub fn is_commit_class(&self) -> bool {
        matches!(self, Self::Commit | Self::Release)
    }

    /// Needs an active home channel to be accepted
    pub fn requires_home_channel(&self) -> bool {
        !matches!(
            self,
            Self::TransferSend | Self::TransferReceive | Self::Commit | Self::Release
        )
    }

    /// Opens an escrow ledger
    pub fn is_escrow_lock(&self) -> bool {
        matches!(self, Self::MutualLock | Self::EscrowLock)
    }

    /// Completes an escrow episode; the escrow ledger is dropped afterwards
    pub fn completes_escrow(&self) -> bool {
        matches!(self, Self::EscrowDeposit | Self::EscrowWithdraw)
    }
}

impl std::fmt::Display for TransitionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single state transition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Transition type
    #[serde(rename = "type")]
    pub kind: TransitionType,
    /// Deterministic transition ID, see [`crate::canon::transition_tx_id`]
    pub tx_id: TxId,
    /// Counterparty reference: receiver/sender wallet for transfers,
    /// app session ID for commit-class transitions, empty otherwise
    pub account_id: String,
    /// Transition amount
    pub amount: Decimal,
}

impl Transition {
    /// Build a transition with its tx ID left to be derived
    pub fn new(kind: TransitionType, account_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            kind,
            tx_id: TxId::ZERO,
            account_id: account_id.into(),
            amount,
        }
    }
}

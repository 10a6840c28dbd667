//! Append-only audit records

use crate::types::{Address, StateId, TxId, TransitionType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Transaction type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    HomeDeposit,
    HomeWithdrawal,
    EscrowDeposit,
    EscrowWithdraw,
    MutualLock,
    EscrowLock,
    Transfer,
    Finalize,
    Commit,
    Release,
    Rebalance,
}

impl TransactionType {
    /// Stable code used in canonical packing
    pub fn code(&self) -> u8 {
        match self {
            Self::HomeDeposit => 1,
            Self::HomeWithdrawal => 2,
            Self::EscrowDeposit => 3,
            Self::EscrowWithdraw => 4,
            Self::MutualLock => 5,
            Self::EscrowLock => 6,
            Self::Transfer => 7,
            Self::Finalize => 8,
            Self::Commit => 9,
            Self::Release => 10,
            Self::Rebalance => 11,
        }
    }

    /// Transaction type recorded for a user-submitted transition
    pub fn for_transition(kind: TransitionType) -> Option<Self> {
        match kind {
            TransitionType::HomeDeposit => Some(Self::HomeDeposit),
            TransitionType::HomeWithdrawal => Some(Self::HomeWithdrawal),
            TransitionType::EscrowDeposit => Some(Self::EscrowDeposit),
            TransitionType::EscrowWithdraw => Some(Self::EscrowWithdraw),
            TransitionType::MutualLock => Some(Self::MutualLock),
            TransitionType::EscrowLock => Some(Self::EscrowLock),
            TransitionType::TransferSend => Some(Self::Transfer),
            TransitionType::Finalize => Some(Self::Finalize),
            TransitionType::Commit => Some(Self::Commit),
            TransitionType::Release => Some(Self::Release),
            TransitionType::TransferReceive | TransitionType::Migrate => None,
        }
    }
}

/// Immutable record of one economically meaningful movement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub asset: String,
    pub tx_type: TransactionType,
    pub from_account: String,
    pub to_account: String,
    pub sender_state_id: Option<StateId>,
    pub receiver_state_id: Option<StateId>,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Signed delta against an account's balance of one asset.
///
/// App session balances and allocations are sums of these entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Owning account (app session ID hex for session ledgers)
    pub account_id: String,
    /// Participant the delta is attributed to
    pub wallet: Address,
    pub asset: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

//! App session types
//!
//! An app session is a multi-party off-chain ledger scoped to one
//! application and governed by weighted quorum signatures.

use crate::canon;
use crate::error::{CoreError, CoreResult};
use crate::types::{Address, AppSessionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================
// Applications
// ============================================================

/// Registered application
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppV1 {
    pub id: String,
    pub owner_wallet: Address,
    pub metadata: String,
    pub version: u64,
    /// Sessions may be created without an owner approval signature
    pub creation_approval_not_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================
// Definitions and sessions
// ============================================================

/// Session participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppParticipantV1 {
    pub wallet_address: Address,
    pub signature_weight: u32,
}

/// Immutable session definition; the session ID is its packed hash
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDefinitionV1 {
    pub application: String,
    pub participants: Vec<AppParticipantV1>,
    pub quorum: u32,
    pub nonce: u64,
}

impl AppDefinitionV1 {
    /// Deterministic session ID
    pub fn session_id(&self) -> AppSessionId {
        canon::app_session_id(self)
    }

    /// Sum of all participant weights
    pub fn total_weight(&self) -> u64 {
        self.participants
            .iter()
            .map(|p| u64::from(p.signature_weight))
            .sum()
    }

    /// Participant address to weight
    pub fn participant_weights(&self) -> BTreeMap<Address, u32> {
        self.participants
            .iter()
            .map(|p| (p.wallet_address, p.signature_weight))
            .collect()
    }

    /// Structural checks that need no store access
    pub fn validate(&self, max_participants: usize) -> CoreResult<()> {
        if self.application.trim().is_empty() {
            return Err(CoreError::InvalidDefinition {
                reason: "application is required".to_string(),
            });
        }
        if self.participants.is_empty() {
            return Err(CoreError::InvalidDefinition {
                reason: "at least one participant is required".to_string(),
            });
        }
        if self.participants.len() > max_participants {
            return Err(CoreError::InvalidDefinition {
                reason: format!(
                    "{} participants exceed the maximum of {}",
                    self.participants.len(),
                    max_participants
                ),
            });
        }
        if self.nonce == 0 {
            return Err(CoreError::InvalidDefinition {
                reason: "nonce must be non-zero".to_string(),
            });
        }

        let mut seen = BTreeSet::new();
        for p in &self.participants {
            if p.wallet_address.is_zero() {
                return Err(CoreError::InvalidDefinition {
                    reason: "participant address must be non-zero".to_string(),
                });
            }
            if !seen.insert(p.wallet_address) {
                return Err(CoreError::DuplicateParticipant {
                    participant: p.wallet_address.to_hex(),
                });
            }
        }

        if self.quorum == 0 {
            return Err(CoreError::InvalidDefinition {
                reason: "quorum must be greater than zero".to_string(),
            });
        }
        let total = self.total_weight();
        if u64::from(self.quorum) > total {
            return Err(CoreError::QuorumExceedsWeights {
                quorum: self.quorum,
                total,
            });
        }
        Ok(())
    }
}

/// Session status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppSessionStatus {
    Void,
    Open,
    Closed,
}

impl std::fmt::Display for AppSessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Void => "void",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Persisted app session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSessionV1 {
    pub session_id: AppSessionId,
    pub application: String,
    pub participants: Vec<AppParticipantV1>,
    pub quorum: u32,
    pub nonce: u64,
    pub status: AppSessionStatus,
    pub version: u64,
    pub session_data: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppSessionV1 {
    /// Open session at version 1
    pub fn open(definition: &AppDefinitionV1, session_data: String, now: DateTime<Utc>) -> Self {
        Self {
            session_id: definition.session_id(),
            application: definition.application.clone(),
            participants: definition.participants.clone(),
            quorum: definition.quorum,
            nonce: definition.nonce,
            status: AppSessionStatus::Open,
            version: 1,
            session_data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstruct the definition the session was created from
    pub fn definition(&self) -> AppDefinitionV1 {
        AppDefinitionV1 {
            application: self.application.clone(),
            participants: self.participants.clone(),
            quorum: self.quorum,
            nonce: self.nonce,
        }
    }

    pub fn participant_weights(&self) -> BTreeMap<Address, u32> {
        self.participants
            .iter()
            .map(|p| (p.wallet_address, p.signature_weight))
            .collect()
    }

    pub fn is_participant(&self, wallet: &Address) -> bool {
        self.participants.iter().any(|p| &p.wallet_address == wallet)
    }
}

// ============================================================
// Updates
// ============================================================

/// Allocation of one asset to one participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppAllocationV1 {
    pub participant: Address,
    pub asset: String,
    pub amount: Decimal,
}

impl AppAllocationV1 {
    pub fn new(participant: Address, asset: impl Into<String>, amount: Decimal) -> Self {
        Self {
            participant,
            asset: asset.into(),
            amount,
        }
    }
}

/// Update intent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStateUpdateIntent {
    Operate,
    Deposit,
    Withdraw,
    Close,
    Rebalance,
}

impl AppStateUpdateIntent {
    /// Stable code used in canonical packing
    pub fn code(&self) -> u8 {
        match self {
            Self::Operate => 0,
            Self::Deposit => 1,
            Self::Withdraw => 2,
            Self::Close => 3,
            Self::Rebalance => 4,
        }
    }
}

impl std::fmt::Display for AppStateUpdateIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Operate => "operate",
            Self::Deposit => "deposit",
            Self::Withdraw => "withdraw",
            Self::Close => "close",
            Self::Rebalance => "rebalance",
        };
        write!(f, "{}", s)
    }
}

/// App session state update
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStateUpdateV1 {
    pub app_session_id: AppSessionId,
    pub intent: AppStateUpdateIntent,
    pub version: u64,
    pub allocations: Vec<AppAllocationV1>,
    pub session_data: String,
}

/// Update plus the participant signatures authorising it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAppStateUpdateV1 {
    pub app_state_update: AppStateUpdateV1,
    /// Prefixed signatures (hex), see `cn_signer::AppSignature`
    pub quorum_sigs: Vec<String>,
}

// ============================================================
// Session keys
// ============================================================

/// Delegation of signing rights from a wallet to a session key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSessionKeyStateV1 {
    pub user_address: Address,
    pub session_key: Address,
    pub version: u64,
    /// Applications the key may sign for; empty means any
    pub application_ids: Vec<String>,
    /// Sessions the key may sign for
    pub app_session_ids: Vec<AppSessionId>,
    pub expires_at: DateTime<Utc>,
    pub user_sig: Option<String>,
}

impl AppSessionKeyStateV1 {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the key may sign for `application` (and, when given, `session_id`)
    pub fn authorizes(&self, application: &str, session_id: Option<&AppSessionId>) -> bool {
        if self.application_ids.is_empty() && self.app_session_ids.is_empty() {
            return true;
        }
        if self.application_ids.iter().any(|a| a == application) {
            return true;
        }
        match session_id {
            Some(id) => self.app_session_ids.contains(id),
            None => false,
        }
    }
}

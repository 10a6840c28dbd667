//! Store interfaces
//!
//! Every handler request runs inside one [`StoreTx`]. Dropping a transaction
//! without calling [`StoreTx::commit`] discards all of its writes.

use async_trait::async_trait;
use cn_core::allocation::{AllocationMap, AssetTotals};
use cn_core::engine::ensure_no_ongoing_transition;
use cn_core::{
    Address, AppSessionId, AppSessionKeyStateV1, AppSessionStatus, AppSessionV1, AppV1, Channel,
    ChannelId, ChannelStatus, LedgerEntry, State, Transaction, TransitionType,
};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Filter for listing app sessions
#[derive(Clone, Debug, Default)]
pub struct AppSessionFilter {
    pub participant: Option<Address>,
    pub status: Option<AppSessionStatus>,
}

impl AppSessionFilter {
    pub fn matches(&self, session: &AppSessionV1) -> bool {
        if let Some(participant) = &self.participant {
            if !session.is_participant(participant) {
                return false;
            }
        }
        match self.status {
            Some(status) => session.status == status,
            None => true,
        }
    }
}

/// Transactional store
#[async_trait]
pub trait Store: Send + Sync {
    /// Start a transaction
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

/// One store transaction
#[async_trait]
pub trait StoreTx: Send + Sync {
    // ==================== Channels ====================

    async fn create_channel(&mut self, channel: Channel) -> StoreResult<()>;

    async fn update_channel(&mut self, channel: Channel) -> StoreResult<()>;

    async fn get_channel(&self, channel_id: &ChannelId) -> StoreResult<Option<Channel>>;

    /// Most recent home channel of a wallet for an asset
    async fn get_home_channel(&self, wallet: &Address, asset: &str)
        -> StoreResult<Option<Channel>>;

    async fn get_channels(
        &self,
        wallet: &Address,
        status: Option<ChannelStatus>,
    ) -> StoreResult<Vec<Channel>>;

    /// Whether the wallet has a home channel for the asset that accepts updates
    async fn has_open_channel(&self, wallet: &Address, asset: &str) -> StoreResult<bool> {
        Ok(self
            .get_home_channel(wallet, asset)
            .await?
            .is_some_and(|c| c.status.accepts_updates()))
    }

    // ==================== States ====================

    /// Insert or replace a state by its ID
    async fn store_state(&mut self, state: State) -> StoreResult<()>;

    /// Highest (epoch, version) state of the pair. With `only_signed`, only
    /// states carrying both signatures are considered.
    async fn get_latest_state(
        &self,
        wallet: &Address,
        asset: &str,
        only_signed: bool,
    ) -> StoreResult<Option<State>>;

    /// Reject `incoming` while the pair's last signed state left an escrow
    /// episode open
    async fn ensure_no_ongoing_state_transitions(
        &self,
        wallet: &Address,
        asset: &str,
        incoming: TransitionType,
    ) -> StoreResult<()> {
        let last_signed = self.get_latest_state(wallet, asset, true).await?;
        ensure_no_ongoing_transition(last_signed.as_ref(), incoming)?;
        Ok(())
    }

    // ==================== Apps ====================

    async fn create_app(&mut self, app: AppV1) -> StoreResult<()>;

    async fn update_app(&mut self, app: AppV1) -> StoreResult<()>;

    async fn get_app(&self, app_id: &str) -> StoreResult<Option<AppV1>>;

    // ==================== App Sessions ====================

    async fn create_app_session(&mut self, session: AppSessionV1) -> StoreResult<()>;

    /// Replace a session; its version must be the stored version + 1
    async fn update_app_session(&mut self, session: AppSessionV1) -> StoreResult<()>;

    async fn get_app_session(&self, session_id: &AppSessionId)
        -> StoreResult<Option<AppSessionV1>>;

    async fn get_app_session_required(&self, session_id: &AppSessionId) -> StoreResult<AppSessionV1> {
        self.get_app_session(session_id)
            .await?
            .ok_or_else(|| StoreError::not_found("AppSession", session_id.to_hex()))
    }

    async fn get_app_sessions(&self, filter: &AppSessionFilter) -> StoreResult<Vec<AppSessionV1>>;

    // ==================== Session Keys ====================

    async fn store_session_key_state(&mut self, state: AppSessionKeyStateV1) -> StoreResult<()>;

    /// Latest version for a (user, session key) pair
    async fn get_last_key_state(
        &self,
        user: &Address,
        session_key: &Address,
    ) -> StoreResult<Option<AppSessionKeyStateV1>>;

    /// Latest version of every key delegated by `user`, optionally one key only
    async fn get_last_key_states(
        &self,
        user: &Address,
        session_key: Option<&Address>,
    ) -> StoreResult<Vec<AppSessionKeyStateV1>>;

    /// Latest state of a session key, whichever user delegated to it
    async fn get_key_state_by_session_key(
        &self,
        session_key: &Address,
    ) -> StoreResult<Option<AppSessionKeyStateV1>>;

    // ==================== Ledger ====================

    /// Append a ledger entry
    async fn record_ledger_entry(&mut self, entry: LedgerEntry) -> StoreResult<Uuid>;

    /// Entries of one account in insertion order
    async fn get_ledger_entries(&self, account_id: &str) -> StoreResult<Vec<LedgerEntry>>;

    /// Per-asset balance of an app session
    async fn get_app_session_balances(&self, session_id: &AppSessionId) -> StoreResult<AssetTotals>;

    /// Nonzero (participant, asset) allocations of an app session
    async fn get_participant_allocations(
        &self,
        session_id: &AppSessionId,
    ) -> StoreResult<AllocationMap>;

    // ==================== Transactions ====================

    /// Append a transaction
    async fn record_transaction(&mut self, transaction: Transaction) -> StoreResult<()>;

    /// Transactions touching `account` as sender or receiver
    async fn get_transactions(&self, account: &str) -> StoreResult<Vec<Transaction>>;

    // ==================== Lifecycle ====================

    /// Make every write of this transaction visible
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Asset metadata
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Decimal precision of an asset
    async fn get_asset_decimals(&self, asset: &str) -> StoreResult<u32>;
}

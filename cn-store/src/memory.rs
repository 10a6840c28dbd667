//! In-memory store
//!
//! Transactions take an exclusive lock over all tables and work on a private
//! copy; commit swaps the copy in. This serializes every request, which gives
//! the per-(wallet, asset) exclusivity the handlers rely on.

use async_trait::async_trait;
use chrono::Utc;
use cn_core::allocation::{AllocationMap, AssetTotals};
use cn_core::{
    Address, AppSessionId, AppSessionKeyStateV1, AppSessionV1, AppV1, Channel, ChannelId,
    ChannelStatus, LedgerEntry, State, Transaction,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::repo::{AppSessionFilter, AssetStore, Store, StoreTx};

type PairKey = (Address, String);

#[derive(Clone, Debug, Default)]
struct Tables {
    channels: HashMap<ChannelId, Channel>,
    /// States per (wallet, asset), ordered by (epoch, version)
    states: HashMap<PairKey, BTreeMap<(u64, u64), State>>,
    apps: HashMap<String, AppV1>,
    app_sessions: HashMap<AppSessionId, AppSessionV1>,
    /// Key states per (user, session key), ordered by version
    session_keys: HashMap<(Address, Address), BTreeMap<u64, AppSessionKeyStateV1>>,
    ledger_entries: Vec<(Uuid, LedgerEntry)>,
    transactions: Vec<Transaction>,
}

/// Memory store
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

/// Memory store transaction
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

impl MemoryTx {
    fn session_entries<'a>(
        &'a self,
        session_id: &AppSessionId,
    ) -> impl Iterator<Item = &'a LedgerEntry> + 'a {
        let account = session_id.to_hex();
        self.working
            .ledger_entries
            .iter()
            .map(|(_, entry)| entry)
            .filter(move |entry| entry.account_id == account)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    // ==================== Channels ====================

    async fn create_channel(&mut self, channel: Channel) -> StoreResult<()> {
        if self.working.channels.contains_key(&channel.channel_id) {
            return Err(StoreError::duplicate("Channel", channel.channel_id.to_hex()));
        }
        self.working.channels.insert(channel.channel_id, channel);
        Ok(())
    }

    async fn update_channel(&mut self, channel: Channel) -> StoreResult<()> {
        match self.working.channels.get_mut(&channel.channel_id) {
            Some(stored) => {
                *stored = channel;
                Ok(())
            }
            None => Err(StoreError::not_found("Channel", channel.channel_id.to_hex())),
        }
    }

    async fn get_channel(&self, channel_id: &ChannelId) -> StoreResult<Option<Channel>> {
        Ok(self.working.channels.get(channel_id).cloned())
    }

    async fn get_home_channel(
        &self,
        wallet: &Address,
        asset: &str,
    ) -> StoreResult<Option<Channel>> {
        Ok(self
            .working
            .channels
            .values()
            .filter(|c| c.is_home() && c.user_wallet == *wallet && c.asset == asset)
            .max_by_key(|c| (c.created_at, c.nonce))
            .cloned())
    }

    async fn get_channels(
        &self,
        wallet: &Address,
        status: Option<ChannelStatus>,
    ) -> StoreResult<Vec<Channel>> {
        let mut channels: Vec<Channel> = self
            .working
            .channels
            .values()
            .filter(|c| c.user_wallet == *wallet)
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        channels.sort_by_key(|c| (c.created_at, c.channel_id));
        Ok(channels)
    }

    // ==================== States ====================

    async fn store_state(&mut self, state: State) -> StoreResult<()> {
        let key = (state.user_wallet, state.asset.clone());
        self.working
            .states
            .entry(key)
            .or_default()
            .insert((state.epoch, state.version), state);
        Ok(())
    }

    async fn get_latest_state(
        &self,
        wallet: &Address,
        asset: &str,
        only_signed: bool,
    ) -> StoreResult<Option<State>> {
        let Some(states) = self.working.states.get(&(*wallet, asset.to_string())) else {
            return Ok(None);
        };
        Ok(states
            .values()
            .rev()
            .find(|s| !only_signed || s.is_signed())
            .cloned())
    }

    // ==================== Apps ====================

    async fn create_app(&mut self, app: AppV1) -> StoreResult<()> {
        if self.working.apps.contains_key(&app.id) {
            return Err(StoreError::duplicate("App", app.id.clone()));
        }
        self.working.apps.insert(app.id.clone(), app);
        Ok(())
    }

    async fn update_app(&mut self, app: AppV1) -> StoreResult<()> {
        match self.working.apps.get_mut(&app.id) {
            Some(stored) => {
                *stored = app;
                Ok(())
            }
            None => Err(StoreError::not_found("App", app.id.clone())),
        }
    }

    async fn get_app(&self, app_id: &str) -> StoreResult<Option<AppV1>> {
        Ok(self.working.apps.get(app_id).cloned())
    }

    // ==================== App Sessions ====================

    async fn create_app_session(&mut self, session: AppSessionV1) -> StoreResult<()> {
        if self.working.app_sessions.contains_key(&session.session_id) {
            return Err(StoreError::duplicate("AppSession", session.session_id.to_hex()));
        }
        self.working.app_sessions.insert(session.session_id, session);
        Ok(())
    }

    async fn update_app_session(&mut self, session: AppSessionV1) -> StoreResult<()> {
        let Some(stored) = self.working.app_sessions.get_mut(&session.session_id) else {
            return Err(StoreError::not_found("AppSession", session.session_id.to_hex()));
        };
        if stored.version.checked_add(1) != Some(session.version) {
            return Err(StoreError::VersionConflict {
                entity_type: "AppSession".to_string(),
                id: session.session_id.to_hex(),
                stored: stored.version,
                update: session.version,
            });
        }
        *stored = session;
        Ok(())
    }

    async fn get_app_session(
        &self,
        session_id: &AppSessionId,
    ) -> StoreResult<Option<AppSessionV1>> {
        Ok(self.working.app_sessions.get(session_id).cloned())
    }

    async fn get_app_sessions(&self, filter: &AppSessionFilter) -> StoreResult<Vec<AppSessionV1>> {
        let mut sessions: Vec<AppSessionV1> = self
            .working
            .app_sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.created_at, s.session_id));
        Ok(sessions)
    }

    // ==================== Session Keys ====================

    async fn store_session_key_state(&mut self, state: AppSessionKeyStateV1) -> StoreResult<()> {
        let versions = self
            .working
            .session_keys
            .entry((state.user_address, state.session_key))
            .or_default();
        if versions.contains_key(&state.version) {
            return Err(StoreError::duplicate(
                "SessionKeyState",
                format!("{}@{}", state.session_key, state.version),
            ));
        }
        versions.insert(state.version, state);
        Ok(())
    }

    async fn get_last_key_state(
        &self,
        user: &Address,
        session_key: &Address,
    ) -> StoreResult<Option<AppSessionKeyStateV1>> {
        Ok(self
            .working
            .session_keys
            .get(&(*user, *session_key))
            .and_then(|versions| versions.values().next_back())
            .cloned())
    }

    async fn get_last_key_states(
        &self,
        user: &Address,
        session_key: Option<&Address>,
    ) -> StoreResult<Vec<AppSessionKeyStateV1>> {
        let mut states: Vec<AppSessionKeyStateV1> = self
            .working
            .session_keys
            .iter()
            .filter(|((owner, key), _)| owner == user && session_key.map_or(true, |k| k == key))
            .filter_map(|(_, versions)| versions.values().next_back().cloned())
            .collect();
        states.sort_by_key(|s| s.session_key);
        Ok(states)
    }

    async fn get_key_state_by_session_key(
        &self,
        session_key: &Address,
    ) -> StoreResult<Option<AppSessionKeyStateV1>> {
        Ok(self
            .working
            .session_keys
            .iter()
            .filter(|((_, key), _)| key == session_key)
            .filter_map(|(_, versions)| versions.values().next_back())
            .max_by_key(|s| s.version)
            .cloned())
    }

    // ==================== Ledger ====================

    async fn record_ledger_entry(&mut self, entry: LedgerEntry) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        debug!(
            account = %entry.account_id,
            wallet = %entry.wallet,
            asset = %entry.asset,
            amount = %entry.amount,
            "Ledger entry recorded"
        );
        self.working.ledger_entries.push((id, entry));
        Ok(id)
    }

    async fn get_ledger_entries(&self, account_id: &str) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self
            .working
            .ledger_entries
            .iter()
            .filter(|(_, e)| e.account_id == account_id)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn get_app_session_balances(&self, session_id: &AppSessionId) -> StoreResult<AssetTotals> {
        let mut totals = AssetTotals::new();
        for entry in self.session_entries(session_id) {
            *totals.entry(entry.asset.clone()).or_insert(Decimal::ZERO) += entry.amount;
        }
        totals.retain(|_, amount| !amount.is_zero());
        Ok(totals)
    }

    async fn get_participant_allocations(
        &self,
        session_id: &AppSessionId,
    ) -> StoreResult<AllocationMap> {
        let mut allocations = AllocationMap::new();
        for entry in self.session_entries(session_id) {
            *allocations
                .entry((entry.wallet, entry.asset.clone()))
                .or_insert(Decimal::ZERO) += entry.amount;
        }
        allocations.retain(|_, amount| !amount.is_zero());
        Ok(allocations)
    }

    // ==================== Transactions ====================

    async fn record_transaction(&mut self, transaction: Transaction) -> StoreResult<()> {
        if self.working.transactions.iter().any(|t| t.id == transaction.id) {
            return Err(StoreError::duplicate("Transaction", transaction.id.to_hex()));
        }
        self.working.transactions.push(transaction);
        Ok(())
    }

    async fn get_transactions(&self, account: &str) -> StoreResult<Vec<Transaction>> {
        Ok(self
            .working
            .transactions
            .iter()
            .filter(|t| t.from_account == account || t.to_account == account)
            .cloned()
            .collect())
    }

    // ==================== Lifecycle ====================

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        debug!(at = %Utc::now(), "Memory transaction committed");
        Ok(())
    }
}

/// Asset store backed by a fixed table
#[derive(Clone, Debug, Default)]
pub struct StaticAssetStore {
    decimals: HashMap<String, u32>,
}

impl StaticAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(mut self, asset: impl Into<String>, decimals: u32) -> Self {
        self.decimals.insert(asset.into(), decimals);
        self
    }
}

#[async_trait]
impl AssetStore for StaticAssetStore {
    async fn get_asset_decimals(&self, asset: &str) -> StoreResult<u32> {
        self.decimals
            .get(asset)
            .copied()
            .ok_or_else(|| StoreError::not_found("Asset", asset))
    }
}

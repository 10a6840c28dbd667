//! App Session Service
//!
//! Multi-party sessions governed by weighted quorum signatures. Every
//! accepted update bumps the session version by exactly one and runs in a
//! single store transaction together with its ledger entries, issued states
//! and transactions.
//!
//! | Operation | Intents |
//! |-----------|---------|
//! | [`AppSessionService::create_app_session`] | creation |
//! | [`AppSessionService::submit_app_state`] | Operate, Withdraw, Close |
//! | [`AppSessionService::submit_deposit_state`] | Deposit |
//! | [`AppSessionService::rebalance_app_sessions`] | Rebalance |

mod create;
mod deposit;
mod rebalance;
mod submit;

pub use create::{CreateAppSessionRequest, CreateAppSessionResponse};
pub use deposit::{SubmitDepositRequest, SubmitDepositResponse};
pub use rebalance::RebalanceResponse;
pub use submit::SubmitAppStateResponse;

use chrono::{DateTime, Utc};
use cn_core::allocation::{build_allocation_map, check_precision};
use cn_core::canon::{keccak256, pack_app_state_update};
use cn_core::{
    AllocationDelta, AllocationMap, AppDefinitionV1, AppSessionId, AppSessionStatus, AppSessionV1,
    AppStateUpdateV1, CoreError, LedgerEntry, SignedAppStateUpdateV1,
};
use cn_signer::{QuorumOutcome, SigningScope, WeightedSignerSet};
use cn_store::{AppSessionFilter, AssetStore, Store, StoreTx};
use std::sync::Arc;

use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::processor::StateProcessor;
use crate::session_keys::StoreKeyResolver;

/// App Session Service
#[derive(Clone)]
pub struct AppSessionService {
    store: Arc<dyn Store>,
    assets: Arc<dyn AssetStore>,
    processor: StateProcessor,
    config: NodeConfig,
}

impl AppSessionService {
    pub fn new(
        store: Arc<dyn Store>,
        assets: Arc<dyn AssetStore>,
        processor: StateProcessor,
        config: NodeConfig,
    ) -> Self {
        Self {
            store,
            assets,
            processor,
            config,
        }
    }

    // ==================== Queries ====================

    /// Definition a session was created from
    pub async fn get_app_definition(&self, session_id: &AppSessionId) -> NodeResult<AppDefinitionV1> {
        let tx = self.store.begin().await?;
        let session = tx.get_app_session_required(session_id).await?;
        Ok(session.definition())
    }

    pub async fn get_app_sessions(&self, filter: &AppSessionFilter) -> NodeResult<Vec<AppSessionV1>> {
        let tx = self.store.begin().await?;
        Ok(tx.get_app_sessions(filter).await?)
    }

    // ==================== Shared checks ====================

    fn check_session_data(&self, session_data: &str) -> NodeResult<()> {
        if session_data.len() > self.config.max_session_data_len {
            return Err(NodeError::invalid_request(format!(
                "session data of {} bytes exceeds the maximum of {}",
                session_data.len(),
                self.config.max_session_data_len
            )));
        }
        Ok(())
    }

    /// Session the update applies to, which must be open and exactly one
    /// version behind the update
    async fn load_open_session(
        &self,
        tx: &dyn StoreTx,
        update: &AppStateUpdateV1,
    ) -> NodeResult<AppSessionV1> {
        let session = tx.get_app_session_required(&update.app_session_id).await?;
        if session.status == AppSessionStatus::Closed {
            return Err(NodeError::precondition(format!(
                "app session {} is closed",
                session.session_id
            )));
        }
        let expected = session.version.saturating_add(1);
        if update.version != expected {
            return Err(CoreError::VersionMismatch {
                expected,
                actual: update.version,
            }
            .into());
        }
        Ok(session)
    }

    /// Weighted quorum over the packed update
    async fn verify_update_quorum(
        &self,
        tx: &dyn StoreTx,
        session: &AppSessionV1,
        signed: &SignedAppStateUpdateV1,
        now: DateTime<Utc>,
    ) -> NodeResult<QuorumOutcome> {
        let digest = keccak256(&pack_app_state_update(&signed.app_state_update)?);
        let resolver = StoreKeyResolver::new(tx, now);
        let signers = WeightedSignerSet::new(session.participant_weights(), session.quorum);
        let outcome = signers
            .verify(
                &digest,
                &signed.quorum_sigs,
                &resolver,
                SigningScope::new(&session.application, Some(&session.session_id)),
            )
            .await?;
        Ok(outcome)
    }

    /// Proposed allocations, checked against the participant set and each
    /// asset's precision
    async fn proposed_allocations(
        &self,
        session: &AppSessionV1,
        update: &AppStateUpdateV1,
    ) -> NodeResult<AllocationMap> {
        let map = build_allocation_map(&update.allocations, |p| session.is_participant(p))?;
        for ((_, asset), amount) in &map {
            let decimals = self.assets.get_asset_decimals(asset).await?;
            check_precision(asset, decimals, amount)?;
        }
        Ok(map)
    }
}

/// Move `session` to the update's version and data
fn advance_session(session: &mut AppSessionV1, update: &AppStateUpdateV1, now: DateTime<Utc>) {
    session.version = update.version;
    session.session_data = update.session_data.clone();
    session.updated_at = now;
}

/// One ledger entry per allocation delta
async fn record_deltas(
    tx: &mut dyn StoreTx,
    session_id: &AppSessionId,
    deltas: &[AllocationDelta],
    now: DateTime<Utc>,
) -> NodeResult<()> {
    let account_id = session_id.to_hex();
    for delta in deltas {
        tx.record_ledger_entry(LedgerEntry {
            account_id: account_id.clone(),
            wallet: delta.participant,
            asset: delta.asset.clone(),
            amount: delta.delta,
            created_at: now,
        })
        .await?;
    }
    Ok(())
}

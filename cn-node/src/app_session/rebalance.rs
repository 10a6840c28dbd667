use chrono::Utc;
use cn_core::allocation::{ensure_conserved, net_by_asset, rebalance_deltas};
use cn_core::canon::{batch_id, ledger_tx_id};
use cn_core::{
    AllocationDelta, AppSessionV1, AppStateUpdateIntent, BatchId, SignedAppStateUpdateV1,
    Transaction, TransactionType,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, instrument, warn};

use super::{advance_session, record_deltas, AppSessionService};
use crate::error::{NodeError, NodeResult};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RebalanceResponse {
    pub batch_id: BatchId,
    pub app_sessions: Vec<AppSessionV1>,
}

impl AppSessionService {
    /// Atomically move allocations between two or more sessions.
    ///
    /// Per asset, the deltas of all sessions must sum to zero. Any failure
    /// leaves every session untouched.
    #[instrument(skip(self, updates), fields(sessions = updates.len()))]
    pub async fn rebalance_app_sessions(
        &self,
        updates: Vec<SignedAppStateUpdateV1>,
    ) -> NodeResult<RebalanceResponse> {
        if updates.len() < 2 {
            return Err(NodeError::invalid_request(
                "rebalance requires at least two app sessions",
            ));
        }
        if updates.len() > self.config.max_rebalance_sessions {
            return Err(NodeError::invalid_request(format!(
                "rebalance of {} sessions exceeds the maximum of {}",
                updates.len(),
                self.config.max_rebalance_sessions
            )));
        }
        let mut seen = BTreeSet::new();
        for signed in &updates {
            let update = &signed.app_state_update;
            if update.intent != AppStateUpdateIntent::Rebalance {
                return Err(NodeError::invalid_request(format!(
                    "rebalance batch contains a {} update",
                    update.intent
                )));
            }
            if !seen.insert(update.app_session_id) {
                return Err(NodeError::invalid_request(format!(
                    "app session {} appears more than once",
                    update.app_session_id
                )));
            }
            self.check_session_data(&update.session_data)?;
        }

        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut legs: Vec<(AppSessionV1, Vec<AllocationDelta>)> = Vec::with_capacity(updates.len());
        for signed in &updates {
            let update = &signed.app_state_update;
            let session = self.load_open_session(tx.as_ref(), update).await?;
            self.verify_update_quorum(tx.as_ref(), &session, signed, now)
                .await?;
            let proposed = self.proposed_allocations(&session, update).await?;
            let current = tx.get_participant_allocations(&session.session_id).await?;
            let deltas = rebalance_deltas(&current, &proposed)?;
            legs.push((session, deltas));
        }

        if let Err(e) = ensure_conserved(legs.iter().flat_map(|(_, deltas)| deltas.iter())) {
            warn!(error = %e, "Rebalance rejected");
            return Err(e.into());
        }

        let pairs: Vec<_> = updates
            .iter()
            .map(|s| (s.app_state_update.app_session_id, s.app_state_update.version))
            .collect();
        let batch = batch_id(&pairs);
        let batch_account = batch.to_hex();

        let mut app_sessions = Vec::with_capacity(legs.len());
        for ((mut session, deltas), signed) in legs.into_iter().zip(&updates) {
            record_deltas(tx.as_mut(), &session.session_id, &deltas, now).await?;

            let session_account = session.session_id.to_hex();
            for (asset, net) in net_by_asset(&deltas) {
                if net.is_zero() {
                    continue;
                }
                let (from_account, to_account) = if net.is_sign_negative() {
                    (session_account.clone(), batch_account.clone())
                } else {
                    (batch_account.clone(), session_account.clone())
                };
                let amount = net.abs();
                let id = ledger_tx_id(
                    TransactionType::Rebalance,
                    &from_account,
                    &to_account,
                    &asset,
                    &amount,
                    &batch,
                )?;
                tx.record_transaction(Transaction {
                    id,
                    asset,
                    tx_type: TransactionType::Rebalance,
                    from_account,
                    to_account,
                    sender_state_id: None,
                    receiver_state_id: None,
                    amount,
                    created_at: now,
                })
                .await?;
            }

            advance_session(&mut session, &signed.app_state_update, now);
            tx.update_app_session(session.clone()).await?;
            app_sessions.push(session);
        }
        tx.commit().await?;

        info!(batch_id = %batch, sessions = app_sessions.len(), "App sessions rebalanced");
        Ok(RebalanceResponse {
            batch_id: batch,
            app_sessions,
        })
    }
}

use chrono::{DateTime, Utc};
use cn_core::allocation::{redistribution_deltas, withdrawal_deltas};
use cn_core::{
    Address, AllocationMap, AppSessionStatus, AppSessionV1, AppStateUpdateIntent, LedgerEntry,
    SignedAppStateUpdateV1, State, Transition, TransitionType,
};
use cn_store::StoreTx;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::{advance_session, record_deltas, AppSessionService};
use crate::error::{NodeError, NodeResult};
use crate::processor::transition_transaction;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitAppStateResponse {
    pub app_session: AppSessionV1,
    /// Node-signed Release states crediting participants' channels
    pub issued_states: Vec<State>,
}

impl AppSessionService {
    /// Apply an Operate, Withdraw or Close update
    #[instrument(
        skip(self, signed),
        fields(
            app_session_id = %signed.app_state_update.app_session_id,
            intent = %signed.app_state_update.intent,
            version = signed.app_state_update.version
        )
    )]
    pub async fn submit_app_state(
        &self,
        signed: SignedAppStateUpdateV1,
    ) -> NodeResult<SubmitAppStateResponse> {
        let update = &signed.app_state_update;
        match update.intent {
            AppStateUpdateIntent::Operate
            | AppStateUpdateIntent::Withdraw
            | AppStateUpdateIntent::Close => {}
            AppStateUpdateIntent::Deposit => {
                return Err(NodeError::invalid_request(
                    "deposit updates must be submitted with a commit state",
                ))
            }
            AppStateUpdateIntent::Rebalance => {
                return Err(NodeError::invalid_request(
                    "rebalance updates must be submitted as a batch",
                ))
            }
        }
        self.check_session_data(&update.session_data)?;

        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut session = self.load_open_session(tx.as_ref(), update).await?;
        let outcome = self
            .verify_update_quorum(tx.as_ref(), &session, &signed, now)
            .await?;
        let proposed = self.proposed_allocations(&session, update).await?;
        let current = tx.get_participant_allocations(&session.session_id).await?;

        let mut issued_states = Vec::new();
        match update.intent {
            AppStateUpdateIntent::Operate => {
                let balances = tx.get_app_session_balances(&session.session_id).await?;
                let deltas = redistribution_deltas(&current, &balances, &proposed)?;
                record_deltas(tx.as_mut(), &session.session_id, &deltas, now).await?;
            }
            AppStateUpdateIntent::Withdraw => {
                let deltas = withdrawal_deltas(&current, &proposed)?;
                record_deltas(tx.as_mut(), &session.session_id, &deltas, now).await?;
                for delta in &deltas {
                    let state = self
                        .release(
                            tx.as_mut(),
                            &session,
                            delta.participant,
                            &delta.asset,
                            -delta.delta,
                            now,
                        )
                        .await?;
                    issued_states.push(state);
                }
            }
            AppStateUpdateIntent::Close => {
                let balances = tx.get_app_session_balances(&session.session_id).await?;
                let deltas = redistribution_deltas(&current, &balances, &proposed)?;
                record_deltas(tx.as_mut(), &session.session_id, &deltas, now).await?;
                issued_states = self
                    .release_all(tx.as_mut(), &session, &proposed, now)
                    .await?;
                session.status = AppSessionStatus::Closed;
            }
            AppStateUpdateIntent::Deposit | AppStateUpdateIntent::Rebalance => {}
        }

        advance_session(&mut session, update, now);
        tx.update_app_session(session.clone()).await?;
        tx.commit().await?;

        info!(
            weight = outcome.achieved,
            released = issued_states.len(),
            status = %session.status,
            "App session updated"
        );
        Ok(SubmitAppStateResponse {
            app_session: session,
            issued_states,
        })
    }

    /// Release every remaining allocation of a closing session
    async fn release_all(
        &self,
        tx: &mut dyn StoreTx,
        session: &AppSessionV1,
        allocations: &AllocationMap,
        now: DateTime<Utc>,
    ) -> NodeResult<Vec<State>> {
        let account_id = session.session_id.to_hex();
        let mut issued = Vec::new();
        for ((participant, asset), amount) in allocations {
            if amount.is_zero() {
                continue;
            }
            tx.record_ledger_entry(LedgerEntry {
                account_id: account_id.clone(),
                wallet: *participant,
                asset: asset.clone(),
                amount: -*amount,
                created_at: now,
            })
            .await?;
            issued.push(
                self.release(tx, session, *participant, asset, *amount, now)
                    .await?,
            );
        }
        Ok(issued)
    }

    /// Credit `amount` of session funds to the participant's channel state
    async fn release(
        &self,
        tx: &mut dyn StoreTx,
        session: &AppSessionV1,
        participant: Address,
        asset: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> NodeResult<State> {
        let state = self
            .processor
            .issue_node_state(
                tx,
                participant,
                asset,
                Transition::new(TransitionType::Release, session.session_id.to_hex(), amount),
            )
            .await?;
        if let Some(record) = transition_transaction(&state, None, now)? {
            tx.record_transaction(record).await?;
        }
        debug!(
            app_session_id = %session.session_id,
            wallet = %participant,
            asset = %asset,
            amount = %amount,
            "Session funds released"
        );
        Ok(state)
    }
}

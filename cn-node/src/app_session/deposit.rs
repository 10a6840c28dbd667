use chrono::Utc;
use cn_core::allocation::{check_precision, deposit_deltas};
use cn_core::{
    AppSessionV1, AppStateUpdateIntent, CoreError, SignedAppStateUpdateV1, State, TransitionType,
    H256,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{advance_session, record_deltas, AppSessionService};
use crate::error::{NodeError, NodeResult};
use crate::processor::transition_transaction;

/// Deposit update with the depositor's Commit state that funds it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitDepositRequest {
    pub app_state_update: SignedAppStateUpdateV1,
    pub user_state: State,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitDepositResponse {
    pub app_session: AppSessionV1,
    /// Countersignature on the committed channel state
    pub node_sig: String,
}

impl AppSessionService {
    /// Move channel funds into a session through a Commit transition
    #[instrument(
        skip(self, request),
        fields(
            app_session_id = %request.app_state_update.app_state_update.app_session_id,
            wallet = %request.user_state.user_wallet,
            asset = %request.user_state.asset
        )
    )]
    pub async fn submit_deposit_state(
        &self,
        request: SubmitDepositRequest,
    ) -> NodeResult<SubmitDepositResponse> {
        let SubmitDepositRequest {
            app_state_update: signed,
            user_state,
        } = request;
        let update = &signed.app_state_update;

        if update.intent != AppStateUpdateIntent::Deposit {
            return Err(NodeError::invalid_request(format!(
                "expected a deposit update, got {}",
                update.intent
            )));
        }
        self.check_session_data(&update.session_data)?;

        let transition = user_state
            .transition
            .as_ref()
            .ok_or(CoreError::MissingTransition)?;
        if transition.kind != TransitionType::Commit {
            return Err(NodeError::invalid_request(format!(
                "deposit requires a commit transition, got {}",
                transition.kind
            )));
        }
        if H256::from_hex(&transition.account_id)? != update.app_session_id {
            return Err(NodeError::invalid_request(
                "commit does not target the app session",
            ));
        }
        let asset = user_state.asset.as_str();
        let amount = transition.amount;

        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut session = self.load_open_session(tx.as_ref(), update).await?;
        if !session.is_participant(&user_state.user_wallet) {
            return Err(CoreError::NonParticipant {
                participant: user_state.user_wallet.to_hex(),
            }
            .into());
        }
        let outcome = self
            .verify_update_quorum(tx.as_ref(), &session, &signed, now)
            .await?;

        let decimals = self.assets.get_asset_decimals(asset).await?;
        check_precision(asset, decimals, &amount)?;
        let proposed = self.proposed_allocations(&session, update).await?;
        let current = tx.get_participant_allocations(&session.session_id).await?;
        let deltas = deposit_deltas(&current, &proposed, asset, &amount)?;

        self.processor
            .ensure_channel_accepts(tx.as_ref(), &user_state, transition.kind)
            .await?;
        let accepted = self
            .processor
            .accept_user_state(tx.as_mut(), &user_state)
            .await?;
        let node_sig = accepted
            .node_sig
            .clone()
            .ok_or_else(|| NodeError::Internal("accepted state is not countersigned".into()))?;

        record_deltas(tx.as_mut(), &session.session_id, &deltas, now).await?;
        if let Some(record) = transition_transaction(&accepted, None, now)? {
            tx.record_transaction(record).await?;
        }

        advance_session(&mut session, update, now);
        tx.update_app_session(session.clone()).await?;
        tx.commit().await?;

        info!(
            amount = %amount,
            weight = outcome.achieved,
            version = session.version,
            "Deposit committed to app session"
        );
        Ok(SubmitDepositResponse {
            app_session: session,
            node_sig,
        })
    }
}

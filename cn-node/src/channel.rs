//! Channel Service
//!
//! Home channel creation and per-user state submission.
//!
//! Channel status flow: `Void -> Open -> {Challenged} -> Closed`. Off-chain
//! submissions are accepted while the home channel is `Void` or `Open`.

use chrono::Utc;
use cn_core::canon::home_channel_id;
use cn_core::engine::{ensure_state_matches, AdvanceContext};
use cn_core::{
    Address, Channel, ChannelId, ChannelStatus, ChannelType, CoreError, State, StateId,
    Transition, TransitionType,
};
use cn_store::{Store, StoreTx};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::NodeConfig;
use crate::error::{NodeError, NodeResult};
use crate::processor::{transition_transaction, StateProcessor};

/// Initial state of a home channel with its on-chain parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelCreationRequest {
    pub state: State,
    pub nonce: u64,
    pub challenge_duration: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelCreationResponse {
    pub channel: Channel,
    pub node_sig: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitStateResponse {
    pub state_id: StateId,
    pub node_sig: String,
}

/// Channel Service
#[derive(Clone)]
pub struct ChannelService {
    store: Arc<dyn Store>,
    processor: StateProcessor,
    config: NodeConfig,
}

impl ChannelService {
    pub fn new(store: Arc<dyn Store>, processor: StateProcessor, config: NodeConfig) -> Self {
        Self {
            store,
            processor,
            config,
        }
    }

    /// Open a home channel anchored at the submitted state
    #[instrument(skip(self, request), fields(wallet = %request.state.user_wallet, asset = %request.state.asset))]
    pub async fn request_creation(
        &self,
        request: ChannelCreationRequest,
    ) -> NodeResult<ChannelCreationResponse> {
        let ChannelCreationRequest {
            state: incoming,
            nonce,
            challenge_duration,
        } = request;

        if nonce == 0 {
            return Err(NodeError::invalid_request("nonce must be non-zero"));
        }
        if challenge_duration < self.config.min_challenge_duration_secs {
            return Err(NodeError::precondition(format!(
                "challenge duration {} is below the minimum of {}",
                challenge_duration, self.config.min_challenge_duration_secs
            )));
        }
        if incoming.home_ledger.token_address.is_zero() {
            return Err(NodeError::invalid_request("token address is required"));
        }
        if let Some(t) = &incoming.transition {
            if !matches!(
                t.kind,
                TransitionType::HomeDeposit | TransitionType::HomeWithdrawal
            ) {
                return Err(NodeError::invalid_request(format!(
                    "transition {} is not allowed at channel creation",
                    t.kind
                )));
            }
        }

        let wallet = incoming.user_wallet;
        let asset = incoming.asset.clone();
        let node = self.processor.node_address();
        let token = incoming.home_ledger.token_address;
        let channel_id = home_channel_id(&node, &wallet, &token, nonce, challenge_duration);

        let mut tx = self.store.begin().await?;

        let latest = tx.get_latest_state(&wallet, &asset, false).await?;
        if let Some(existing) = tx.get_home_channel(&wallet, &asset).await? {
            // A final state or a later state outside the channel (credits
            // received after finalize) leaves the old channel behind.
            let superseded = latest.as_ref().map_or(true, |s| {
                s.is_final || s.home_channel_id != Some(existing.channel_id)
            });
            if existing.status != ChannelStatus::Closed && !superseded {
                return Err(NodeError::precondition(format!(
                    "home channel {} already exists for {}",
                    existing.channel_id, asset
                )));
            }
        }

        let current = match latest {
            Some(state) if state.is_final => State::void(wallet, asset.as_str(), state.epoch + 1),
            Some(state) => state,
            None => State::void(wallet, asset.as_str(), 0),
        };
        if let Some(kind) = incoming.transition_kind() {
            tx.ensure_no_ongoing_state_transitions(&wallet, &asset, kind)
                .await?;
        }

        let expected = self.anchor_state(&current, &incoming, channel_id)?;
        ensure_state_matches(&expected, &incoming)?;
        self.processor.verify_user_signature(&incoming)?;

        let mut accepted = incoming;
        let node_sig = self.processor.countersign(&mut accepted)?;

        let now = Utc::now();
        let channel = Channel {
            channel_id,
            user_wallet: wallet,
            node_wallet: node,
            channel_type: ChannelType::Home,
            asset: asset.clone(),
            blockchain_id: accepted.home_ledger.blockchain_id,
            token_address: token,
            nonce,
            challenge_duration,
            status: ChannelStatus::Void,
            state_version: accepted.version,
            created_at: now,
            updated_at: now,
        };
        tx.create_channel(channel.clone()).await?;
        tx.store_state(accepted.clone()).await?;
        if let Some(record) = transition_transaction(&accepted, None, now)? {
            tx.record_transaction(record).await?;
        }
        tx.commit().await?;

        info!(
            channel_id = %channel_id,
            version = accepted.version,
            "Home channel created"
        );
        Ok(ChannelCreationResponse { channel, node_sig })
    }

    /// The successor of `current` bound to the new channel, with the
    /// creation transition applied when there is one
    fn anchor_state(
        &self,
        current: &State,
        incoming: &State,
        channel_id: ChannelId,
    ) -> NodeResult<State> {
        let mut base = current.next_state()?;
        base.home_channel_id = Some(channel_id);

        let ledger = &mut base.home_ledger;
        if !ledger.token_address.is_zero()
            && ledger.token_address != incoming.home_ledger.token_address
        {
            return Err(CoreError::StateMismatch {
                field: "home_ledger.token_address".to_string(),
                expected: ledger.token_address.to_hex(),
                actual: incoming.home_ledger.token_address.to_hex(),
            }
            .into());
        }
        ledger.token_address = incoming.home_ledger.token_address;
        ledger.blockchain_id = incoming.home_ledger.blockchain_id;

        match &incoming.transition {
            None => Ok(base),
            Some(transition) => Ok(self.processor.advancer().apply_transition(
                &base,
                transition,
                &AdvanceContext::default(),
            )?),
        }
    }

    /// Advance the user's state by one user-signed transition
    #[instrument(skip(self, incoming), fields(wallet = %incoming.user_wallet, asset = %incoming.asset, version = incoming.version))]
    pub async fn submit_state(&self, incoming: State) -> NodeResult<SubmitStateResponse> {
        let transition = incoming
            .transition
            .clone()
            .ok_or(CoreError::MissingTransition)?;
        if transition.kind == TransitionType::Commit {
            return Err(NodeError::precondition(
                "commit is only accepted together with an app session deposit",
            ));
        }

        let mut tx = self.store.begin().await?;
        self.processor
            .ensure_channel_accepts(tx.as_ref(), &incoming, transition.kind)
            .await?;

        let accepted = self.processor.accept_user_state(tx.as_mut(), &incoming).await?;
        let now = Utc::now();

        let mut mirror_state_id = None;
        match transition.kind {
            TransitionType::TransferSend => {
                let receiver = Address::from_hex(&transition.account_id)?;
                let mirror = self
                    .processor
                    .issue_node_state(
                        tx.as_mut(),
                        receiver,
                        &accepted.asset,
                        Transition::new(
                            TransitionType::TransferReceive,
                            accepted.user_wallet.to_hex(),
                            transition.amount,
                        ),
                    )
                    .await?;
                mirror_state_id = Some(mirror.id);
            }
            TransitionType::MutualLock | TransitionType::EscrowLock => {
                self.record_escrow_channel(tx.as_mut(), &accepted).await?;
            }
            TransitionType::EscrowDeposit | TransitionType::EscrowWithdraw => {
                self.processor
                    .close_escrow_channel(tx.as_mut(), &accepted)
                    .await?;
            }
            _ => {}
        }

        if let Some(record) = transition_transaction(&accepted, mirror_state_id, now)? {
            tx.record_transaction(record).await?;
        }
        tx.commit().await?;

        info!(
            transition = %transition.kind,
            amount = %transition.amount,
            "State countersigned"
        );
        let node_sig = accepted
            .node_sig
            .clone()
            .ok_or_else(|| NodeError::Internal("accepted state is not countersigned".into()))?;
        Ok(SubmitStateResponse {
            state_id: accepted.id,
            node_sig,
        })
    }

    async fn record_escrow_channel(&self, tx: &mut dyn StoreTx, state: &State) -> NodeResult<()> {
        let (Some(escrow_id), Some(escrow), Some(home_id)) = (
            state.escrow_channel_id,
            state.escrow_ledger.as_ref(),
            state.home_channel_id,
        ) else {
            return Err(NodeError::Internal("lock accepted without escrow".into()));
        };
        let home = tx
            .get_channel(&home_id)
            .await?
            .ok_or_else(|| NodeError::not_found("Channel", home_id.to_hex()))?;

        let now = Utc::now();
        tx.create_channel(Channel {
            channel_id: escrow_id,
            user_wallet: state.user_wallet,
            node_wallet: home.node_wallet,
            channel_type: ChannelType::Escrow,
            asset: state.asset.clone(),
            blockchain_id: escrow.blockchain_id,
            token_address: escrow.token_address,
            nonce: home.nonce,
            challenge_duration: home.challenge_duration,
            status: ChannelStatus::Void,
            state_version: state.version,
            created_at: now,
            updated_at: now,
        })
        .await?;
        Ok(())
    }

    // ==================== Queries ====================

    pub async fn get_home_channel(&self, wallet: &Address, asset: &str) -> NodeResult<Option<Channel>> {
        let tx = self.store.begin().await?;
        Ok(tx.get_home_channel(wallet, asset).await?)
    }

    pub async fn get_escrow_channel(&self, channel_id: &ChannelId) -> NodeResult<Option<Channel>> {
        let tx = self.store.begin().await?;
        Ok(tx
            .get_channel(channel_id)
            .await?
            .filter(|c| c.channel_type == ChannelType::Escrow))
    }

    pub async fn get_latest_state(
        &self,
        wallet: &Address,
        asset: &str,
        only_signed: bool,
    ) -> NodeResult<Option<State>> {
        let tx = self.store.begin().await?;
        Ok(tx.get_latest_state(wallet, asset, only_signed).await?)
    }

    pub async fn get_channels(
        &self,
        wallet: &Address,
        status: Option<ChannelStatus>,
    ) -> NodeResult<Vec<Channel>> {
        let tx = self.store.begin().await?;
        Ok(tx.get_channels(wallet, status).await?)
    }
}

//! Channel state processing shared by the channel and app session services
//!
//! Accepting a user-signed state and issuing a node-signed one both end in a
//! countersigned state stored under the pair's channel.

use chrono::{DateTime, Utc};
use cn_core::canon::state_digest;
use cn_core::engine::AdvanceContext;
use cn_core::{
    Address, ChannelStatus, State, StateAdvancer, StateId, Transaction, TransactionType,
    Transition, TransitionType,
};
use cn_signer::{decode_signature_hex, SigValidator, Signer};
use cn_store::StoreTx;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{NodeError, NodeResult};

/// Validates, signs and stores channel states
#[derive(Clone)]
pub struct StateProcessor {
    signer: Arc<dyn Signer>,
    validator: Arc<dyn SigValidator>,
    advancer: StateAdvancer,
}

impl StateProcessor {
    pub fn new(signer: Arc<dyn Signer>, validator: Arc<dyn SigValidator>) -> Self {
        Self {
            signer,
            validator,
            advancer: StateAdvancer::new(),
        }
    }

    /// Node wallet address
    pub fn node_address(&self) -> Address {
        self.signer.address()
    }

    pub fn advancer(&self) -> &StateAdvancer {
        &self.advancer
    }

    pub fn validator(&self) -> &dyn SigValidator {
        self.validator.as_ref()
    }

    /// Require a user signature over the packed state
    pub fn verify_user_signature(&self, state: &State) -> NodeResult<()> {
        let sig = state
            .user_sig
            .as_deref()
            .ok_or_else(|| NodeError::invalid_request("user signature is required"))?;
        let digest = state_digest(state)?;
        let bytes = decode_signature_hex(sig)?;
        if let Err(e) = self.validator.verify(&state.user_wallet, &digest, &bytes) {
            warn!(
                wallet = %state.user_wallet,
                asset = %state.asset,
                version = state.version,
                error = %e,
                "User signature rejected"
            );
            return Err(e.into());
        }
        Ok(())
    }

    /// Attach the node signature
    pub fn countersign(&self, state: &mut State) -> NodeResult<String> {
        let digest = state_digest(state)?;
        let sig = self.signer.sign_digest_hex(&digest)?;
        state.node_sig = Some(sig.clone());
        Ok(sig)
    }

    /// Reject submissions for a challenged or closed home channel, and
    /// submissions that need a home channel when there is none
    pub async fn ensure_channel_accepts(
        &self,
        tx: &dyn StoreTx,
        incoming: &State,
        kind: TransitionType,
    ) -> NodeResult<()> {
        match tx
            .get_home_channel(&incoming.user_wallet, &incoming.asset)
            .await?
        {
            Some(channel) if !channel.status.accepts_updates() => Err(NodeError::precondition(
                format!("home channel {} is {}", channel.channel_id, channel.status),
            )),
            Some(_) => Ok(()),
            None if kind.requires_home_channel() => Err(NodeError::precondition(format!(
                "no open home channel for {}",
                incoming.asset
            ))),
            None => Ok(()),
        }
    }

    /// Validate a user-submitted successor state, countersign it and store it.
    ///
    /// The caller checks channel status and records the transaction.
    pub async fn accept_user_state(
        &self,
        tx: &mut dyn StoreTx,
        incoming: &State,
    ) -> NodeResult<State> {
        let kind = incoming
            .transition_kind()
            .ok_or(cn_core::CoreError::MissingTransition)?;
        let wallet = incoming.user_wallet;
        let asset = incoming.asset.as_str();

        tx.ensure_no_ongoing_state_transitions(&wallet, asset, kind)
            .await?;

        let current = match tx.get_latest_state(&wallet, asset, false).await? {
            Some(state) => state,
            None => State::void(wallet, asset, 0),
        };
        let last_signed = tx.get_latest_state(&wallet, asset, true).await?;
        let ctx = AdvanceContext::new(last_signed.as_ref().and_then(State::transition_kind));

        self.advancer.validate_advancement(&current, incoming, &ctx)?;
        self.verify_user_signature(incoming)?;
        debug!(
            wallet = %wallet,
            asset = %asset,
            version = incoming.version,
            transition = %kind,
            "State advancement validated"
        );

        let mut accepted = incoming.clone();
        self.countersign(&mut accepted)?;
        tx.store_state(accepted.clone()).await?;
        self.checkpoint_home_channel(tx, &accepted).await?;
        Ok(accepted)
    }

    /// Issue a node-signed state carrying `transition` for `wallet`.
    ///
    /// A final or missing latest state is replaced by a void base in the next
    /// epoch, so credits are never lost.
    pub async fn issue_node_state(
        &self,
        tx: &mut dyn StoreTx,
        wallet: Address,
        asset: &str,
        transition: Transition,
    ) -> NodeResult<State> {
        let base = match tx.get_latest_state(&wallet, asset, false).await? {
            Some(latest) if latest.is_final => {
                State::void(wallet, asset, latest.epoch + 1).next_state()?
            }
            Some(latest) => latest.next_state()?,
            None => State::void(wallet, asset, 0).next_state()?,
        };

        let mut issued = self
            .advancer
            .apply_transition(&base, &transition, &AdvanceContext::default())?;
        self.countersign(&mut issued)?;
        tx.store_state(issued.clone()).await?;
        self.checkpoint_home_channel(tx, &issued).await?;

        debug!(
            wallet = %wallet,
            asset = %asset,
            version = issued.version,
            transition = %transition.kind,
            "Node state issued"
        );
        Ok(issued)
    }

    /// Move the home channel's checkpoint to the state's version
    async fn checkpoint_home_channel(&self, tx: &mut dyn StoreTx, state: &State) -> NodeResult<()> {
        let Some(channel_id) = state.home_channel_id else {
            return Ok(());
        };
        if let Some(mut channel) = tx.get_channel(&channel_id).await? {
            channel.state_version = state.version;
            channel.updated_at = Utc::now();
            tx.update_channel(channel).await?;
        }
        Ok(())
    }

    /// Mark the escrow channel of a completed episode closed
    pub async fn close_escrow_channel(&self, tx: &mut dyn StoreTx, state: &State) -> NodeResult<()> {
        let Some(escrow_id) = state.escrow_channel_id else {
            return Ok(());
        };
        if let Some(mut channel) = tx.get_channel(&escrow_id).await? {
            channel.status = ChannelStatus::Closed;
            channel.state_version = state.version;
            channel.updated_at = Utc::now();
            tx.update_channel(channel).await?;
        }
        Ok(())
    }
}

/// Audit record for the transition a state carries.
///
/// `counterpart_state_id` is the receiver's mirror state of a transfer.
pub fn transition_transaction(
    state: &State,
    counterpart_state_id: Option<StateId>,
    now: DateTime<Utc>,
) -> NodeResult<Option<Transaction>> {
    let Some(transition) = &state.transition else {
        return Ok(None);
    };
    let Some(tx_type) = TransactionType::for_transition(transition.kind) else {
        return Ok(None);
    };

    let wallet = state.user_wallet.to_hex();
    let home = state
        .home_channel_id
        .map(|id| id.to_hex())
        .unwrap_or_default();
    let escrow = state
        .escrow_channel_id
        .map(|id| id.to_hex())
        .unwrap_or_default();

    let (from_account, to_account, sender_state_id, receiver_state_id) = match transition.kind {
        TransitionType::HomeDeposit => (home, wallet, None, Some(state.id)),
        TransitionType::HomeWithdrawal | TransitionType::Finalize => {
            (wallet, home, Some(state.id), None)
        }
        TransitionType::EscrowDeposit => (escrow, wallet, None, Some(state.id)),
        TransitionType::EscrowWithdraw | TransitionType::EscrowLock => {
            (wallet, escrow, Some(state.id), None)
        }
        TransitionType::MutualLock => (home, escrow, Some(state.id), None),
        TransitionType::TransferSend => {
            let receiver = Address::from_hex(&transition.account_id)?;
            (wallet, receiver.to_hex(), Some(state.id), counterpart_state_id)
        }
        TransitionType::Commit => (
            wallet,
            transition.account_id.clone(),
            Some(state.id),
            None,
        ),
        TransitionType::Release => (
            transition.account_id.clone(),
            wallet,
            None,
            Some(state.id),
        ),
        TransitionType::TransferReceive | TransitionType::Migrate => return Ok(None),
    };

    Ok(Some(Transaction {
        id: transition.tx_id,
        asset: state.asset.clone(),
        tx_type,
        from_account,
        to_account,
        sender_state_id,
        receiver_state_id,
        amount: transition.amount,
        created_at: now,
    }))
}

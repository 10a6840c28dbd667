//! Deterministic identifiers

use super::Packer;
use crate::error::CoreResult;
use crate::types::{
    Address, AppDefinitionV1, AppSessionId, BatchId, ChannelId, StateId, TransactionType,
    TransitionType, TxId, H256,
};
use rust_decimal::Decimal;

/// State ID from (wallet, asset, epoch, version)
pub fn state_id(user_wallet: &Address, asset: &str, epoch: u64, version: u64) -> StateId {
    let mut p = Packer::new("state_id");
    p.address(user_wallet).string(asset).uint(epoch).uint(version);
    p.digest()
}

/// Home channel ID from (node, user, token, nonce, challenge duration)
pub fn home_channel_id(
    node: &Address,
    user: &Address,
    token: &Address,
    nonce: u64,
    challenge_duration: u64,
) -> ChannelId {
    let mut p = Packer::new("channel_id");
    p.address(node)
        .address(user)
        .address(token)
        .uint(nonce)
        .uint(challenge_duration);
    p.digest()
}

/// Escrow channel ID from the home channel and the locking state's version
pub fn escrow_channel_id(home_channel_id: &ChannelId, version: u64) -> ChannelId {
    let mut p = Packer::new("escrow_channel_id");
    p.h256(home_channel_id).uint(version);
    p.digest()
}

/// App session ID: hash of the packed definition
pub fn app_session_id(definition: &AppDefinitionV1) -> AppSessionId {
    super::pack_app_definition(definition).digest()
}

/// Transition ID, bound to the state the transition produces
pub fn transition_tx_id(
    state_id: &StateId,
    kind: TransitionType,
    account_id: &str,
    amount: &Decimal,
) -> CoreResult<TxId> {
    let mut p = Packer::new("transition");
    p.h256(state_id)
        .uint(u64::from(kind.code()))
        .string(account_id)
        .amount(amount)?;
    Ok(p.digest())
}

/// Transaction ID for ledger-only movements that have no transition.
///
/// `context` disambiguates repeated movements between the same accounts,
/// e.g. the session version or the rebalance batch.
pub fn ledger_tx_id(
    tx_type: TransactionType,
    from_account: &str,
    to_account: &str,
    asset: &str,
    amount: &Decimal,
    context: &H256,
) -> CoreResult<TxId> {
    let mut p = Packer::new("ledger_tx");
    p.uint(u64::from(tx_type.code()))
        .string(from_account)
        .string(to_account)
        .string(asset)
        .amount(amount)?
        .h256(context);
    Ok(p.digest())
}

/// Batch ID over (session ID, new version) pairs.
///
/// The pairs are sorted first, so the ID does not depend on request order.
pub fn batch_id(pairs: &[(AppSessionId, u64)]) -> BatchId {
    let mut sorted = pairs.to_vec();
    sorted.sort();

    let mut p = Packer::new("rebalance_batch");
    p.uint(sorted.len() as u64);
    for (session_id, version) in &sorted {
        p.h256(session_id).uint(*version);
    }
    p.digest()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_id_deterministic() {
        let wallet = Address([1; 20]);
        assert_eq!(state_id(&wallet, "usdc", 0, 1), state_id(&wallet, "usdc", 0, 1));
        assert_ne!(state_id(&wallet, "usdc", 0, 1), state_id(&wallet, "usdc", 0, 2));
        assert_ne!(state_id(&wallet, "usdc", 0, 1), state_id(&wallet, "usdc", 1, 1));
        assert_ne!(state_id(&wallet, "usdc", 0, 1), state_id(&wallet, "eth", 0, 1));
    }

    #[test]
    fn test_channel_ids() {
        let node = Address([1; 20]);
        let user = Address([2; 20]);
        let token = Address([3; 20]);
        let a = home_channel_id(&node, &user, &token, 1, 86400);
        let b = home_channel_id(&node, &user, &token, 2, 86400);
        assert_ne!(a, b);
        assert_ne!(escrow_channel_id(&a, 4), escrow_channel_id(&a, 5));
    }

    #[test]
    fn test_batch_id_order_independent() {
        let s1 = H256([1; 32]);
        let s2 = H256([2; 32]);
        let a = batch_id(&[(s1, 3), (s2, 7)]);
        let b = batch_id(&[(s2, 7), (s1, 3)]);
        assert_eq!(a, b);
        assert_ne!(a, batch_id(&[(s1, 3), (s2, 8)]));
    }

    #[test]
    fn test_transition_tx_id_binds_amount() {
        let sid = H256([5; 32]);
        let a = transition_tx_id(&sid, TransitionType::HomeDeposit, "", &Decimal::ONE).unwrap();
        let b = transition_tx_id(&sid, TransitionType::HomeDeposit, "", &Decimal::TWO).unwrap();
        assert_ne!(a, b);
    }
}

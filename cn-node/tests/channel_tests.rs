//! Channel service tests

mod common;

use common::*;
use cn_core::canon::home_channel_id;
use cn_core::engine::EscrowTarget;
use cn_core::{
    Address, AdvanceContext, ChannelStatus, ChannelType, CoreError, State, StateAdvancer,
    TransactionType, Transition, TransitionType,
};
use cn_node::{ChannelCreationRequest, ErrorKind, NodeError};
use cn_signer::{EcdsaSigner, Signer};
use cn_store::{Store, StoreTx};

/// Signed successor with an explicit advancement context
async fn next_with_context(
    h: &Harness,
    user: &EcdsaSigner,
    kind: TransitionType,
    amount: &str,
    ctx: AdvanceContext,
) -> State {
    let current = h.latest(&user.address(), USDC).await.unwrap();
    let mut state = StateAdvancer::new()
        .apply_transition(
            &current.next_state().unwrap(),
            &Transition::new(kind, user.address().to_hex(), dec(amount)),
            &ctx,
        )
        .unwrap();
    sign_state(user, &mut state);
    state
}

#[tokio::test]
async fn test_request_creation_opens_void_channel() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();

    let state = h.open_channel(&user, USDC, "100").await;
    assert_eq!(state.version, 1);
    assert_eq!(state.home_ledger.user_balance, dec("100"));
    assert!(state.is_signed());

    let channel = h
        .node
        .channels
        .get_home_channel(&user.address(), USDC)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(channel.status, ChannelStatus::Void);
    assert_eq!(channel.channel_type, ChannelType::Home);
    assert_eq!(channel.node_wallet, h.node_address());
    assert_eq!(Some(channel.channel_id), state.home_channel_id);

    let tx = h.store.begin().await.unwrap();
    let records = tx.get_transactions(&user.address().to_hex()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tx_type, TransactionType::HomeDeposit);
    assert_eq!(records[0].amount, dec("100"));
}

#[tokio::test]
async fn test_request_creation_parameters() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();
    let mut state = State::void(user.address(), USDC, 0).next_state().unwrap();
    state.home_ledger.token_address = token();
    sign_state(&user, &mut state);

    let err = h
        .node
        .channels
        .request_creation(ChannelCreationRequest {
            state: state.clone(),
            nonce: 1,
            challenge_duration: 60,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let err = h
        .node
        .channels
        .request_creation(ChannelCreationRequest {
            state: state.clone(),
            nonce: 0,
            challenge_duration: CHALLENGE,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedInput);

    // anchor state without the channel id is not the expected state
    let err = h
        .node
        .channels
        .request_creation(ChannelCreationRequest {
            state,
            nonce: 1,
            challenge_duration: CHALLENGE,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Core(CoreError::StateMismatch { .. })));
}

#[tokio::test]
async fn test_duplicate_home_channel_rejected() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();
    let first = h.open_channel(&user, USDC, "100").await;

    let err = h
        .node
        .channels
        .request_creation(ChannelCreationRequest {
            state: first,
            nonce: 2,
            challenge_duration: CHALLENGE,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Precondition(_)));
}

#[tokio::test]
async fn test_version_monotonicity() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();
    let wallet = user.address();
    h.open_channel(&user, USDC, "100").await;

    let deposit = h
        .next_user_state(&user, USDC, TransitionType::HomeDeposit, wallet.to_hex(), "50")
        .await;
    let response = h.node.channels.submit_state(deposit.clone()).await.unwrap();
    assert_eq!(response.state_id, deposit.id);

    // same version again
    let err = h.node.channels.submit_state(deposit).await.unwrap_err();
    assert!(matches!(
        err,
        NodeError::Core(CoreError::VersionMismatch {
            expected: 3,
            actual: 2
        })
    ));

    // skipping a version
    let mut skipped = h
        .next_user_state(&user, USDC, TransitionType::HomeWithdrawal, wallet.to_hex(), "10")
        .await;
    skipped.version += 1;
    sign_state(&user, &mut skipped);
    let err = h.node.channels.submit_state(skipped).await.unwrap_err();
    assert!(matches!(
        err,
        NodeError::Core(CoreError::VersionMismatch {
            expected: 3,
            actual: 4
        })
    ));

    let latest = h.latest(&wallet, USDC).await.unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(latest.home_ledger.user_balance, dec("150"));
}

#[tokio::test]
async fn test_signature_must_come_from_user() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();
    h.open_channel(&user, USDC, "100").await;

    let mut state = h
        .next_user_state(&user, USDC, TransitionType::HomeWithdrawal, user.address().to_hex(), "10")
        .await;
    sign_state(&EcdsaSigner::generate(), &mut state);

    let err = h.node.channels.submit_state(state).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Signature);
    assert_eq!(h.latest(&user.address(), USDC).await.unwrap().version, 1);
}

#[tokio::test]
async fn test_transfer_issues_receiver_state() {
    let h = Harness::new();
    let sender = EcdsaSigner::generate();
    let receiver = EcdsaSigner::generate();
    h.open_channel(&sender, USDC, "100").await;

    let transfer = h
        .next_user_state(
            &sender,
            USDC,
            TransitionType::TransferSend,
            receiver.address().to_hex(),
            "30",
        )
        .await;
    h.node.channels.submit_state(transfer.clone()).await.unwrap();

    let sent = h.latest(&sender.address(), USDC).await.unwrap();
    assert_eq!(sent.home_ledger.user_balance, dec("70"));

    let received = h.latest(&receiver.address(), USDC).await.unwrap();
    assert_eq!(received.version, 1);
    assert_eq!(received.home_ledger.user_balance, dec("30"));
    assert_eq!(
        received.transition_kind(),
        Some(TransitionType::TransferReceive)
    );
    assert!(received.node_sig.is_some());
    assert!(received.user_sig.is_none());

    let tx = h.store.begin().await.unwrap();
    let records = tx
        .get_transactions(&receiver.address().to_hex())
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].tx_type, TransactionType::Transfer);
    assert_eq!(records[0].sender_state_id, Some(transfer.id));
    assert_eq!(records[0].receiver_state_id, Some(received.id));
}

#[tokio::test]
async fn test_transfer_beyond_balance_rejected() {
    let h = Harness::new();
    let sender = EcdsaSigner::generate();
    h.open_channel(&sender, USDC, "10").await;

    let mut state = h
        .next_user_state(&sender, USDC, TransitionType::TransferSend, Address([7; 20]).to_hex(), "5")
        .await;
    let transition = state.transition.as_mut().unwrap();
    transition.amount = dec("11");
    sign_state(&sender, &mut state);

    let err = h.node.channels.submit_state(state).await.unwrap_err();
    assert!(matches!(
        err,
        NodeError::Core(CoreError::InsufficientBalance { .. })
    ));
    assert!(h.latest(&Address([7; 20]), USDC).await.is_none());
}

#[tokio::test]
async fn test_user_cannot_submit_node_transitions() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();
    h.open_channel(&user, USDC, "10").await;

    let receive = h
        .next_user_state(&user, USDC, TransitionType::TransferReceive, Address([7; 20]).to_hex(), "5")
        .await;
    let err = h.node.channels.submit_state(receive).await.unwrap_err();
    assert!(matches!(
        err,
        NodeError::Core(CoreError::NodeIssuedTransition { .. })
    ));

    let commit = h
        .next_user_state(&user, USDC, TransitionType::Commit, Address([7; 20]).to_hex(), "5")
        .await;
    let err = h.node.channels.submit_state(commit).await.unwrap_err();
    assert!(matches!(err, NodeError::Precondition(_)));
}

#[tokio::test]
async fn test_withdrawal_requires_home_channel() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();
    let mut withdrawal = State::void(user.address(), USDC, 0).next_state().unwrap();
    withdrawal.transition = Some(Transition::new(
        TransitionType::HomeWithdrawal,
        user.address().to_hex(),
        dec("1"),
    ));
    sign_state(&user, &mut withdrawal);
    let err = h.node.channels.submit_state(withdrawal).await.unwrap_err();
    assert!(matches!(err, NodeError::Precondition(_)));
}

#[tokio::test]
async fn test_closed_channel_rejects_updates() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();
    h.open_channel(&user, USDC, "100").await;

    let mut tx = h.store.begin().await.unwrap();
    let mut channel = tx
        .get_home_channel(&user.address(), USDC)
        .await
        .unwrap()
        .unwrap();
    channel.status = ChannelStatus::Challenged;
    tx.update_channel(channel).await.unwrap();
    tx.commit().await.unwrap();

    let state = h
        .next_user_state(&user, USDC, TransitionType::HomeWithdrawal, user.address().to_hex(), "10")
        .await;
    let err = h.node.channels.submit_state(state).await.unwrap_err();
    assert!(matches!(err, NodeError::Precondition(_)));
}

#[tokio::test]
async fn test_mutual_lock_blocks_until_escrow_deposit() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();
    let wallet = user.address();
    h.open_channel(&user, USDC, "100").await;

    let target = EscrowTarget {
        token_address: Address([0xbb; 20]),
        blockchain_id: 1,
    };
    let lock = next_with_context(
        &h,
        &user,
        TransitionType::MutualLock,
        "40",
        AdvanceContext::default().with_escrow_target(Some(target)),
    )
    .await;
    h.node.channels.submit_state(lock.clone()).await.unwrap();
    let locked = h.latest(&wallet, USDC).await.unwrap();
    assert_eq!(locked.home_ledger.node_balance, dec("40"));
    let escrow_ledger = locked.escrow_ledger.as_ref().unwrap();
    assert_eq!(escrow_ledger.user_balance, dec("40"));
    assert_eq!(escrow_ledger.user_net_flow, dec("40"));

    let escrow_id = lock.escrow_channel_id.unwrap();
    let escrow = h
        .node
        .channels
        .get_escrow_channel(&escrow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(escrow.channel_type, ChannelType::Escrow);
    assert_eq!(escrow.blockchain_id, 1);
    assert_eq!(escrow.status, ChannelStatus::Void);

    let withdrawal = h
        .next_user_state(&user, USDC, TransitionType::HomeWithdrawal, wallet.to_hex(), "10")
        .await;
    let err = h.node.channels.submit_state(withdrawal).await.unwrap_err();
    assert!(matches!(
        err,
        NodeError::Core(CoreError::OngoingTransition {
            pending: TransitionType::MutualLock,
            incoming: TransitionType::HomeWithdrawal
        })
    ));

    let deposit = next_with_context(
        &h,
        &user,
        TransitionType::EscrowDeposit,
        "40",
        AdvanceContext::new(Some(TransitionType::MutualLock)),
    )
    .await;
    h.node.channels.submit_state(deposit).await.unwrap();

    let latest = h.latest(&wallet, USDC).await.unwrap();
    assert_eq!(latest.home_ledger.user_balance, dec("140"));
    assert!(latest.home_ledger.node_balance.is_zero());
    assert!(latest.escrow_ledger.as_ref().unwrap().user_balance.is_zero());

    let escrow = h
        .node
        .channels
        .get_escrow_channel(&escrow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(escrow.status, ChannelStatus::Closed);

    let after = h
        .next_user_state(&user, USDC, TransitionType::HomeWithdrawal, wallet.to_hex(), "10")
        .await;
    assert!(after.escrow_ledger.is_none());
    h.node.channels.submit_state(after).await.unwrap();
}

#[tokio::test]
async fn test_finalize_ends_the_epoch() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();
    let wallet = user.address();
    h.open_channel(&user, USDC, "25").await;

    let finalize = h
        .next_user_state(&user, USDC, TransitionType::Finalize, wallet.to_hex(), "25")
        .await;
    h.node.channels.submit_state(finalize).await.unwrap();

    let final_state = h.latest(&wallet, USDC).await.unwrap();
    assert!(final_state.is_final);
    assert!(final_state.home_ledger.user_balance.is_zero());

    let mut late = final_state.clone();
    late.version += 1;
    late.is_final = false;
    late.transition = Some(Transition::new(
        TransitionType::HomeDeposit,
        wallet.to_hex(),
        dec("1"),
    ));
    sign_state(&user, &mut late);
    let err = h.node.channels.submit_state(late).await.unwrap_err();
    assert!(matches!(
        err,
        NodeError::Core(CoreError::StateFinalized { .. })
    ));
}

#[tokio::test]
async fn test_reopen_after_finalize_with_received_funds() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();
    let friend = EcdsaSigner::generate();
    let wallet = user.address();
    let first = h.open_channel(&user, USDC, "25").await;
    h.open_channel(&friend, USDC, "50").await;

    let finalize = h
        .next_user_state(&user, USDC, TransitionType::Finalize, wallet.to_hex(), "25")
        .await;
    h.node.channels.submit_state(finalize).await.unwrap();

    let transfer = h
        .next_user_state(&friend, USDC, TransitionType::TransferSend, wallet.to_hex(), "10")
        .await;
    h.node.channels.submit_state(transfer).await.unwrap();

    let received = h.latest(&wallet, USDC).await.unwrap();
    assert_eq!(received.epoch, 1);
    assert!(received.home_channel_id.is_none());
    assert_eq!(received.home_ledger.user_balance, dec("10"));

    let new_channel_id = home_channel_id(&h.node_address(), &wallet, &token(), 2, CHALLENGE);
    let mut anchor = received.next_state().unwrap();
    anchor.home_channel_id = Some(new_channel_id);
    anchor.home_ledger.token_address = token();
    anchor.home_ledger.blockchain_id = CHAIN_ID;
    sign_state(&user, &mut anchor);

    let response = h
        .node
        .channels
        .request_creation(ChannelCreationRequest {
            state: anchor,
            nonce: 2,
            challenge_duration: CHALLENGE,
        })
        .await
        .unwrap();
    assert_eq!(response.channel.channel_id, new_channel_id);
    assert_ne!(Some(new_channel_id), first.home_channel_id);

    let home = h
        .node
        .channels
        .get_home_channel(&wallet, USDC)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(home.channel_id, new_channel_id);

    let withdrawal = h
        .next_user_state(&user, USDC, TransitionType::HomeWithdrawal, wallet.to_hex(), "10")
        .await;
    h.node.channels.submit_state(withdrawal).await.unwrap();
    let latest = h.latest(&wallet, USDC).await.unwrap();
    assert!(latest.home_ledger.user_balance.is_zero());
    assert_eq!(latest.home_channel_id, Some(new_channel_id));
}

#[tokio::test]
async fn test_escrow_lock_then_withdraw() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();
    let wallet = user.address();
    h.open_channel(&user, USDC, "100").await;

    let target = EscrowTarget {
        token_address: Address([0xbb; 20]),
        blockchain_id: 1,
    };
    let lock = next_with_context(
        &h,
        &user,
        TransitionType::EscrowLock,
        "30",
        AdvanceContext::default().with_escrow_target(Some(target)),
    )
    .await;
    h.node.channels.submit_state(lock.clone()).await.unwrap();

    let locked = h.latest(&wallet, USDC).await.unwrap();
    assert_eq!(locked.home_ledger.user_balance, dec("70"));
    assert_eq!(locked.escrow_ledger.as_ref().unwrap().node_balance, dec("30"));

    let escrow_id = lock.escrow_channel_id.unwrap();
    let escrow = h
        .node
        .channels
        .get_escrow_channel(&escrow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(escrow.status, ChannelStatus::Void);
    assert_eq!(escrow.token_address, Address([0xbb; 20]));

    let deposit = h
        .next_user_state(&user, USDC, TransitionType::HomeDeposit, wallet.to_hex(), "5")
        .await;
    let err = h.node.channels.submit_state(deposit).await.unwrap_err();
    assert!(matches!(
        err,
        NodeError::Core(CoreError::OngoingTransition {
            pending: TransitionType::EscrowLock,
            incoming: TransitionType::HomeDeposit
        })
    ));

    let withdraw = next_with_context(
        &h,
        &user,
        TransitionType::EscrowWithdraw,
        "30",
        AdvanceContext::new(Some(TransitionType::EscrowLock)),
    )
    .await;
    h.node.channels.submit_state(withdraw).await.unwrap();

    let latest = h.latest(&wallet, USDC).await.unwrap();
    assert_eq!(latest.home_ledger.node_balance, dec("30"));
    let escrow_ledger = latest.escrow_ledger.as_ref().unwrap();
    assert!(escrow_ledger.node_balance.is_zero());
    assert_eq!(escrow_ledger.user_net_flow, dec("-30"));

    let escrow = h
        .node
        .channels
        .get_escrow_channel(&escrow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(escrow.status, ChannelStatus::Closed);

    let tx = h.store.begin().await.unwrap();
    let records = tx.get_transactions(&escrow_id.to_hex()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .any(|r| r.tx_type == TransactionType::EscrowLock && r.to_account == escrow_id.to_hex()));
    assert!(records
        .iter()
        .any(|r| r.tx_type == TransactionType::EscrowWithdraw && r.amount == dec("30")));
}

#[tokio::test]
async fn test_channel_queries() {
    let h = Harness::new();
    let user = EcdsaSigner::generate();
    h.open_channel(&user, USDC, "1").await;

    let all = h.node.channels.get_channels(&user.address(), None).await.unwrap();
    assert_eq!(all.len(), 1);
    let open = h
        .node
        .channels
        .get_channels(&user.address(), Some(ChannelStatus::Open))
        .await
        .unwrap();
    assert!(open.is_empty());

    let home_id = all[0].channel_id;
    assert!(h
        .node
        .channels
        .get_escrow_channel(&home_id)
        .await
        .unwrap()
        .is_none());

    let signed = h
        .node
        .channels
        .get_latest_state(&user.address(), USDC, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(signed.version, 1);
}

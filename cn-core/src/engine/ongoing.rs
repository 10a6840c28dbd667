//! Ongoing-transition policy
//!
//! A lock opens a two-step escrow episode. Until the completing transition
//! is signed, the (wallet, asset) pair accepts nothing else.

use crate::error::{CoreError, CoreResult};
use crate::types::{State, TransitionType};

/// Transition that must follow a pending one, if any
pub fn required_follow_up(pending: TransitionType) -> Option<TransitionType> {
    match pending {
        TransitionType::MutualLock => Some(TransitionType::EscrowDeposit),
        TransitionType::EscrowLock => Some(TransitionType::EscrowWithdraw),
        _ => None,
    }
}

/// Reject `incoming` while the last signed state left an episode open
pub fn ensure_no_ongoing_transition(
    last_signed: Option<&State>,
    incoming: TransitionType,
) -> CoreResult<()> {
    if incoming.is_node_issued() {
        return Ok(());
    }
    let Some(pending) = last_signed.and_then(State::transition_kind) else {
        return Ok(());
    };
    match required_follow_up(pending) {
        Some(required) if required != incoming => Err(CoreError::OngoingTransition {
            pending,
            incoming,
        }),
        _ => Ok(()),
    }
}

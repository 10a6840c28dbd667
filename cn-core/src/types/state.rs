//! Channel state
//!
//! A `State` is the versioned, signed ledger snapshot of one (wallet, asset)
//! pair. Version 0 of every epoch is a void state with zero balances and no
//! transition; each accepted submission advances the version by exactly one.

use crate::canon;
use crate::error::{CoreError, CoreResult};
use crate::types::{Address, ChannelId, Ledger, StateId, Transition, TransitionType};
use serde::{Deserialize, Serialize};

/// Versioned channel state for one (wallet, asset) pair
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Deterministic ID from (user_wallet, asset, epoch, version)
    pub id: StateId,
    pub user_wallet: Address,
    pub asset: String,
    pub epoch: u64,
    pub version: u64,
    /// Absent until the user opens a home channel
    pub home_channel_id: Option<ChannelId>,
    /// Present while an escrow episode is in progress
    pub escrow_channel_id: Option<ChannelId>,
    pub home_ledger: Ledger,
    pub escrow_ledger: Option<Ledger>,
    /// The transition that produced this version
    pub transition: Option<Transition>,
    pub is_final: bool,
    /// User signature over the packed state (hex)
    pub user_sig: Option<String>,
    /// Node countersignature over the packed state (hex)
    pub node_sig: Option<String>,
}

impl State {
    /// Zero-balance void state at version 0 of `epoch`
    pub fn void(user_wallet: Address, asset: impl Into<String>, epoch: u64) -> Self {
        let asset = asset.into();
        Self {
            id: canon::state_id(&user_wallet, &asset, epoch, 0),
            user_wallet,
            asset,
            epoch,
            version: 0,
            home_channel_id: None,
            escrow_channel_id: None,
            home_ledger: Ledger::default(),
            escrow_ledger: None,
            transition: None,
            is_final: false,
            user_sig: None,
            node_sig: None,
        }
    }

    /// Unsigned successor with the same ledgers and no transition.
    ///
    /// The escrow ledger is carried forward unless this state completed the
    /// escrow episode.
    pub fn next_state(&self) -> CoreResult<State> {
        if self.is_final {
            return Err(CoreError::StateFinalized {
                version: self.version,
            });
        }
        let version = self
            .version
            .checked_add(1)
            .ok_or_else(|| CoreError::InvalidState {
                reason: "state version overflow".to_string(),
            })?;

        let mut next = self.clone();
        next.version = version;
        next.id = canon::state_id(&self.user_wallet, &self.asset, self.epoch, version);
        next.transition = None;
        next.user_sig = None;
        next.node_sig = None;

        if self.transition_kind().is_some_and(|k| k.completes_escrow()) {
            next.escrow_channel_id = None;
            next.escrow_ledger = None;
        }
        Ok(next)
    }

    /// Type of the transition that produced this state, if any
    pub fn transition_kind(&self) -> Option<TransitionType> {
        self.transition.as_ref().map(|t| t.kind)
    }

    /// Both parties have signed
    pub fn is_signed(&self) -> bool {
        self.user_sig.is_some() && self.node_sig.is_some()
    }

    /// The state is a void version-0 state
    pub fn is_void(&self) -> bool {
        self.version == 0 && self.transition.is_none()
    }

    /// Recompute the derived ID from the identifying fields
    pub fn expected_id(&self) -> StateId {
        canon::state_id(&self.user_wallet, &self.asset, self.epoch, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn wallet() -> Address {
        Address([0x11; 20])
    }

    #[test]
    fn test_void_state() {
        let state = State::void(wallet(), "usdc", 0);
        assert!(state.is_void());
        assert_eq!(state.id, state.expected_id());
        assert!(!state.is_signed());
    }

    #[test]
    fn test_next_state_bumps_version_and_id() {
        let state = State::void(wallet(), "usdc", 3);
        let next = state.next_state().unwrap();
        assert_eq!(next.version, 1);
        assert_eq!(next.epoch, 3);
        assert_ne!(next.id, state.id);
        assert_eq!(next.id, canon::state_id(&wallet(), "usdc", 3, 1));
    }

    #[test]
    fn test_next_state_drops_completed_escrow() {
        let mut state = State::void(wallet(), "usdc", 0);
        state.escrow_channel_id = Some(ChannelId::ZERO);
        state.escrow_ledger = Some(Ledger::default());
        state.transition = Some(Transition::new(
            TransitionType::EscrowDeposit,
            "",
            Decimal::ONE,
        ));
        let next = state.next_state().unwrap();
        assert!(next.escrow_ledger.is_none());
        assert!(next.escrow_channel_id.is_none());

        state.transition = Some(Transition::new(TransitionType::MutualLock, "", Decimal::ONE));
        let next = state.next_state().unwrap();
        assert!(next.escrow_ledger.is_some());
    }

    #[test]
    fn test_final_state_is_terminal() {
        let mut state = State::void(wallet(), "usdc", 0);
        state.is_final = true;
        assert!(matches!(
            state.next_state(),
            Err(CoreError::StateFinalized { .. })
        ));
    }
}

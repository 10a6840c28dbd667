//! State Advancer
//!
//! Applies exactly one transition per version and checks that a submitted
//! state is the one the rules produce.

use crate::canon;
use crate::error::{CoreError, CoreResult};
use crate::types::{Address, Ledger, State, Transition, TransitionType};
use rust_decimal::Decimal;
use tracing::debug;

/// Token and chain of an escrow ledger being opened
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EscrowTarget {
    pub token_address: Address,
    pub blockchain_id: u64,
}

impl From<&Ledger> for EscrowTarget {
    fn from(ledger: &Ledger) -> Self {
        Self {
            token_address: ledger.token_address,
            blockchain_id: ledger.blockchain_id,
        }
    }
}

/// Inputs the rules need beyond the two states
#[derive(Clone, Debug, Default)]
pub struct AdvanceContext {
    /// Transition of the last state signed by both parties
    pub last_signed_transition: Option<TransitionType>,
    /// Escrow ledger identity for lock transitions
    pub escrow_target: Option<EscrowTarget>,
}

impl AdvanceContext {
    pub fn new(last_signed_transition: Option<TransitionType>) -> Self {
        Self {
            last_signed_transition,
            escrow_target: None,
        }
    }

    pub fn with_escrow_target(mut self, target: Option<EscrowTarget>) -> Self {
        self.escrow_target = target;
        self
    }
}

/// Stateless transition engine
#[derive(Clone, Copy, Debug, Default)]
pub struct StateAdvancer;

impl StateAdvancer {
    pub fn new() -> Self {
        Self
    }

    /// Apply `transition` to `base`, which must already be the unsigned
    /// successor of the previous state (see [`State::next_state`]).
    ///
    /// The returned state carries the transition with its derived tx ID.
    pub fn apply_transition(
        &self,
        base: &State,
        transition: &Transition,
        ctx: &AdvanceContext,
    ) -> CoreResult<State> {
        let kind = transition.kind;
        let mut amount = transition.amount;

        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(CoreError::InvalidAmount {
                reason: format!("{kind} amount {amount} is negative"),
            });
        }
        if amount.is_zero() && kind != TransitionType::Finalize {
            return Err(CoreError::InvalidAmount {
                reason: format!("{kind} amount must be positive"),
            });
        }

        let mut next = base.clone();
        match kind {
            TransitionType::HomeDeposit => {
                require_home_channel(&next, kind)?;
                next.home_ledger.user_balance += amount;
                next.home_ledger.user_net_flow += amount;
            }
            TransitionType::HomeWithdrawal => {
                require_home_channel(&next, kind)?;
                next.home_ledger.debit_user(amount, "home")?;
                next.home_ledger.user_net_flow -= amount;
            }
            TransitionType::TransferSend => {
                let receiver = Address::from_hex(&transition.account_id)?;
                if receiver == next.user_wallet {
                    return Err(CoreError::InvalidState {
                        reason: "cannot transfer to self".to_string(),
                    });
                }
                next.home_ledger.debit_user(amount, "home")?;
                next.home_ledger.node_net_flow -= amount;
            }
            TransitionType::Commit => {
                next.home_ledger.debit_user(amount, "home")?;
                next.home_ledger.node_net_flow -= amount;
            }
            TransitionType::TransferReceive | TransitionType::Release => {
                next.home_ledger.user_balance += amount;
                next.home_ledger.node_net_flow += amount;
            }
            TransitionType::MutualLock => {
                let home_id = require_home_channel(&next, kind)?;
                let target = open_escrow_target(&next, ctx)?;
                next.home_ledger.node_balance += amount;
                next.home_ledger.node_net_flow += amount;

                let mut escrow = Ledger::new(target.token_address, target.blockchain_id);
                escrow.user_balance = amount;
                escrow.user_net_flow = amount;
                next.escrow_channel_id = Some(canon::escrow_channel_id(&home_id, next.version));
                next.escrow_ledger = Some(escrow);
            }
            TransitionType::EscrowLock => {
                let home_id = require_home_channel(&next, kind)?;
                let target = open_escrow_target(&next, ctx)?;
                next.home_ledger.debit_user(amount, "home")?;
                next.home_ledger.node_net_flow -= amount;

                let mut escrow = Ledger::new(target.token_address, target.blockchain_id);
                escrow.node_balance = amount;
                escrow.node_net_flow = amount;
                next.escrow_channel_id = Some(canon::escrow_channel_id(&home_id, next.version));
                next.escrow_ledger = Some(escrow);
            }
            TransitionType::EscrowDeposit => {
                require_preceding(ctx, kind, TransitionType::MutualLock)?;
                let escrow = next.escrow_ledger.as_mut().ok_or(CoreError::EscrowNotOpen)?;
                escrow.debit_user(amount, "escrow")?;
                escrow.node_net_flow -= amount;

                next.home_ledger.debit_node(amount, "home")?;
                next.home_ledger.user_balance += amount;
            }
            TransitionType::EscrowWithdraw => {
                require_preceding(ctx, kind, TransitionType::EscrowLock)?;
                let escrow = next.escrow_ledger.as_mut().ok_or(CoreError::EscrowNotOpen)?;
                escrow.debit_node(amount, "escrow")?;
                escrow.user_net_flow -= amount;

                next.home_ledger.node_balance += amount;
                next.home_ledger.node_net_flow += amount;
            }
            TransitionType::Finalize => {
                require_home_channel(&next, kind)?;
                if next.escrow_ledger.is_some() {
                    return Err(CoreError::InvalidState {
                        reason: "cannot finalize while an escrow channel is open".to_string(),
                    });
                }
                if amount != next.home_ledger.user_balance {
                    return Err(CoreError::InvalidAmount {
                        reason: format!(
                            "finalize amount {amount} must equal user balance {}",
                            next.home_ledger.user_balance
                        ),
                    });
                }
                amount = next.home_ledger.user_balance;
                next.home_ledger.user_net_flow -= amount;
                next.home_ledger.user_balance = Decimal::ZERO;
                next.is_final = true;
            }
            TransitionType::Migrate => {
                return Err(CoreError::UnsupportedTransition { transition: kind });
            }
        }

        next.home_ledger.validate()?;
        if let Some(escrow) = &next.escrow_ledger {
            escrow.validate()?;
        }

        let tx_id = canon::transition_tx_id(&next.id, kind, &transition.account_id, &amount)?;
        next.transition = Some(Transition {
            kind,
            tx_id,
            account_id: transition.account_id.clone(),
            amount,
        });

        debug!(
            wallet = %next.user_wallet,
            asset = %next.asset,
            version = next.version,
            transition = %kind,
            "Transition applied"
        );
        Ok(next)
    }

    /// Check that `incoming` is exactly the successor of `current` under the
    /// transition it carries.
    pub fn validate_advancement(
        &self,
        current: &State,
        incoming: &State,
        ctx: &AdvanceContext,
    ) -> CoreResult<()> {
        let transition = incoming
            .transition
            .as_ref()
            .ok_or(CoreError::MissingTransition)?;

        if transition.kind.is_node_issued() {
            return Err(CoreError::NodeIssuedTransition {
                transition: transition.kind,
            });
        }
        if transition.kind == TransitionType::Migrate {
            return Err(CoreError::UnsupportedTransition {
                transition: transition.kind,
            });
        }

        let expected_version = current.version.saturating_add(1);
        if incoming.version != expected_version {
            return Err(CoreError::VersionMismatch {
                expected: expected_version,
                actual: incoming.version,
            });
        }
        if incoming.epoch != current.epoch {
            return Err(CoreError::EpochMismatch {
                expected: current.epoch,
                actual: incoming.epoch,
            });
        }

        let ctx = if transition.kind.is_escrow_lock() {
            ctx.clone()
                .with_escrow_target(incoming.escrow_ledger.as_ref().map(EscrowTarget::from))
        } else {
            ctx.clone()
        };

        let base = current.next_state()?;
        let expected = self.apply_transition(&base, transition, &ctx)?;
        ensure_state_matches(&expected, incoming)
    }
}

fn require_home_channel(state: &State, kind: TransitionType) -> CoreResult<crate::types::ChannelId> {
    state
        .home_channel_id
        .ok_or(CoreError::MissingHomeChannel { transition: kind })
}

fn require_preceding(
    ctx: &AdvanceContext,
    kind: TransitionType,
    required: TransitionType,
) -> CoreResult<()> {
    if ctx.last_signed_transition != Some(required) {
        return Err(CoreError::InvalidPrecedingTransition {
            transition: kind,
            required,
            actual: ctx
                .last_signed_transition
                .map(|t| t.to_string())
                .unwrap_or_else(|| "none".to_string()),
        });
    }
    Ok(())
}

fn open_escrow_target(state: &State, ctx: &AdvanceContext) -> CoreResult<EscrowTarget> {
    if state.escrow_ledger.is_some() || state.escrow_channel_id.is_some() {
        return Err(CoreError::EscrowAlreadyOpen);
    }
    ctx.escrow_target.ok_or_else(|| CoreError::InvalidState {
        reason: "escrow ledger token and chain are required".to_string(),
    })
}

fn mismatch<T: std::fmt::Debug>(field: &str, expected: &T, actual: &T) -> CoreError {
    CoreError::StateMismatch {
        field: field.to_string(),
        expected: format!("{expected:?}"),
        actual: format!("{actual:?}"),
    }
}

/// Field-by-field comparison of a computed state with a submitted one.
/// Signatures are not compared.
pub fn ensure_state_matches(expected: &State, incoming: &State) -> CoreResult<()> {
    if expected.epoch != incoming.epoch {
        return Err(CoreError::EpochMismatch {
            expected: expected.epoch,
            actual: incoming.epoch,
        });
    }
    if expected.version != incoming.version {
        return Err(CoreError::VersionMismatch {
            expected: expected.version,
            actual: incoming.version,
        });
    }
    if expected.id != incoming.id {
        return Err(mismatch("id", &expected.id, &incoming.id));
    }
    if expected.user_wallet != incoming.user_wallet {
        return Err(mismatch("user_wallet", &expected.user_wallet, &incoming.user_wallet));
    }
    if expected.asset != incoming.asset {
        return Err(mismatch("asset", &expected.asset, &incoming.asset));
    }
    if expected.home_channel_id != incoming.home_channel_id {
        return Err(mismatch(
            "home_channel_id",
            &expected.home_channel_id,
            &incoming.home_channel_id,
        ));
    }
    if expected.escrow_channel_id != incoming.escrow_channel_id {
        return Err(mismatch(
            "escrow_channel_id",
            &expected.escrow_channel_id,
            &incoming.escrow_channel_id,
        ));
    }
    if expected.home_ledger != incoming.home_ledger {
        return Err(mismatch("home_ledger", &expected.home_ledger, &incoming.home_ledger));
    }
    if expected.escrow_ledger != incoming.escrow_ledger {
        return Err(mismatch(
            "escrow_ledger",
            &expected.escrow_ledger,
            &incoming.escrow_ledger,
        ));
    }
    if expected.transition != incoming.transition {
        return Err(mismatch("transition", &expected.transition, &incoming.transition));
    }
    if expected.is_final != incoming.is_final {
        return Err(mismatch("is_final", &expected.is_final, &incoming.is_final));
    }
    Ok(())
}

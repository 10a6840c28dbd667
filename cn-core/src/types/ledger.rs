//! Channel ledger
//!
//! A ledger holds the user/node balance pair of one channel together with the
//! cumulative net flows that produced it. Every transition keeps
//! `user_balance + node_balance == user_net_flow + node_net_flow`.

use crate::error::{CoreError, CoreResult};
use crate::types::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-channel balance and net-flow pair
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// Token contract on the ledger's chain
    pub token_address: Address,
    /// Chain the channel lives on
    pub blockchain_id: u64,
    /// Spendable user amount
    pub user_balance: Decimal,
    /// Cumulative signed user flow
    pub user_net_flow: Decimal,
    /// Spendable node amount
    pub node_balance: Decimal,
    /// Cumulative signed node flow
    pub node_net_flow: Decimal,
}

impl Ledger {
    /// Empty ledger bound to a token on a chain
    pub fn new(token_address: Address, blockchain_id: u64) -> Self {
        Self {
            token_address,
            blockchain_id,
            ..Default::default()
        }
    }

    /// Debit the user side, failing instead of going negative
    pub(crate) fn debit_user(&mut self, amount: Decimal, label: &str) -> CoreResult<()> {
        if amount > self.user_balance {
            return Err(CoreError::InsufficientBalance {
                ledger: format!("{label}.user"),
                required: amount,
                available: self.user_balance,
            });
        }
        self.user_balance -= amount;
        Ok(())
    }

    /// Debit the node side, failing instead of going negative
    pub(crate) fn debit_node(&mut self, amount: Decimal, label: &str) -> CoreResult<()> {
        if amount > self.node_balance {
            return Err(CoreError::InsufficientBalance {
                ledger: format!("{label}.node"),
                required: amount,
                available: self.node_balance,
            });
        }
        self.node_balance -= amount;
        Ok(())
    }

    /// Total amount locked in the channel
    pub fn total_balance(&self) -> Decimal {
        self.user_balance + self.node_balance
    }

    /// Check the balance/flow invariants
    pub fn validate(&self) -> CoreResult<()> {
        if self.user_balance.is_sign_negative() && !self.user_balance.is_zero() {
            return Err(CoreError::InvariantViolation {
                invariant: "non-negative user balance".to_string(),
                details: self.user_balance.to_string(),
            });
        }
        if self.node_balance.is_sign_negative() && !self.node_balance.is_zero() {
            return Err(CoreError::InvariantViolation {
                invariant: "non-negative node balance".to_string(),
                details: self.node_balance.to_string(),
            });
        }
        let flows = self.user_net_flow + self.node_net_flow;
        if self.total_balance() != flows {
            return Err(CoreError::InvariantViolation {
                invariant: "balances equal net flows".to_string(),
                details: format!("balances {} != flows {}", self.total_balance(), flows),
            });
        }
        Ok(())
    }
}

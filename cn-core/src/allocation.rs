//! App session allocation rules
//!
//! Allocations are held in ordered maps keyed by `(participant, asset)` so that
//! deltas, ledger entries and packed payloads come out in the same order on
//! every node.

use crate::error::{CoreError, CoreResult};
use crate::types::{Address, AppAllocationV1, AppStateUpdateIntent};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// `(participant, asset)` key
pub type AllocationKey = (Address, String);

/// Allocations by `(participant, asset)`
pub type AllocationMap = BTreeMap<AllocationKey, Decimal>;

/// Per-asset totals
pub type AssetTotals = BTreeMap<String, Decimal>;

/// Change of one participant's allocation of one asset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocationDelta {
    pub participant: Address,
    pub asset: String,
    pub delta: Decimal,
}

/// Build an allocation map, rejecting duplicates, negative amounts and
/// non-participants
pub fn build_allocation_map<F>(
    allocations: &[AppAllocationV1],
    is_participant: F,
) -> CoreResult<AllocationMap>
where
    F: Fn(&Address) -> bool,
{
    let mut map = AllocationMap::new();
    for allocation in allocations {
        if !is_participant(&allocation.participant) {
            return Err(CoreError::NonParticipant {
                participant: allocation.participant.to_hex(),
            });
        }
        if allocation.amount.is_sign_negative() && !allocation.amount.is_zero() {
            return Err(CoreError::NegativeAllocation {
                participant: allocation.participant.to_hex(),
                asset: allocation.asset.clone(),
                amount: allocation.amount,
            });
        }
        let key = (allocation.participant, allocation.asset.clone());
        if map.insert(key, allocation.amount).is_some() {
            return Err(CoreError::DuplicateAllocation {
                participant: allocation.participant.to_hex(),
                asset: allocation.asset.clone(),
            });
        }
    }
    Ok(map)
}

/// Reject amounts with more fractional digits than the asset has
pub fn check_precision(asset: &str, decimals: u32, amount: &Decimal) -> CoreResult<()> {
    if amount.normalize().scale() > decimals {
        return Err(CoreError::PrecisionExceeded {
            asset: asset.to_string(),
            decimals,
            amount: *amount,
        });
    }
    Ok(())
}

/// Sum allocations per asset
pub fn asset_totals(map: &AllocationMap) -> AssetTotals {
    let mut totals = AssetTotals::new();
    for ((_, asset), amount) in map {
        *totals.entry(asset.clone()).or_default() += *amount;
    }
    totals
}

/// Nonzero differences `proposed - current` over the union of keys
pub fn allocation_deltas(current: &AllocationMap, proposed: &AllocationMap) -> Vec<AllocationDelta> {
    let mut deltas = BTreeMap::new();
    for (key, amount) in current {
        *deltas.entry(key.clone()).or_insert(Decimal::ZERO) -= *amount;
    }
    for (key, amount) in proposed {
        *deltas.entry(key.clone()).or_insert(Decimal::ZERO) += *amount;
    }
    deltas
        .into_iter()
        .filter(|(_, delta)| !delta.is_zero())
        .map(|((participant, asset), delta)| AllocationDelta {
            participant,
            asset,
            delta,
        })
        .collect()
}

fn missing(key: &AllocationKey) -> CoreError {
    CoreError::MissingAllocation {
        participant: key.0.to_hex(),
        asset: key.1.clone(),
    }
}

/// Every nonzero current pair must be listed in the proposal
fn ensure_covers(current: &AllocationMap, proposed: &AllocationMap) -> CoreResult<()> {
    match current
        .iter()
        .find(|(key, amount)| !amount.is_zero() && !proposed.contains_key(*key))
    {
        Some((key, _)) => Err(missing(key)),
        None => Ok(()),
    }
}

/// Operate and Close: the proposal must re-allocate every asset's balance
/// exactly. Pairs left out of the proposal count as zero.
pub fn redistribution_deltas(
    current: &AllocationMap,
    balances: &AssetTotals,
    proposed: &AllocationMap,
) -> CoreResult<Vec<AllocationDelta>> {
    let proposed_totals = asset_totals(proposed);

    for (asset, balance) in balances {
        if balance.is_zero() {
            continue;
        }
        match proposed_totals.get(asset) {
            None => {
                return Err(CoreError::MissingAllocation {
                    participant: "any participant".to_string(),
                    asset: asset.clone(),
                })
            }
            Some(total) if total != balance => {
                return Err(CoreError::AllocationMismatch {
                    asset: asset.clone(),
                    expected: *balance,
                    actual: *total,
                })
            }
            Some(_) => {}
        }
    }
    for (asset, total) in &proposed_totals {
        let balance = balances.get(asset).copied().unwrap_or_default();
        if *total != balance {
            return Err(CoreError::AllocationMismatch {
                asset: asset.clone(),
                expected: balance,
                actual: *total,
            });
        }
    }

    Ok(allocation_deltas(current, proposed))
}

/// Withdraw: allocations may only shrink, and every held pair is listed
pub fn withdrawal_deltas(
    current: &AllocationMap,
    proposed: &AllocationMap,
) -> CoreResult<Vec<AllocationDelta>> {
    ensure_covers(current, proposed)?;
    let deltas = allocation_deltas(current, proposed);
    forbid_direction(&deltas, AppStateUpdateIntent::Withdraw, |d| d.is_sign_positive())?;
    Ok(deltas)
}

/// Deposit: only `asset` may grow, nothing may shrink, and the increases
/// must add up to the committed `amount`.
pub fn deposit_deltas(
    current: &AllocationMap,
    proposed: &AllocationMap,
    asset: &str,
    amount: &Decimal,
) -> CoreResult<Vec<AllocationDelta>> {
    ensure_covers(current, proposed)?;
    let deltas = allocation_deltas(current, proposed);
    forbid_direction(&deltas, AppStateUpdateIntent::Deposit, |d| d.is_sign_negative())?;

    if let Some(other) = deltas.iter().find(|d| d.asset != asset) {
        return Err(CoreError::ForbiddenAllocationChange {
            intent: AppStateUpdateIntent::Deposit.to_string(),
            direction: "change".to_string(),
            participant: other.participant.to_hex(),
            asset: other.asset.clone(),
        });
    }

    let increases: Decimal = deltas.iter().map(|d| d.delta).sum();
    if increases != *amount {
        return Err(CoreError::AllocationMismatch {
            asset: asset.to_string(),
            expected: *amount,
            actual: increases,
        });
    }
    Ok(deltas)
}

/// Rebalance: every held pair is listed; conservation is checked across the
/// whole batch with [`ensure_conserved`]
pub fn rebalance_deltas(
    current: &AllocationMap,
    proposed: &AllocationMap,
) -> CoreResult<Vec<AllocationDelta>> {
    ensure_covers(current, proposed)?;
    Ok(allocation_deltas(current, proposed))
}

/// Sum deltas per asset
pub fn net_by_asset<'a, I>(deltas: I) -> AssetTotals
where
    I: IntoIterator<Item = &'a AllocationDelta>,
{
    let mut net = AssetTotals::new();
    for delta in deltas {
        *net.entry(delta.asset.clone()).or_default() += delta.delta;
    }
    net
}

/// Every asset's deltas must sum to zero
pub fn ensure_conserved<'a, I>(deltas: I) -> CoreResult<()>
where
    I: IntoIterator<Item = &'a AllocationDelta>,
{
    match net_by_asset(deltas).into_iter().find(|(_, net)| !net.is_zero()) {
        Some((asset, residual)) => Err(CoreError::ConservationViolation { asset, residual }),
        None => Ok(()),
    }
}

fn forbid_direction<F>(
    deltas: &[AllocationDelta],
    intent: AppStateUpdateIntent,
    forbidden: F,
) -> CoreResult<()>
where
    F: Fn(&Decimal) -> bool,
{
    match deltas.iter().find(|d| forbidden(&d.delta)) {
        Some(d) => Err(CoreError::ForbiddenAllocationChange {
            intent: intent.to_string(),
            direction: if d.delta.is_sign_positive() {
                "increase".to_string()
            } else {
                "decrease".to_string()
            },
            participant: d.participant.to_hex(),
            asset: d.asset.clone(),
        }),
        None => Ok(()),
    }
}

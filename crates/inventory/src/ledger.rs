//! Stock ledger posting rules.
//!
//! Balances are keyed by `(warehouse, product)`. A posting is a set of
//! deltas that must apply all-or-nothing: deltas are netted per key, every
//! resulting balance is checked, and only then are balances written.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, ProductId, WarehouseId};

use crate::move_type::MoveType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BalanceKey {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
}

impl BalanceKey {
    pub fn new(warehouse_id: WarehouseId, product_id: ProductId) -> Self {
        Self {
            warehouse_id,
            product_id,
        }
    }
}

/// Signed change to one balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub quantity: Decimal,
}

impl BalanceDelta {
    pub fn new(warehouse_id: WarehouseId, product_id: ProductId, quantity: Decimal) -> Self {
        Self {
            warehouse_id,
            product_id,
            quantity,
        }
    }

    pub fn key(&self) -> BalanceKey {
        BalanceKey::new(self.warehouse_id, self.product_id)
    }
}

/// Whether a posting may leave a balance below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeStockPolicy {
    /// No balance may go negative.
    #[default]
    Reject,
    /// Adjustments may drive a balance negative; other types may not.
    AllowForAdjustments,
}

impl NegativeStockPolicy {
    pub fn permits_negative(self, move_type: MoveType) -> bool {
        match self {
            NegativeStockPolicy::Reject => false,
            NegativeStockPolicy::AllowForAdjustments => move_type == MoveType::Adjustment,
        }
    }
}

/// Net deltas per key, ordered by key.
///
/// The ordering doubles as the lock acquisition order for backends that lock
/// balance rows individually.
pub fn net_deltas(deltas: &[BalanceDelta]) -> DomainResult<BTreeMap<BalanceKey, Decimal>> {
    let mut net: BTreeMap<BalanceKey, Decimal> = BTreeMap::new();
    for d in deltas {
        let entry = net.entry(d.key()).or_insert(Decimal::ZERO);
        *entry = entry
            .checked_add(d.quantity)
            .ok_or_else(|| out_of_range(d.key()))?;
    }
    Ok(net)
}

fn out_of_range(key: BalanceKey) -> DomainError {
    DomainError::validation(format!(
        "quantity out of range for product {} in warehouse {}",
        key.product_id, key.warehouse_id
    ))
}

/// Compute the balance after applying `net` to `current`.
pub fn resulting_balance(
    key: BalanceKey,
    current: Decimal,
    net: Decimal,
    allow_negative: bool,
) -> DomainResult<Decimal> {
    let next = current.checked_add(net).ok_or_else(|| out_of_range(key))?;
    if next < Decimal::ZERO && net < Decimal::ZERO && !allow_negative {
        return Err(DomainError::InsufficientStock {
            warehouse_id: key.warehouse_id,
            product_id: key.product_id,
            available: current,
            requested: -net,
        });
    }
    Ok(next)
}

/// Apply deltas to an in-memory balance book, all or nothing.
///
/// Missing balances start at zero and are created on first posting.
pub fn post_deltas(
    balances: &mut HashMap<BalanceKey, Decimal>,
    deltas: &[BalanceDelta],
    allow_negative: bool,
) -> DomainResult<()> {
    let mut staged = Vec::new();
    for (key, net) in net_deltas(deltas)? {
        let current = balances.get(&key).copied().unwrap_or(Decimal::ZERO);
        staged.push((key, resulting_balance(key, current, net, allow_negative)?));
    }

    for (key, value) in staged {
        balances.insert(key, value);
    }
    Ok(())
}

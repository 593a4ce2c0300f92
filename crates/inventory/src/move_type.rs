//! Move type policy: which warehouses a type needs and how posting moves stock.
//!
//! | type       | from     | to             | posting effect                 |
//! |------------|----------|----------------|--------------------------------|
//! | receipt    | optional | required       | +qty at `to`                   |
//! | issue      | required | optional       | -qty at `from`                 |
//! | transfer   | required | required, ≠from| -qty at `from`, +qty at `to`   |
//! | adjustment | required | optional       | signed qty at `from`           |

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, WarehouseId};

use crate::ledger::BalanceDelta;
use crate::line::StockMoveLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    Receipt,
    Issue,
    Transfer,
    Adjustment,
}

/// Kind of business document a move originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    PurchaseOrder,
    SaleOrder,
    Transfer,
    Adjustment,
}

impl ReferenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceType::PurchaseOrder => "purchase_order",
            ReferenceType::SaleOrder => "sale_order",
            ReferenceType::Transfer => "transfer",
            ReferenceType::Adjustment => "adjustment",
        }
    }
}

/// Source/destination warehouses of a move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseRefs {
    pub from: Option<WarehouseId>,
    pub to: Option<WarehouseId>,
}

impl WarehouseRefs {
    pub fn new(from: Option<WarehouseId>, to: Option<WarehouseId>) -> Self {
        Self { from, to }
    }
}

impl MoveType {
    pub fn as_str(self) -> &'static str {
        match self {
            MoveType::Receipt => "receipt",
            MoveType::Issue => "issue",
            MoveType::Transfer => "transfer",
            MoveType::Adjustment => "adjustment",
        }
    }

    /// Prefix used in generated move numbers.
    pub fn prefix(self) -> &'static str {
        match self {
            MoveType::Receipt => "RC",
            MoveType::Issue => "IS",
            MoveType::Transfer => "TR",
            MoveType::Adjustment => "AD",
        }
    }

    pub fn requires_from(self) -> bool {
        !matches!(self, MoveType::Receipt)
    }

    pub fn requires_to(self) -> bool {
        matches!(self, MoveType::Receipt | MoveType::Transfer)
    }

    /// Adjustment lines carry a signed quantity; all other types are positive.
    pub fn allows_signed_quantities(self) -> bool {
        matches!(self, MoveType::Adjustment)
    }

    pub fn validate_warehouses(self, refs: &WarehouseRefs) -> DomainResult<()> {
        if self.requires_from() && refs.from.is_none() {
            return Err(DomainError::validation(format!(
                "{} requires warehouse_from_id",
                self.as_str()
            )));
        }
        if self.requires_to() && refs.to.is_none() {
            return Err(DomainError::validation(format!(
                "{} requires warehouse_to_id",
                self.as_str()
            )));
        }
        if self == MoveType::Transfer && refs.from == refs.to {
            return Err(DomainError::validation(
                "transfer source and destination warehouses must differ",
            ));
        }
        Ok(())
    }

    pub fn validate_quantity(self, quantity: Decimal) -> DomainResult<()> {
        if quantity.is_zero() {
            return Err(DomainError::validation("quantity cannot be zero"));
        }
        if quantity.is_sign_negative() && !self.allows_signed_quantities() {
            return Err(DomainError::validation(format!(
                "{} quantities must be positive",
                self.as_str()
            )));
        }
        Ok(())
    }

    /// Warehouse whose branch anchors authorization: the destination for
    /// receipts, the source for everything else (transfers included).
    pub fn authorization_warehouse(self, refs: &WarehouseRefs) -> Option<WarehouseId> {
        match self {
            MoveType::Receipt => refs.to,
            MoveType::Issue | MoveType::Transfer | MoveType::Adjustment => refs.from,
        }
    }

    /// Balance deltas implied by posting `lines`, one or two per line.
    pub fn ledger_deltas(
        self,
        refs: &WarehouseRefs,
        lines: &[StockMoveLine],
    ) -> DomainResult<Vec<BalanceDelta>> {
        self.validate_warehouses(refs)?;

        let mut deltas = Vec::with_capacity(lines.len() * 2);
        for line in lines {
            match self {
                MoveType::Receipt => {
                    deltas.push(BalanceDelta::new(required(refs.to)?, line.product_id, line.quantity));
                }
                MoveType::Issue => {
                    deltas.push(BalanceDelta::new(required(refs.from)?, line.product_id, -line.quantity));
                }
                MoveType::Transfer => {
                    deltas.push(BalanceDelta::new(required(refs.from)?, line.product_id, -line.quantity));
                    deltas.push(BalanceDelta::new(required(refs.to)?, line.product_id, line.quantity));
                }
                MoveType::Adjustment => {
                    deltas.push(BalanceDelta::new(required(refs.from)?, line.product_id, line.quantity));
                }
            }
        }
        Ok(deltas)
    }
}

impl core::fmt::Display for MoveType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn required(warehouse: Option<WarehouseId>) -> DomainResult<WarehouseId> {
    warehouse.ok_or_else(|| DomainError::validation("missing required warehouse"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use stockflow_core::ProductId;

    use crate::ledger::{BalanceKey, net_deltas};
    use crate::line::NewLine;

    fn lines(qty: Decimal) -> (ProductId, Vec<StockMoveLine>) {
        let product = ProductId::new();
        (product, crate::line::assign_lines(vec![NewLine::new(product, qty, "pcs")]))
    }

    #[test]
    fn receipt_requires_destination_only() {
        let w = WarehouseId::new();
        assert!(MoveType::Receipt.validate_warehouses(&WarehouseRefs::new(None, Some(w))).is_ok());
        assert!(matches!(
            MoveType::Receipt.validate_warehouses(&WarehouseRefs::new(Some(w), None)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn issue_requires_source() {
        assert!(matches!(
            MoveType::Issue.validate_warehouses(&WarehouseRefs::new(None, Some(WarehouseId::new()))),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn transfer_to_same_warehouse_is_invalid() {
        let w = WarehouseId::new();
        let err = MoveType::Transfer
            .validate_warehouses(&WarehouseRefs::new(Some(w), Some(w)))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("must differ")));
    }

    #[test]
    fn only_adjustments_accept_negative_quantities() {
        assert!(MoveType::Adjustment.validate_quantity(dec!(-2)).is_ok());
        assert!(MoveType::Issue.validate_quantity(dec!(-2)).is_err());
        assert!(MoveType::Adjustment.validate_quantity(Decimal::ZERO).is_err());
    }

    #[test]
    fn transfer_moves_stock_out_of_source_and_into_destination() {
        let (from, to) = (WarehouseId::new(), WarehouseId::new());
        let (product, lines) = lines(dec!(4));
        let deltas = MoveType::Transfer
            .ledger_deltas(&WarehouseRefs::new(Some(from), Some(to)), &lines)
            .unwrap();
        assert_eq!(
            deltas,
            vec![
                BalanceDelta::new(from, product, dec!(-4)),
                BalanceDelta::new(to, product, dec!(4)),
            ]
        );
    }

    #[test]
    fn optional_warehouses_have_no_ledger_effect() {
        let (from, to) = (WarehouseId::new(), WarehouseId::new());
        let (_, lines) = lines(dec!(1));
        let deltas = MoveType::Receipt
            .ledger_deltas(&WarehouseRefs::new(Some(from), Some(to)), &lines)
            .unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].warehouse_id, to);
    }

    #[test]
    fn authorization_anchors_on_source_for_transfers() {
        let (from, to) = (WarehouseId::new(), WarehouseId::new());
        let refs = WarehouseRefs::new(Some(from), Some(to));
        assert_eq!(MoveType::Transfer.authorization_warehouse(&refs), Some(from));
        assert_eq!(MoveType::Receipt.authorization_warehouse(&refs), Some(to));
    }

    fn any_move_type() -> impl Strategy<Value = MoveType> {
        prop_oneof![
            Just(MoveType::Receipt),
            Just(MoveType::Issue),
            Just(MoveType::Transfer),
            Just(MoveType::Adjustment),
        ]
    }

    proptest! {
        #[test]
        fn posting_effect_matches_the_move_type_table(
            move_type in any_move_type(),
            raw in proptest::collection::vec((0usize..3, 1i64..500, any::<bool>()), 1..10),
        ) {
            let (from, to) = (WarehouseId::new(), WarehouseId::new());
            let refs = WarehouseRefs::new(Some(from), Some(to));
            let products = [ProductId::new(), ProductId::new(), ProductId::new()];

            let new_lines: Vec<NewLine> = raw
                .iter()
                .map(|(p, qty, negative)| {
                    let qty = Decimal::from(*qty);
                    let qty = if *negative && move_type.allows_signed_quantities() { -qty } else { qty };
                    NewLine::new(products[*p], qty, "pcs")
                })
                .collect();
            let lines = crate::line::assign_lines(new_lines);

            let mut expected: BTreeMap<BalanceKey, Decimal> = BTreeMap::new();
            let mut add = |warehouse, product, qty: Decimal| {
                *expected.entry(BalanceKey::new(warehouse, product)).or_insert(Decimal::ZERO) += qty;
            };
            for line in &lines {
                match move_type {
                    MoveType::Receipt => add(to, line.product_id, line.quantity),
                    MoveType::Issue => add(from, line.product_id, -line.quantity),
                    MoveType::Transfer => {
                        add(from, line.product_id, -line.quantity);
                        add(to, line.product_id, line.quantity);
                    }
                    MoveType::Adjustment => add(from, line.product_id, line.quantity),
                }
            }

            let deltas = move_type.ledger_deltas(&refs, &lines).unwrap();
            let net = net_deltas(&deltas).unwrap();
            prop_assert_eq!(&net, &expected);

            let total: Decimal = deltas.iter().map(|d| d.quantity).sum();
            let line_total: Decimal = lines.iter().map(|l| l.quantity).sum();
            match move_type {
                MoveType::Transfer => prop_assert_eq!(total, Decimal::ZERO),
                MoveType::Receipt | MoveType::Adjustment => prop_assert_eq!(total, line_total),
                MoveType::Issue => prop_assert_eq!(total, -line_total),
            }
        }
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, Entity, ProductId, StockMoveLineId};

use crate::move_type::MoveType;

/// A line as supplied by a caller (before identity is assigned).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLine {
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub uom: String,
}

impl NewLine {
    pub fn new(product_id: ProductId, quantity: Decimal, uom: impl Into<String>) -> Self {
        Self {
            product_id,
            quantity,
            uom: uom.into(),
        }
    }
}

/// A line owned by exactly one stock move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMoveLine {
    pub id: StockMoveLineId,
    /// 1-based position within the move.
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: Decimal,
    pub uom: String,
}

impl Entity for StockMoveLine {
    type Id = StockMoveLineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Assign fresh identities and line numbers to caller-supplied lines.
pub fn assign_lines(lines: Vec<NewLine>) -> Vec<StockMoveLine> {
    lines
        .into_iter()
        .enumerate()
        .map(|(idx, l)| StockMoveLine {
            id: StockMoveLineId::new(),
            line_no: idx as u32 + 1,
            product_id: l.product_id,
            quantity: l.quantity,
            uom: l.uom,
        })
        .collect()
}

/// Validate a full line set for a move type.
///
/// A zero or wrongly signed quantity is an error; removing a line is done by
/// replacing the line set, never by zeroing it.
pub fn validate_lines(move_type: MoveType, lines: &[StockMoveLine]) -> DomainResult<()> {
    if lines.is_empty() {
        return Err(DomainError::validation("a stock move needs at least one line"));
    }
    for line in lines {
        move_type
            .validate_quantity(line.quantity)
            .map_err(|e| match e {
                DomainError::Validation(msg) => {
                    DomainError::validation(format!("line {}: {msg}", line.line_no))
                }
                other => other,
            })?;
        if line.uom.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "line {}: unit of measure cannot be empty",
                line.line_no
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn lines_are_numbered_from_one() {
        let p = ProductId::new();
        let lines = assign_lines(vec![NewLine::new(p, dec!(1), "pcs"), NewLine::new(p, dec!(2), "kg")]);
        assert_eq!(lines.iter().map(|l| l.line_no).collect::<Vec<_>>(), vec![1, 2]);
        assert_ne!(lines[0].id(), lines[1].id());
    }

    #[test]
    fn empty_line_set_is_rejected() {
        assert!(matches!(
            validate_lines(MoveType::Receipt, &[]),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn error_names_the_offending_line() {
        let p = ProductId::new();
        let lines = assign_lines(vec![NewLine::new(p, dec!(3), "pcs"), NewLine::new(p, dec!(0), "pcs")]);
        match validate_lines(MoveType::Issue, &lines) {
            Err(DomainError::Validation(msg)) => assert!(msg.starts_with("line 2")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn blank_uom_is_rejected() {
        let lines = assign_lines(vec![NewLine::new(ProductId::new(), dec!(1), "  ")]);
        assert!(validate_lines(MoveType::Receipt, &lines).is_err());
    }
}

//! Inventory domain module: stock moves and their effect on stock balances.
//!
//! This crate contains business rules only, implemented as deterministic
//! domain logic (no IO, no HTTP, no storage):
//!
//! - [`move_type`]: per-type warehouse requirements and ledger effect
//! - [`line`]: stock move lines and their quantity rules
//! - [`stock_move`]: the approval state machine (aggregate root)
//! - [`ledger`]: all-or-nothing posting of balance deltas
//! - [`move_no`]: human-readable move numbers

pub mod ledger;
pub mod line;
pub mod move_no;
pub mod move_type;
pub mod stock_move;

pub use ledger::{BalanceDelta, BalanceKey, NegativeStockPolicy, net_deltas, post_deltas, resulting_balance};
pub use line::{NewLine, StockMoveLine, assign_lines, validate_lines};
pub use move_no::MoveNo;
pub use move_type::{MoveType, ReferenceType, WarehouseRefs};
pub use stock_move::{
    Approve, CreateMove, MoveStatus, Reject, ReplaceLines, StockMove, StockMoveApproved,
    StockMoveCommand, StockMoveCreated, StockMoveEvent, StockMoveLinesReplaced,
    StockMoveRejected, StockMoveSubmitted, Submit,
};

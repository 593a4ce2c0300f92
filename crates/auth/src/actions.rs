use serde::{Deserialize, Serialize};

use crate::Role;

/// Guarded stock move transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveAction {
    Submit,
    Approve,
    Reject,
}

impl MoveAction {
    /// Role/action table: which roles may perform this action.
    pub fn allowed_roles(self) -> &'static [Role] {
        match self {
            MoveAction::Submit => &[Role::StockKeeper],
            MoveAction::Approve | MoveAction::Reject => &[Role::WarehouseManager],
        }
    }

    /// Submission is reserved to the user who drafted the move.
    pub fn requires_creator(self) -> bool {
        matches!(self, MoveAction::Submit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MoveAction::Submit => "submit",
            MoveAction::Approve => "approve",
            MoveAction::Reject => "reject",
        }
    }
}

impl core::fmt::Display for MoveAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

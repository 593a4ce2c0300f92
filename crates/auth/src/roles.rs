use serde::{Deserialize, Serialize};

/// Roles recognised by the stock move workflow.
///
/// Tokens may carry roles from other modules (HR, finance, ...); those
/// deserialize as `Other` and never satisfy a stock move guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Designated move-creator role: drafts and submits moves for its branch.
    StockKeeper,
    /// Approves or rejects submitted moves for its branch.
    WarehouseManager,
    #[serde(other)]
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::StockKeeper => "stock_keeper",
            Role::WarehouseManager => "warehouse_manager",
            Role::Other => "other",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

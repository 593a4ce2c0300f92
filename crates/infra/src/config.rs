//! Service configuration, read from environment variables.

use stockflow_inventory::NegativeStockPolicy;

pub const DEFAULT_MOVE_NO_MAX_ATTEMPTS: u32 = 3;

/// Tunables for [`crate::StockMoveService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// How many fresh move numbers to try when an insert collides on `move_no`.
    pub move_no_max_attempts: u32,
    pub negative_stock: NegativeStockPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            move_no_max_attempts: DEFAULT_MOVE_NO_MAX_ATTEMPTS,
            negative_stock: NegativeStockPolicy::Reject,
        }
    }
}

impl ServiceConfig {
    /// Read `MOVE_NO_MAX_ATTEMPTS` and `ALLOW_NEGATIVE_ADJUSTMENTS`.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let move_no_max_attempts = lookup("MOVE_NO_MAX_ATTEMPTS")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.move_no_max_attempts);

        let allow_negative = lookup("ALLOW_NEGATIVE_ADJUSTMENTS")
            .and_then(|v| v.trim().parse::<bool>().ok())
            .unwrap_or(false);

        Self {
            move_no_max_attempts,
            negative_stock: if allow_negative {
                NegativeStockPolicy::AllowForAdjustments
            } else {
                NegativeStockPolicy::Reject
            },
        }
    }
}

//! # Stock Status
//!
//! Derived availability flag written after every reservation.
//!
//! ```text
//! available ≤ 0          → out_of_stock
//! available ≤ threshold  → low_stock
//! otherwise              → in_stock
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[default]
    InStock,
    LowStock,
    OutOfStock,
}

impl StockStatus {
    /// Derives the flag from aggregate available units.
    pub fn derive(available: i64, threshold: LowStockThreshold) -> Self {
        if available <= 0 {
            StockStatus::OutOfStock
        } else if available <= threshold.get() {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

/// The `low_stock_threshold` setting, always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowStockThreshold(i64);

impl LowStockThreshold {
    pub const DEFAULT: LowStockThreshold = LowStockThreshold(5);

    /// Clamps to at least 1.
    pub fn new(value: i64) -> Self {
        LowStockThreshold(value.max(1))
    }

    /// Parses the raw setting; unset or unparsable values fall back to 5.
    pub fn from_setting(raw: Option<&str>) -> Self {
        raw.and_then(|value| value.trim().parse::<i64>().ok())
            .map(Self::new)
            .unwrap_or(Self::DEFAULT)
    }

    #[inline]
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl Default for LowStockThreshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

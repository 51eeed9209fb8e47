//! Inventory bias from relative portfolio balances.
//!
//! A side whose share of the portfolio drops toward the floor
//! `0.5 - delta` quotes less and less, reaching zero at the floor:
//!
//! ```text
//! bias = max(0, (relative - floor) / relative)
//! ```
//!
//! Asset bias scales ask sizes, quote bias scales bid sizes.

use rust_decimal::Decimal;

/// Share of the maker's value held in each token, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeBalances {
    pub asset: Decimal,
    pub quote: Decimal,
}

impl RelativeBalances {
    /// Derive shares from values in a common unit. `None` when both are zero.
    pub fn from_values(asset_value: Decimal, quote_value: Decimal) -> Option<Self> {
        let total = asset_value.checked_add(quote_value)?;
        if total <= Decimal::ZERO {
            return None;
        }
        Some(Self {
            asset: asset_value.checked_div(total)?,
            quote: quote_value.checked_div(total)?,
        })
    }
}

/// Per-side size multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryBias {
    /// Multiplier on ask sizes.
    pub asset_side: Decimal,
    /// Multiplier on bid sizes.
    pub quote_side: Decimal,
}

impl InventoryBias {
    pub const NEUTRAL: Self = Self {
        asset_side: Decimal::ONE,
        quote_side: Decimal::ONE,
    };
}

impl Default for InventoryBias {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Computes `InventoryBias` from `RelativeBalances`.
#[derive(Debug, Clone)]
pub struct InventoryBiasCalculator {
    floor: Decimal,
}

impl InventoryBiasCalculator {
    pub fn new(delta: Decimal) -> Self {
        Self {
            floor: Decimal::new(5, 1) - delta,
        }
    }

    #[must_use]
    pub fn floor(&self) -> Decimal {
        self.floor
    }

    /// Bias for the given balances; neutral when balances are unknown.
    pub fn compute(&self, balances: Option<RelativeBalances>) -> InventoryBias {
        let Some(balances) = balances else {
            return InventoryBias::NEUTRAL;
        };
        match (self.side_bias(balances.asset), self.side_bias(balances.quote)) {
            (Some(asset_side), Some(quote_side)) => InventoryBias {
                asset_side,
                quote_side,
            },
            _ => InventoryBias::NEUTRAL,
        }
    }

    fn side_bias(&self, relative: Decimal) -> Option<Decimal> {
        // Zero share: the raw ratio diverges to -inf, which clamps to 0.
        if relative.is_zero() {
            return Some(Decimal::ZERO);
        }
        let raw = relative.checked_sub(self.floor)?.checked_div(relative)?;
        Some(raw.max(Decimal::ZERO))
    }
}

impl Default for InventoryBiasCalculator {
    fn default() -> Self {
        Self::new(Decimal::new(18, 2))
    }
}

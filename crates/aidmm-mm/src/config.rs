//! Per-maker quoting configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quoting parameters for one maker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakerConfig {
    /// Relative price move of any level that triggers a requote (0.003 = 0.3%).
    #[serde(default = "default_delta_trigger")]
    pub delta_trigger: Decimal,

    /// Distance of the inventory floor below 0.5.
    /// A side whose relative balance falls to `0.5 - inventory_delta` quotes nothing.
    #[serde(default = "default_inventory_delta")]
    pub inventory_delta: Decimal,

    /// Share of the reported escrowed liquidity exposed to sizing, in bps.
    #[serde(default = "default_liquidity_usage_bps")]
    pub liquidity_usage_bps: u32,

    /// Liquidity poll interval in milliseconds.
    #[serde(default = "default_liquidity_poll_interval_ms")]
    pub liquidity_poll_interval_ms: u64,

    /// Number of levels when deriving a ladder from available liquidity.
    #[serde(default = "default_ladder_levels")]
    pub ladder_levels: u32,
}

impl Default for MakerConfig {
    fn default() -> Self {
        Self {
            delta_trigger: default_delta_trigger(),
            inventory_delta: default_inventory_delta(),
            liquidity_usage_bps: default_liquidity_usage_bps(),
            liquidity_poll_interval_ms: default_liquidity_poll_interval_ms(),
            ladder_levels: default_ladder_levels(),
        }
    }
}

fn default_delta_trigger() -> Decimal {
    Decimal::new(3, 3) // 0.003
}
fn default_inventory_delta() -> Decimal {
    Decimal::new(18, 2) // 0.18
}
fn default_liquidity_usage_bps() -> u32 {
    1_000 // 10% of reported
}
fn default_liquidity_poll_interval_ms() -> u64 {
    1_000
}
fn default_ladder_levels() -> u32 {
    3
}

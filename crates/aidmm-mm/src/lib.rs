//! Maker decision logic for the aid market-making engine.
//!
//! Everything here is synchronous and side-effect free apart from logging:
//! - Liquidity tracking with haircut and relative balances
//! - Inventory bias from relative balances
//! - Target vs live book reconciliation
//! - Order-parameter assembly into encoded actions
//! - Per-block fill aggregation for offloads
//!
//! # Architecture
//!
//! ```text
//! liquidity reading → LiquidityTracker ─┐
//! target/live update ───────────────────┴→ BookReconciler.reconcile()
//!                                            ↓ Decision
//!                                          ActionBuilder.build() → PendingAction
//! fill / block sealed → FillAggregator → OffloadOrder
//! ```

pub mod builder;
pub mod config;
pub mod fills;
pub mod inventory;
pub mod liquidity;
pub mod reconciler;

pub use builder::ActionBuilder;
pub use config::MakerConfig;
pub use fills::{AggregateFillState, FillAggregator, MakerFill, OffloadOrder};
pub use inventory::{InventoryBias, InventoryBiasCalculator, RelativeBalances};
pub use liquidity::{
    ladder_from_liquidity, LiquidityLadder, LiquidityState, LiquidityTracker, RawLiquidity,
};
pub use reconciler::{clamp_to_liquidity, BookReconciler, Decision, NoOpReason};

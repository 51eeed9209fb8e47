//! Target vs live book reconciliation.
//!
//! Decides which single action, if any, brings the live book back in line
//! with the strategy's target:
//!
//! ```text
//! missing side anywhere      → NoOp
//! liquidity unknown          → NoOp
//! (clamp target sizes to available liquidity)
//! live empty                 → PlaceInitial
//! equal level counts         → Requote if any level moved > delta_trigger
//! level counts differ        → Wipe
//! ```

use aidmm_core::{ActionKind, Book, BookLevel, MakerId};
use rust_decimal::Decimal;
use std::fmt;
use tracing::{debug, trace};

use crate::liquidity::LiquidityState;

/// Why nothing needs to be done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// Target or live book (or one of their sides) is not available.
    MissingBook,
    /// No liquidity reading has succeeded yet.
    LiquidityUnknown,
    /// Live book is empty and so is the target.
    EmptyTarget,
    /// Every level is within the trigger threshold.
    WithinThreshold,
}

/// Reconciliation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoOp(NoOpReason),
    PlaceInitial,
    Requote,
    Wipe,
}

impl Decision {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoOp(_) => "no_op",
            Self::PlaceInitial => "place_initial",
            Self::Requote => "requote",
            Self::Wipe => "wipe",
        }
    }

    /// Action kind this decision submits, `None` for a no-op.
    #[must_use]
    pub fn action_kind(&self) -> Option<ActionKind> {
        match self {
            Self::NoOp(_) => None,
            Self::PlaceInitial => Some(ActionKind::PlaceInitial),
            Self::Requote => Some(ActionKind::Requote),
            Self::Wipe => Some(ActionKind::Wipe),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scale target sizes down so the book fits in `liquidity`.
///
/// Asks are bounded by the asset amount, bid notionals by the quote amount.
/// When either side is over, both sides are scaled by their own factor,
/// each capped at 1. Returns whether the book was touched.
pub fn clamp_to_liquidity(book: &mut Book, liquidity: &LiquidityState) -> bool {
    let total_ask = book.total_ask_size().inner();
    let total_bid_notional = book.total_bid_notional();
    if total_ask <= liquidity.asset_amount && total_bid_notional <= liquidity.quote_amount {
        return false;
    }

    let ask_factor = scale_factor(liquidity.asset_amount, total_ask);
    let bid_factor = scale_factor(liquidity.quote_amount, total_bid_notional);
    for level in book.asks.iter_mut().flatten() {
        level.size = level.size * ask_factor;
    }
    for level in book.bids.iter_mut().flatten() {
        level.size = level.size * bid_factor;
    }
    debug!(%ask_factor, %bid_factor, "Target book clamped to available liquidity");
    true
}

fn scale_factor(available: Decimal, total: Decimal) -> Decimal {
    if total <= Decimal::ZERO {
        return Decimal::ONE;
    }
    available
        .max(Decimal::ZERO)
        .checked_div(total)
        .map_or(Decimal::ONE, |f| f.min(Decimal::ONE))
}

/// Compares target and live books for one maker.
#[derive(Debug, Clone)]
pub struct BookReconciler {
    maker: MakerId,
    delta_trigger: Decimal,
}

impl BookReconciler {
    pub fn new(maker: MakerId, delta_trigger: Decimal) -> Self {
        Self {
            maker,
            delta_trigger,
        }
    }

    /// Decide the next action. `target` is clamped in place before comparison.
    pub fn reconcile(
        &self,
        target: &mut Book,
        live: Option<&Book>,
        liquidity: Option<&LiquidityState>,
    ) -> Decision {
        let decision = self.decide(target, live, liquidity);
        trace!(maker = %self.maker, ?decision, "Reconciled");
        decision
    }

    fn decide(
        &self,
        target: &mut Book,
        live: Option<&Book>,
        liquidity: Option<&LiquidityState>,
    ) -> Decision {
        let Some(live) = live else {
            return Decision::NoOp(NoOpReason::MissingBook);
        };
        let Some((live_asks, live_bids)) = live.sides() else {
            return Decision::NoOp(NoOpReason::MissingBook);
        };
        if target.sides().is_none() {
            return Decision::NoOp(NoOpReason::MissingBook);
        }
        let Some(liquidity) = liquidity else {
            return Decision::NoOp(NoOpReason::LiquidityUnknown);
        };

        clamp_to_liquidity(target, liquidity);
        let Some((target_asks, target_bids)) = target.sides() else {
            return Decision::NoOp(NoOpReason::MissingBook);
        };

        if live_asks.is_empty() && live_bids.is_empty() {
            if target_asks.is_empty() && target_bids.is_empty() {
                return Decision::NoOp(NoOpReason::EmptyTarget);
            }
            return Decision::PlaceInitial;
        }

        if target_asks.len() != live_asks.len() || target_bids.len() != live_bids.len() {
            return Decision::Wipe;
        }

        if self.any_moved(target_asks, live_asks) || self.any_moved(target_bids, live_bids) {
            Decision::Requote
        } else {
            Decision::NoOp(NoOpReason::WithinThreshold)
        }
    }

    fn any_moved(&self, target: &[BookLevel], live: &[BookLevel]) -> bool {
        target.iter().zip(live).any(|(t, l)| {
            let delta = t.price.relative_delta(l.price).unwrap_or(Decimal::ZERO);
            delta > self.delta_trigger
        })
    }
}

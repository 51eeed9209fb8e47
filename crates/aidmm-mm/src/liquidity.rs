//! Escrowed liquidity tracking.
//!
//! Turns raw liquidity readings into the haircut `LiquidityState` used to
//! clamp target books, and derives the relative balances that drive the
//! inventory bias. A failed reading never touches the previous state.

use aidmm_core::{from_fixed, AssetPair, Book, CoreError, MakerId};
use alloy::primitives::U256;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::inventory::RelativeBalances;

const BPS_DENOMINATOR: u64 = 10_000;

/// One reading from the liquidity source, in token base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLiquidity {
    pub asset_amount: U256,
    pub quote_amount: U256,
    pub ok: bool,
}

/// Liquidity available to sizing after the haircut, in human units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityState {
    /// Asset available to back asks.
    pub asset_amount: Decimal,
    /// Quote available to back bids.
    pub quote_amount: Decimal,
    pub safe: bool,
}

/// Latest liquidity and relative balances for one maker.
#[derive(Debug)]
pub struct LiquidityTracker {
    maker: MakerId,
    pair: AssetPair,
    usage_bps: u32,
    state: Option<LiquidityState>,
    balances: Option<RelativeBalances>,
}

impl LiquidityTracker {
    pub fn new(maker: MakerId, pair: AssetPair, usage_bps: u32) -> Self {
        Self {
            maker,
            pair,
            usage_bps,
            state: None,
            balances: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> Option<&LiquidityState> {
        self.state.as_ref()
    }

    #[must_use]
    pub fn relative_balances(&self) -> Option<RelativeBalances> {
        self.balances
    }

    /// Size ladders over the last good reading, `None` before the first one.
    #[must_use]
    pub fn ladder(&self, levels: u32) -> Option<LiquidityLadder> {
        self.state.as_ref().map(|state| LiquidityLadder {
            asset: ladder_from_liquidity(state.asset_amount, levels),
            quote: ladder_from_liquidity(state.quote_amount, levels),
        })
    }

    /// Apply a successful reading. `target` supplies the reference price.
    ///
    /// On error the previous state is kept.
    pub fn apply(&mut self, raw: &RawLiquidity, target: Option<&Book>) -> Result<(), CoreError> {
        let asset_units = self.haircut(raw.asset_amount)?;
        let quote_units = self.haircut(raw.quote_amount)?;
        let state = LiquidityState {
            asset_amount: from_fixed(asset_units, self.pair.asset.decimals)?,
            quote_amount: from_fixed(quote_units, self.pair.quote.decimals)?,
            safe: raw.ok,
        };
        if !state.safe {
            warn!(maker = %self.maker, "Liquidity source reported unsafe reading");
        }

        self.balances = Self::relative_to(&state, target);
        self.state = Some(state);
        debug!(
            maker = %self.maker,
            asset = %state.asset_amount,
            quote = %state.quote_amount,
            balances = ?self.balances,
            "Liquidity updated"
        );
        Ok(())
    }

    /// Record a failed reading. State and balances stay as they were.
    pub fn record_failure(&self, error: &dyn std::fmt::Display) {
        warn!(maker = %self.maker, error = %error, "Liquidity query failed, keeping previous state");
    }

    fn haircut(&self, amount: U256) -> Result<U256, CoreError> {
        amount
            .checked_mul(U256::from(self.usage_bps))
            .map(|v| v / U256::from(BPS_DENOMINATOR))
            .ok_or_else(|| CoreError::Overflow(amount.to_string()))
    }

    fn relative_to(state: &LiquidityState, target: Option<&Book>) -> Option<RelativeBalances> {
        let (best_ask, best_bid) = target?.top()?;
        let reference = best_ask.price.mid(best_bid.price);
        let asset_value = state.asset_amount.checked_mul(reference.inner())?;
        RelativeBalances::from_values(asset_value, state.quote_amount)
    }
}

/// Per-side sizes derived from available liquidity, in whole token units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiquidityLadder {
    pub asset: Vec<Decimal>,
    pub quote: Vec<Decimal>,
}

/// Split `available` into a triangular ladder of `levels` sizes.
///
/// Level `i` (1-based) gets `i` steps where one step is
/// `available / (n * (n + 1) / 2)`; the cumulative total never exceeds
/// `available`.
pub fn ladder_from_liquidity(available: Decimal, levels: u32) -> Vec<Decimal> {
    if levels == 0 || available <= Decimal::ZERO {
        return Vec::new();
    }
    let n = Decimal::from(levels);
    let steps = n * (n + Decimal::ONE) / Decimal::TWO;
    let step = available / steps;

    let mut total = Decimal::ZERO;
    let mut ladder = Vec::with_capacity(levels as usize);
    for i in 1..=levels {
        let size = step * Decimal::from(i);
        if total + size > available {
            break;
        }
        total += size;
        ladder.push(size);
    }
    ladder
}

#[cfg(test)]
mod tests {
    use super::*;
    use aidmm_core::{BookLevel, Price, Size, TokenMeta};
    use alloy::primitives::Address;
    use rust_decimal_macros::dec;

    fn pair() -> AssetPair {
        AssetPair::new(
            TokenMeta::new(Address::repeat_byte(0x11), 18, "WETH"),
            TokenMeta::new(Address::repeat_byte(0x22), 6, "USDC"),
        )
    }

    fn target(ask: Decimal, bid: Decimal) -> Book {
        Book::new(
            vec![BookLevel::new(Price::new(ask), Size::new(dec!(1)))],
            vec![BookLevel::new(Price::new(bid), Size::new(dec!(1)))],
        )
    }

    fn raw(asset_eth: u64, quote_usdc: u64) -> RawLiquidity {
        RawLiquidity {
            asset_amount: U256::from(asset_eth) * U256::from(10u64).pow(U256::from(18u8)),
            quote_amount: U256::from(quote_usdc) * U256::from(1_000_000u64),
            ok: true,
        }
    }

    #[test]
    fn test_haircut_applied() {
        let mut tracker = LiquidityTracker::new(MakerId(1), pair(), 1_000);
        tracker.apply(&raw(10, 20_000), None).unwrap();

        let state = tracker.state().unwrap();
        assert_eq!(state.asset_amount, dec!(1));
        assert_eq!(state.quote_amount, dec!(2000));
        assert!(state.safe);
        assert!(tracker.relative_balances().is_none());
    }

    #[test]
    fn test_relative_balances_from_mid() {
        let mut tracker = LiquidityTracker::new(MakerId(1), pair(), 10_000);
        tracker
            .apply(&raw(1, 6_000), Some(&target(dec!(2010), dec!(1990))))
            .unwrap();

        // 1 WETH at 2000 vs 6000 USDC
        let rel = tracker.relative_balances().unwrap();
        assert_eq!(rel.asset, dec!(0.25));
        assert_eq!(rel.quote, dec!(0.75));
    }

    #[test]
    fn test_empty_target_side_clears_balances() {
        let mut tracker = LiquidityTracker::new(MakerId(1), pair(), 10_000);
        tracker
            .apply(&raw(1, 1_000), Some(&target(dec!(2010), dec!(1990))))
            .unwrap();
        assert!(tracker.relative_balances().is_some());

        let one_sided = Book::new(vec![], vec![]);
        tracker.apply(&raw(1, 1_000), Some(&one_sided)).unwrap();
        assert!(tracker.relative_balances().is_none());
    }

    #[test]
    fn test_failure_keeps_previous_state() {
        let mut tracker = LiquidityTracker::new(MakerId(1), pair(), 10_000);
        tracker
            .apply(&raw(1, 1_000), Some(&target(dec!(2010), dec!(1990))))
            .unwrap();
        let before = (*tracker.state().unwrap(), tracker.relative_balances());

        tracker.record_failure(&"rpc timeout");
        assert_eq!((*tracker.state().unwrap(), tracker.relative_balances()), before);

        let overflow = RawLiquidity {
            asset_amount: U256::MAX,
            quote_amount: U256::ZERO,
            ok: true,
        };
        assert!(tracker.apply(&overflow, None).is_err());
        assert_eq!((*tracker.state().unwrap(), tracker.relative_balances()), before);
    }

    #[test]
    fn test_unsafe_reading_still_applied() {
        let mut tracker = LiquidityTracker::new(MakerId(1), pair(), 10_000);
        let mut reading = raw(2, 0);
        reading.ok = false;
        tracker.apply(&reading, None).unwrap();
        assert!(!tracker.state().unwrap().safe);
        assert_eq!(tracker.state().unwrap().asset_amount, dec!(2));
    }

    #[test]
    fn test_ladder_from_liquidity() {
        let ladder = ladder_from_liquidity(dec!(60), 3);
        assert_eq!(ladder, vec![dec!(10), dec!(20), dec!(30)]);

        let total: Decimal = ladder_from_liquidity(dec!(100), 6).iter().sum();
        assert!(total <= dec!(100));

        assert!(ladder_from_liquidity(dec!(100), 0).is_empty());
        assert!(ladder_from_liquidity(Decimal::ZERO, 3).is_empty());
    }

    #[test]
    fn test_tracker_ladder_follows_reading() {
        let mut tracker = LiquidityTracker::new(MakerId(1), pair(), 10_000);
        assert!(tracker.ladder(4).is_none());

        tracker.apply(&raw(10, 20_000), None).unwrap();
        let ladder = tracker.ladder(4).unwrap();
        assert_eq!(ladder.asset, vec![dec!(1), dec!(2), dec!(3), dec!(4)]);
        assert_eq!(
            ladder.quote,
            vec![dec!(2000), dec!(4000), dec!(6000), dec!(8000)]
        );
    }
}

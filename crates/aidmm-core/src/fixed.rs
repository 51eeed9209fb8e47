//! Fixed-point conversion between human-scale decimals and token base units.
//!
//! Offers are expressed on-chain as a numerator/denominator pair of token
//! amounts. Every amount is rounded half away from zero to the token's
//! decimal count and only then scaled, so no digit beyond `decimals` is ever
//! silently dropped.
//!
//! Venue offer convention: numerator is the token offered, denominator the
//! token requested.
//! - ask: offers asset, requests quote
//! - bid: offers quote, requests asset

use crate::book::{AssetPair, BookLevel};
use crate::error::{CoreError, Result};
use alloy::primitives::U256;
use rust_decimal::{Decimal, RoundingStrategy};

/// Largest scale `rust_decimal` can represent.
const MAX_DECIMAL_SCALE: u8 = 28;

/// One offer as a pair of token amounts in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferAmounts {
    pub numerator: U256,
    pub denominator: U256,
}

/// Parallel numerator/denominator arrays for a whole book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfferLadder {
    pub ask_numerators: Vec<U256>,
    pub ask_denominators: Vec<U256>,
    pub bid_numerators: Vec<U256>,
    pub bid_denominators: Vec<U256>,
}

impl OfferLadder {
    #[must_use]
    pub fn ask_count(&self) -> usize {
        self.ask_numerators.len()
    }

    #[must_use]
    pub fn bid_count(&self) -> usize {
        self.bid_numerators.len()
    }
}

/// Round `value` to `decimals` places and scale it to an integer amount.
pub fn to_fixed(value: Decimal, decimals: u8) -> Result<U256> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(CoreError::NegativeAmount(value.to_string()));
    }
    let rounded =
        value.round_dp_with_strategy(u32::from(decimals), RoundingStrategy::MidpointAwayFromZero);

    let mantissa = u128::try_from(rounded.mantissa())
        .map_err(|_| CoreError::NegativeAmount(rounded.to_string()))?;
    // Scale can only be below `decimals` after rounding.
    let exponent = u32::from(decimals).saturating_sub(rounded.scale());
    let factor = U256::from(10u8)
        .checked_pow(U256::from(exponent))
        .ok_or_else(|| CoreError::Overflow(format!("10^{exponent}")))?;

    U256::from(mantissa)
        .checked_mul(factor)
        .ok_or_else(|| CoreError::Overflow(format!("{value} at {decimals} decimals")))
}

/// Convert a base-unit amount back to a human-scale decimal.
pub fn from_fixed(amount: U256, decimals: u8) -> Result<Decimal> {
    if decimals > MAX_DECIMAL_SCALE {
        return Err(CoreError::UnsupportedDecimals(decimals));
    }
    let raw = u128::try_from(amount)
        .ok()
        .and_then(|v| i128::try_from(v).ok())
        .ok_or_else(|| CoreError::Overflow(amount.to_string()))?;

    Decimal::try_from_i128_with_scale(raw, u32::from(decimals))
        .map_err(|_| CoreError::Overflow(amount.to_string()))
}

/// Converts book levels into venue offers for one pair.
#[derive(Debug, Clone)]
pub struct FixedPointSizer {
    asset_decimals: u8,
    quote_decimals: u8,
}

impl FixedPointSizer {
    pub fn new(pair: &AssetPair) -> Self {
        Self {
            asset_decimals: pair.asset.decimals,
            quote_decimals: pair.quote.decimals,
        }
    }

    /// Ask offer: `size * bias` of asset for `price * size * bias` of quote.
    pub fn ask(&self, level: &BookLevel, bias: Decimal) -> Result<OfferAmounts> {
        let size = checked_mul(level.size.inner(), bias)?;
        let notional = checked_mul(level.price.inner(), size)?;
        Ok(OfferAmounts {
            numerator: to_fixed(size, self.asset_decimals)?,
            denominator: to_fixed(notional, self.quote_decimals)?,
        })
    }

    /// Bid offer: `price * size * bias` of quote for `size * bias` of asset.
    pub fn bid(&self, level: &BookLevel, bias: Decimal) -> Result<OfferAmounts> {
        let size = checked_mul(level.size.inner(), bias)?;
        let notional = checked_mul(level.price.inner(), size)?;
        Ok(OfferAmounts {
            numerator: to_fixed(notional, self.quote_decimals)?,
            denominator: to_fixed(size, self.asset_decimals)?,
        })
    }

    /// Size every level of both sides with per-side multipliers.
    pub fn ladder(
        &self,
        asks: &[BookLevel],
        bids: &[BookLevel],
        ask_bias: Decimal,
        bid_bias: Decimal,
    ) -> Result<OfferLadder> {
        let mut ladder = OfferLadder::default();
        for level in asks {
            let offer = self.ask(level, ask_bias)?;
            ladder.ask_numerators.push(offer.numerator);
            ladder.ask_denominators.push(offer.denominator);
        }
        for level in bids {
            let offer = self.bid(level, bid_bias)?;
            ladder.bid_numerators.push(offer.numerator);
            ladder.bid_denominators.push(offer.denominator);
        }
        Ok(ladder)
    }
}

fn checked_mul(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| CoreError::Overflow(format!("{a} * {b}")))
}

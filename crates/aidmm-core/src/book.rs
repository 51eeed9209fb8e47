//! Order book and maker identity types.

use crate::decimal::{Price, Size};
use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one maker managed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MakerId(pub u32);

impl fmt::Display for MakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "maker-{}", self.0)
    }
}

/// On-chain token metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMeta {
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
}

impl TokenMeta {
    pub fn new(address: Address, decimals: u8, symbol: impl Into<String>) -> Self {
        Self {
            address,
            decimals,
            symbol: symbol.into(),
        }
    }
}

/// Traded pair. Fixed for the lifetime of a maker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPair {
    pub asset: TokenMeta,
    pub quote: TokenMeta,
}

impl AssetPair {
    pub fn new(asset: TokenMeta, quote: TokenMeta) -> Self {
        Self { asset, quote }
    }

    /// Token addresses in venue order `[asset, quote]`.
    #[must_use]
    pub fn addresses(&self) -> [Address; 2] {
        [self.asset.address, self.quote.address]
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset.symbol, self.quote.symbol)
    }
}

/// One price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookLevel {
    pub price: Price,
    pub size: Size,
}

impl BookLevel {
    pub fn new(price: Price, size: Size) -> Self {
        Self { price, size }
    }

    /// Build a level from floating-point inputs (non-finite values become zero).
    pub fn from_f64(price: f64, size: f64) -> Self {
        Self {
            price: Price::from_f64_lossy(price),
            size: Size::from_f64_lossy(size),
        }
    }

    /// Quote value of the level.
    #[inline]
    pub fn notional(&self) -> Decimal {
        self.size.notional(self.price)
    }
}

/// A book of asks and bids, best level first.
///
/// Either side may be absent while its producer has not published it yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Book {
    pub asks: Option<Vec<BookLevel>>,
    pub bids: Option<Vec<BookLevel>>,
}

impl Book {
    pub fn new(asks: Vec<BookLevel>, bids: Vec<BookLevel>) -> Self {
        Self {
            asks: Some(asks),
            bids: Some(bids),
        }
    }

    /// Both sides, or `None` if either one is missing.
    #[must_use]
    pub fn sides(&self) -> Option<(&[BookLevel], &[BookLevel])> {
        match (&self.asks, &self.bids) {
            (Some(asks), Some(bids)) => Some((asks.as_slice(), bids.as_slice())),
            _ => None,
        }
    }

    /// True when both sides are present and empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.sides(), Some((asks, bids)) if asks.is_empty() && bids.is_empty())
    }

    /// Best ask and best bid, if both sides are non-empty.
    #[must_use]
    pub fn top(&self) -> Option<(BookLevel, BookLevel)> {
        let (asks, bids) = self.sides()?;
        Some((*asks.first()?, *bids.first()?))
    }

    /// Sum of ask sizes in asset units.
    #[must_use]
    pub fn total_ask_size(&self) -> Size {
        self.asks.iter().flatten().map(|l| l.size).sum()
    }

    /// Sum of bid notionals in quote units.
    #[must_use]
    pub fn total_bid_notional(&self) -> Decimal {
        self.bids.iter().flatten().map(BookLevel::notional).sum()
    }
}

/// What the venue position tracker reports for one maker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveBook {
    pub book: Option<Book>,
    /// Strategist trade ids of the resting offers.
    pub order_ids: Vec<U256>,
}

impl LiveBook {
    pub fn new(book: Book, order_ids: Vec<U256>) -> Self {
        Self {
            book: Some(book),
            order_ids,
        }
    }
}

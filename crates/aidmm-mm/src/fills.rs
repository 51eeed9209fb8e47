//! Per-block fill aggregation.
//!
//! Fills against a maker's offers are netted per side until the block they
//! landed in is sealed, then released as at most two offload orders. Many
//! fills in one block cost one rebalance per side instead of one per fill.

use aidmm_core::{AssetPair, MakerId};
use alloy::primitives::{Address, U256};
use tracing::{debug, warn};

/// A fill where the maker was the counter-party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MakerFill {
    pub maker: MakerId,
    pub block_number: u64,
    /// Token the maker's offer paid out.
    pub pay_token: Address,
    /// Amount the maker received in exchange, in base units.
    pub give_amount: U256,
}

/// Accumulated fills since the last flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateFillState {
    /// Asset acquired through filled bids.
    pub asset_amount: U256,
    /// Quote acquired through filled asks.
    pub quote_amount: U256,
    pub updated: bool,
}

/// Rebalance to issue for one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffloadOrder {
    pub sell: Address,
    pub amount: U256,
    pub target: Address,
}

/// Nets fills per block for one maker.
#[derive(Debug)]
pub struct FillAggregator {
    maker: MakerId,
    asset: Address,
    quote: Address,
    state: AggregateFillState,
    /// Highest block holding an unflushed fill.
    pending_block: Option<u64>,
}

impl FillAggregator {
    pub fn new(maker: MakerId, pair: &AssetPair) -> Self {
        Self {
            maker,
            asset: pair.asset.address,
            quote: pair.quote.address,
            state: AggregateFillState::default(),
            pending_block: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> &AggregateFillState {
        &self.state
    }

    /// Add a fill to the running totals.
    ///
    /// A fill from a later block than the pending one means the earlier block
    /// is sealed, so the pending totals are returned for offload first.
    pub fn record_fill(&mut self, fill: &MakerFill) -> Vec<OffloadOrder> {
        let released = match self.pending_block {
            Some(pending) if fill.block_number > pending => self.on_block_sealed(pending),
            _ => Vec::new(),
        };

        if fill.pay_token == self.quote {
            self.state.asset_amount = self.state.asset_amount.saturating_add(fill.give_amount);
        } else if fill.pay_token == self.asset {
            self.state.quote_amount = self.state.quote_amount.saturating_add(fill.give_amount);
        } else {
            warn!(maker = %self.maker, token = %fill.pay_token, "Fill in unknown token ignored");
            return released;
        }
        self.state.updated = true;
        self.pending_block = Some(self.pending_block.map_or(fill.block_number, |b| {
            b.max(fill.block_number)
        }));
        debug!(
            maker = %self.maker,
            block = fill.block_number,
            asset = %self.state.asset_amount,
            quote = %self.state.quote_amount,
            "Fill aggregated"
        );
        released
    }

    /// Release the totals once `block` is sealed, then reset.
    pub fn on_block_sealed(&mut self, block: u64) -> Vec<OffloadOrder> {
        if !self.state.updated || self.pending_block.is_some_and(|pending| pending > block) {
            return Vec::new();
        }

        let mut orders = Vec::with_capacity(2);
        if !self.state.asset_amount.is_zero() {
            orders.push(OffloadOrder {
                sell: self.asset,
                amount: self.state.asset_amount,
                target: self.quote,
            });
        }
        if !self.state.quote_amount.is_zero() {
            orders.push(OffloadOrder {
                sell: self.quote,
                amount: self.state.quote_amount,
                target: self.asset,
            });
        }
        self.state = AggregateFillState::default();
        self.pending_block = None;
        orders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aidmm_core::TokenMeta;

    fn pair() -> AssetPair {
        AssetPair::new(
            TokenMeta::new(Address::repeat_byte(0xaa), 18, "WETH"),
            TokenMeta::new(Address::repeat_byte(0xbb), 6, "USDC"),
        )
    }

    fn fill(block: u64, pay_token: Address, amount: u64) -> MakerFill {
        MakerFill {
            maker: MakerId(1),
            block_number: block,
            pay_token,
            give_amount: U256::from(amount),
        }
    }

    #[test]
    fn test_attribution_by_paid_token() {
        let p = pair();
        let mut agg = FillAggregator::new(MakerId(1), &p);

        // Bid filled: maker paid quote, received asset.
        agg.record_fill(&fill(10, p.quote.address, 5));
        // Ask filled: maker paid asset, received quote.
        agg.record_fill(&fill(10, p.asset.address, 700));

        let state = agg.state();
        assert_eq!(state.asset_amount, U256::from(5u8));
        assert_eq!(state.quote_amount, U256::from(700u16));
        assert!(state.updated);
    }

    #[test]
    fn test_one_offload_per_side_per_block() {
        let p = pair();
        let mut agg = FillAggregator::new(MakerId(1), &p);
        for _ in 0..5 {
            agg.record_fill(&fill(10, p.quote.address, 2));
        }

        let orders = agg.on_block_sealed(10);
        assert_eq!(
            orders,
            vec![OffloadOrder {
                sell: p.asset.address,
                amount: U256::from(10u8),
                target: p.quote.address,
            }]
        );
        assert_eq!(*agg.state(), AggregateFillState::default());
        assert!(agg.on_block_sealed(10).is_empty());
    }

    #[test]
    fn test_both_sides_released() {
        let p = pair();
        let mut agg = FillAggregator::new(MakerId(1), &p);
        agg.record_fill(&fill(3, p.quote.address, 1));
        agg.record_fill(&fill(3, p.asset.address, 2));

        let orders = agg.on_block_sealed(3);
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].sell, p.quote.address);
        assert_eq!(orders[1].target, p.asset.address);
    }

    #[test]
    fn test_unsealed_block_is_held() {
        let p = pair();
        let mut agg = FillAggregator::new(MakerId(1), &p);
        agg.record_fill(&fill(12, p.quote.address, 1));

        assert!(agg.on_block_sealed(11).is_empty());
        assert!(agg.state().updated);
    }

    #[test]
    fn test_later_block_fill_releases_previous() {
        let p = pair();
        let mut agg = FillAggregator::new(MakerId(1), &p);
        agg.record_fill(&fill(20, p.quote.address, 4));

        let released = agg.record_fill(&fill(21, p.asset.address, 9));
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].amount, U256::from(4u8));
        assert_eq!(agg.state().quote_amount, U256::from(9u8));
        assert_eq!(agg.state().asset_amount, U256::ZERO);
    }

    #[test]
    fn test_unknown_token_ignored() {
        let mut agg = FillAggregator::new(MakerId(1), &pair());
        agg.record_fill(&fill(1, Address::repeat_byte(0xcc), 100));

        assert!(!agg.state().updated);
        assert!(agg.on_block_sealed(1).is_empty());
    }
}

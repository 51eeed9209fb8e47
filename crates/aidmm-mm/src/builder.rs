//! Order-parameter assembly for the three book-changing actions.
//!
//! Place-initial posts the target unbiased. Requote applies the inventory
//! bias when the maker is inventory-managed. Wipe needs nothing but the
//! live order ids and is skipped when there are none.

use aidmm_core::{
    ActionEncoder, ActionKind, AssetPair, Book, FixedPointSizer, LiveBook, MakerId, PendingAction,
    Result,
};
use alloy::primitives::{Address, Bytes, U256};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::inventory::{InventoryBias, InventoryBiasCalculator, RelativeBalances};
use crate::reconciler::Decision;

/// Builds encoded `PendingAction`s for one maker.
pub struct ActionBuilder {
    maker: MakerId,
    pair: AssetPair,
    sizer: FixedPointSizer,
    encoder: Arc<dyn ActionEncoder>,
    bias: Option<InventoryBiasCalculator>,
}

impl ActionBuilder {
    /// `bias` is `Some` for inventory-managed makers.
    pub fn new(
        maker: MakerId,
        pair: AssetPair,
        encoder: Arc<dyn ActionEncoder>,
        bias: Option<InventoryBiasCalculator>,
    ) -> Self {
        Self {
            maker,
            sizer: FixedPointSizer::new(&pair),
            pair,
            encoder,
            bias,
        }
    }

    #[must_use]
    pub fn pair(&self) -> &AssetPair {
        &self.pair
    }

    /// Build the action for `decision`, or `None` if there is nothing to send.
    pub fn build(
        &self,
        decision: Decision,
        target: &Book,
        live: &LiveBook,
        balances: Option<RelativeBalances>,
    ) -> Result<Option<PendingAction>> {
        match decision {
            Decision::NoOp(_) => Ok(None),
            Decision::PlaceInitial => self.place_initial(target),
            Decision::Requote => self.requote(target, live, balances),
            Decision::Wipe => Ok(self.wipe(live)),
        }
    }

    /// Post the whole target book.
    pub fn place_initial(&self, target: &Book) -> Result<Option<PendingAction>> {
        let Some((asks, bids)) = target.sides() else {
            return Ok(None);
        };
        let ladder = self.sizer.ladder(asks, bids, Decimal::ONE, Decimal::ONE)?;
        let payload = self.encoder.place_initial(&self.pair, &ladder);
        Ok(Some(self.action(ActionKind::PlaceInitial, payload)))
    }

    /// Replace every live offer with the target book.
    pub fn requote(
        &self,
        target: &Book,
        live: &LiveBook,
        balances: Option<RelativeBalances>,
    ) -> Result<Option<PendingAction>> {
        let Some((asks, bids)) = target.sides() else {
            return Ok(None);
        };
        let bias = self.bias_for(balances);
        let ladder = self
            .sizer
            .ladder(asks, bids, bias.asset_side, bias.quote_side)?;
        debug!(
            maker = %self.maker,
            asset_bias = %bias.asset_side,
            quote_bias = %bias.quote_side,
            offers = live.order_ids.len(),
            "Requote sized"
        );
        let payload = self.encoder.requote(&live.order_ids, &self.pair, &ladder);
        Ok(Some(self.action(ActionKind::Requote, payload)))
    }

    /// Cancel every live offer.
    pub fn wipe(&self, live: &LiveBook) -> Option<PendingAction> {
        if live.order_ids.is_empty() {
            debug!(maker = %self.maker, "Nothing to wipe");
            return None;
        }
        let payload = self.encoder.wipe(&live.order_ids);
        Some(self.action(ActionKind::Wipe, payload))
    }

    /// Offload `amount` of `sell` into `target` through the reference venue.
    pub fn dump_fill(&self, sell: Address, amount: U256, target: Address, pool_fee: u32) -> Bytes {
        self.encoder.rebalance(sell, amount, target, pool_fee)
    }

    fn bias_for(&self, balances: Option<RelativeBalances>) -> InventoryBias {
        self.bias
            .as_ref()
            .map_or(InventoryBias::NEUTRAL, |calc| calc.compute(balances))
    }

    fn action(&self, kind: ActionKind, payload: Bytes) -> PendingAction {
        PendingAction::new(self.maker, kind, payload)
    }
}

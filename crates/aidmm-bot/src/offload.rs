//! Fill offloading.
//!
//! Venue notifications are fanned in on one channel. Fills are netted per
//! maker per block by a `FillAggregator`; when a block seals, each non-zero
//! side is rebalanced through the reference venue with one direct call.
//! Offloads run one at a time on this task.

use std::collections::HashMap;
use std::sync::Arc;

use aidmm_core::{ActionEncoder, AssetPair, MakerId};
use aidmm_executor::SingleSubmissionExecutor;
use aidmm_mm::{ActionBuilder, FillAggregator, MakerFill, OffloadOrder};
use alloy::primitives::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Notification from the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenueEvent {
    /// One of the maker's offers was taken.
    Fill(MakerFill),
    /// Block `number` is final for `maker`'s feed.
    BlockSealed { maker: MakerId, number: u64 },
}

struct OffloadSlot {
    aggregator: FillAggregator,
    builder: ActionBuilder,
    pool_fee: u32,
}

/// Routes venue events to per-maker aggregators and submits the offloads.
pub struct FillOffloader {
    slots: HashMap<MakerId, OffloadSlot>,
    executor: Arc<SingleSubmissionExecutor>,
}

impl FillOffloader {
    pub fn new(executor: Arc<SingleSubmissionExecutor>) -> Self {
        Self {
            slots: HashMap::new(),
            executor,
        }
    }

    /// Start offloading fills for `maker`.
    pub fn register(
        &mut self,
        maker: MakerId,
        pair: AssetPair,
        encoder: Arc<dyn ActionEncoder>,
        pool_fee: u32,
    ) {
        let slot = OffloadSlot {
            aggregator: FillAggregator::new(maker, &pair),
            builder: ActionBuilder::new(maker, pair, encoder, None),
            pool_fee,
        };
        self.slots.insert(maker, slot);
    }

    #[must_use]
    pub fn is_registered(&self, maker: MakerId) -> bool {
        self.slots.contains_key(&maker)
    }

    /// Feed one event through its maker's aggregator.
    ///
    /// Returns the encoded rebalance calls that became due.
    pub fn handle(&mut self, event: VenueEvent) -> Vec<Bytes> {
        let maker = match event {
            VenueEvent::Fill(fill) => fill.maker,
            VenueEvent::BlockSealed { maker, .. } => maker,
        };
        let Some(slot) = self.slots.get_mut(&maker) else {
            debug!(maker = %maker, "Offloading disabled, event ignored");
            return Vec::new();
        };

        let orders = match event {
            VenueEvent::Fill(fill) => slot.aggregator.record_fill(&fill),
            VenueEvent::BlockSealed { number, .. } => slot.aggregator.on_block_sealed(number),
        };
        orders
            .iter()
            .map(|order| Self::encode(maker, slot, order))
            .collect()
    }

    fn encode(maker: MakerId, slot: &OffloadSlot, order: &OffloadOrder) -> Bytes {
        info!(
            maker = %maker,
            sell = %order.sell,
            amount = %order.amount,
            target = %order.target,
            "Offloading fills"
        );
        slot.builder
            .dump_fill(order.sell, order.amount, order.target, slot.pool_fee)
    }

    /// Consume `events` until `shutdown` fires or the feed closes.
    pub async fn run(mut self, mut events: mpsc::Receiver<VenueEvent>, shutdown: CancellationToken) {
        info!(makers = self.slots.len(), "Fill offloader started");
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            for payload in self.handle(event) {
                // Failures are logged and followed by a resync inside the executor.
                let _ = self.executor.offload(payload).await;
            }
        }
        info!("Fill offloader stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aidmm_core::TokenMeta;
    use aidmm_executor::{IMarketAid, MarketAidEncoder, MockTransport, RetryPolicy, SingleConfig};
    use alloy::primitives::{Address, U256};
    use alloy::sol_types::SolCall;
    use std::time::Duration;

    fn weth() -> Address {
        Address::repeat_byte(0x11)
    }

    fn usdc() -> Address {
        Address::repeat_byte(0x22)
    }

    fn offloader() -> (Arc<MockTransport>, FillOffloader) {
        let transport = Arc::new(MockTransport::new());
        let executor = SingleSubmissionExecutor::new(
            transport.clone(),
            SingleConfig {
                market_aid: Address::repeat_byte(0xaa),
                gas_buffer: 0,
                post_action_delay: Duration::ZERO,
                retry: RetryPolicy::fixed(),
            },
        );
        let mut offloader = FillOffloader::new(executor);
        let pair = AssetPair::new(
            TokenMeta::new(weth(), 18, "WETH"),
            TokenMeta::new(usdc(), 6, "USDC"),
        );
        offloader.register(MakerId(1), pair, Arc::new(MarketAidEncoder), 500);
        (transport, offloader)
    }

    fn fill(block: u64, pay_token: Address, amount: u64) -> VenueEvent {
        VenueEvent::Fill(MakerFill {
            maker: MakerId(1),
            block_number: block,
            pay_token,
            give_amount: U256::from(amount),
        })
    }

    #[test]
    fn test_fills_released_on_seal() {
        let (_, mut offloader) = offloader();
        assert!(offloader.handle(fill(10, usdc(), 3)).is_empty());
        assert!(offloader.handle(fill(10, usdc(), 4)).is_empty());

        let payloads = offloader.handle(VenueEvent::BlockSealed {
            maker: MakerId(1),
            number: 10,
        });
        assert_eq!(payloads.len(), 1);

        let call =
            IMarketAid::strategistRebalanceFundsCall::abi_decode(&payloads[0], true).unwrap();
        assert_eq!(call.assetToSell, weth());
        assert_eq!(call.amountToSell, U256::from(7));
        assert_eq!(call.assetToTarget, usdc());
    }

    #[test]
    fn test_unregistered_maker_ignored() {
        let (_, mut offloader) = offloader();
        let event = VenueEvent::Fill(MakerFill {
            maker: MakerId(9),
            block_number: 1,
            pay_token: usdc(),
            give_amount: U256::from(1),
        });
        assert!(!offloader.is_registered(MakerId(9)));
        assert!(offloader.handle(event).is_empty());
    }

    #[tokio::test]
    async fn test_run_submits_offloads() {
        let (transport, offloader) = offloader();
        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        tx.send(fill(5, weth(), 2_000)).await.unwrap();
        tx.send(fill(5, usdc(), 1)).await.unwrap();
        tx.send(VenueEvent::BlockSealed {
            maker: MakerId(1),
            number: 5,
        })
        .await
        .unwrap();
        drop(tx);

        offloader.run(rx, shutdown).await;
        assert_eq!(transport.submitted().len(), 2);
    }
}

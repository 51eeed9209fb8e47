//! Calldata for the on-chain market-aid contract.

use aidmm_core::{ActionEncoder, AssetPair, OfferLadder};
use alloy::primitives::aliases::U24;
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    /// Strategist entry points of the market-aid contract.
    #[derive(Debug, PartialEq, Eq)]
    interface IMarketAid {
        function placeMarketMakingTrades(
            address[2] tokenPair,
            uint256[] askNumerators,
            uint256[] askDenominators,
            uint256[] bidNumerators,
            uint256[] bidDenominators
        ) external returns (uint256[] trades);

        function batchRequoteOffers(
            uint256[] ids,
            address[2] tokenPair,
            uint256[] askNumerators,
            uint256[] askDenominators,
            uint256[] bidNumerators,
            uint256[] bidDenominators
        ) external;

        function scrubStrategistTrades(uint256[] ids) external;

        function batchBox(bytes[] data) external returns (bool[] results);

        function strategistRebalanceFunds(
            address assetToSell,
            uint256 amountToSell,
            address assetToTarget,
            uint24 poolFee
        ) external returns (uint256 amountOut);
    }
}

/// `ActionEncoder` for the market-aid contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketAidEncoder;

impl ActionEncoder for MarketAidEncoder {
    fn place_initial(&self, pair: &AssetPair, ladder: &OfferLadder) -> Bytes {
        IMarketAid::placeMarketMakingTradesCall {
            tokenPair: pair.addresses(),
            askNumerators: ladder.ask_numerators.clone(),
            askDenominators: ladder.ask_denominators.clone(),
            bidNumerators: ladder.bid_numerators.clone(),
            bidDenominators: ladder.bid_denominators.clone(),
        }
        .abi_encode()
        .into()
    }

    fn requote(&self, order_ids: &[U256], pair: &AssetPair, ladder: &OfferLadder) -> Bytes {
        IMarketAid::batchRequoteOffersCall {
            ids: order_ids.to_vec(),
            tokenPair: pair.addresses(),
            askNumerators: ladder.ask_numerators.clone(),
            askDenominators: ladder.ask_denominators.clone(),
            bidNumerators: ladder.bid_numerators.clone(),
            bidDenominators: ladder.bid_denominators.clone(),
        }
        .abi_encode()
        .into()
    }

    fn wipe(&self, order_ids: &[U256]) -> Bytes {
        IMarketAid::scrubStrategistTradesCall {
            ids: order_ids.to_vec(),
        }
        .abi_encode()
        .into()
    }

    fn batch(&self, payloads: &[Bytes]) -> Bytes {
        IMarketAid::batchBoxCall {
            data: payloads.to_vec(),
        }
        .abi_encode()
        .into()
    }

    fn rebalance(&self, sell: Address, amount: U256, target: Address, pool_fee: u32) -> Bytes {
        IMarketAid::strategistRebalanceFundsCall {
            assetToSell: sell,
            amountToSell: amount,
            assetToTarget: target,
            poolFee: U24::saturating_from(pool_fee),
        }
        .abi_encode()
        .into()
    }
}

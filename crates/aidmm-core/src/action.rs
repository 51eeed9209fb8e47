//! Action kinds, pending actions and the venue-binding seam.

use crate::book::{AssetPair, MakerId};
use crate::fixed::OfferLadder;
use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three book-changing operations a maker can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PlaceInitial,
    Requote,
    Wipe,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [Self::PlaceInitial, Self::Requote, Self::Wipe];

    /// Dense index for per-kind storage.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::PlaceInitial => 0,
            Self::Requote => 1,
            Self::Wipe => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlaceInitial => "place_initial",
            Self::Requote => "requote",
            Self::Wipe => "wipe",
        }
    }

    /// Whether a failure of this kind leaves the signer's sequence number suspect.
    #[must_use]
    pub const fn resyncs_on_failure(self) -> bool {
        matches!(self, Self::Requote | Self::Wipe)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encoded action waiting for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub maker: MakerId,
    pub kind: ActionKind,
    pub payload: Bytes,
}

impl PendingAction {
    pub fn new(maker: MakerId, kind: ActionKind, payload: Bytes) -> Self {
        Self {
            maker,
            kind,
            payload,
        }
    }
}

/// Encodes engine operations into venue calldata.
pub trait ActionEncoder: Send + Sync {
    /// Post a fresh book.
    fn place_initial(&self, pair: &AssetPair, ladder: &OfferLadder) -> Bytes;

    /// Replace the resting offers `order_ids` with `ladder` in one call.
    fn requote(&self, order_ids: &[U256], pair: &AssetPair, ladder: &OfferLadder) -> Bytes;

    /// Cancel the resting offers `order_ids`.
    fn wipe(&self, order_ids: &[U256]) -> Bytes;

    /// Combine several payloads into one call.
    fn batch(&self, payloads: &[Bytes]) -> Bytes;

    /// Swap `amount` of `sell` into `target` on the reference venue.
    fn rebalance(&self, sell: Address, amount: U256, target: Address, pool_fee: u32) -> Bytes;
}

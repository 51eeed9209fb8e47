//! Core domain types for the aid market-making engine.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `Book`, `LiveBook`, `AssetPair`: What makers quote and what rests on-chain
//! - `FixedPointSizer`: Decimal levels to numerator/denominator offers
//! - `ActionKind`, `PendingAction`, `ActionEncoder`: Encoded venue actions

pub mod action;
pub mod book;
pub mod decimal;
pub mod error;
pub mod fixed;

pub use action::{ActionEncoder, ActionKind, PendingAction};
pub use book::{AssetPair, Book, BookLevel, LiveBook, MakerId, TokenMeta};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use fixed::{from_fixed, to_fixed, FixedPointSizer, OfferAmounts, OfferLadder};

//! Composition root for the aid market-making engine.
//!
//! Orchestrates the per-maker loops around shared submission paths:
//! - TOML configuration with validation
//! - One reconcile loop per maker over strategy, position and liquidity feeds
//! - Direct or batched submission of the resulting actions
//! - Per-block fill offloading through the reference venue

pub mod app;
pub mod config;
pub mod error;
pub mod maker;
pub mod offload;

pub use app::{Application, Collaborators};
pub use config::{AppConfig, EngineConfig, EngineMode, MakerSettings, TokenConfig};
pub use error::{AppError, AppResult};
pub use maker::{Dispatch, MakerChannels, MakerRuntime};
pub use offload::{FillOffloader, VenueEvent};

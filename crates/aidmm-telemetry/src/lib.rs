//! Prometheus metrics and structured logging for the aid market-making engine.
//!
//! - Prometheus metrics for decisions, submissions, batch flushes and liquidity
//! - Structured logging with tracing (JSON in production, pretty otherwise)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;

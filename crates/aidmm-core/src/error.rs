//! Error types for aidmm-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Negative amount cannot be represented on-chain: {0}")]
    NegativeAmount(String),

    #[error("Unsupported token decimals: {0}")]
    UnsupportedDecimals(u8),

    #[error("Fixed-point overflow: {0}")]
    Overflow(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

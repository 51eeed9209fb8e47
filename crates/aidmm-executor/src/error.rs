//! Executor error types.

use aidmm_core::CoreError;
use thiserror::Error;

/// Failure reported by a transport or liquidity source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Rejected by node: {0}")]
    Rejected(String),
}

/// Submission-path failures. None of these are fatal to the engine.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Cost estimation failed: {0}")]
    CostEstimation(TransportError),

    #[error("Cost estimation returned zero")]
    ZeroEstimate,

    #[error("Submission failed: {0}")]
    Submission(TransportError),

    #[error("Settlement failed: {0}")]
    Settlement(String),

    #[error("Sequence resync failed: {0}")]
    Resync(TransportError),

    #[error("Encoding failed: {0}")]
    Encoding(#[from] CoreError),
}

impl ExecutionError {
    /// Short label for metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::CostEstimation(_) | Self::ZeroEstimate => "estimation_failed",
            Self::Submission(_) => "submission_failed",
            Self::Settlement(_) => "reverted",
            Self::Resync(_) => "resync_failed",
            Self::Encoding(_) => "encoding_failed",
        }
    }

    /// Whether the signer's sequence number may be out of sync after this error.
    #[must_use]
    pub fn after_submission(&self) -> bool {
        matches!(self, Self::Submission(_) | Self::Settlement(_))
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

//! Submission side of the aid market-making engine.
//!
//! Turns encoded `PendingAction`s into transactions and keeps outbound
//! traffic serialized per (maker, kind) and per batch cycle, since every
//! path shares one signer sequence number.
//!
//! # Key Components
//!
//! - [`ActionGuard`]: Per-maker in-flight slot per action kind
//! - [`SingleSubmissionExecutor`]: Direct path, one action per transaction
//! - [`BatchExecutor`]: Coalesces actions across makers into one `batch` call per tick
//! - [`Backoff`]: Exponential retry pacing with a cap
//! - [`MarketAidEncoder`]: Calldata for the market-aid contract
//! - [`Transport`], [`LiquiditySource`]: Venue seams, with mocks for tests
//!
//! # Failure handling
//!
//! Nothing here is fatal. Every failure releases its guard, backs off, and
//! resyncs the sequence number when a transaction may have consumed it.

pub mod backoff;
pub mod batch;
pub mod error;
pub mod guard;
pub mod market_aid;
pub mod single;
pub mod transport;

pub use backoff::{Backoff, RetryPolicy};
pub use batch::{BatchBuffer, BatchConfig, BatchExecutor, BatchFailurePolicy, FlushOutcome};
pub use error::{ExecutionError, ExecutionResult, TransportError};
pub use guard::{ActionGuard, GuardPermit, GuardState};
pub use market_aid::{IMarketAid, MarketAidEncoder};
pub use single::{SingleConfig, SingleSubmissionExecutor};
pub use transport::{
    BoxFuture, Call, DynLiquiditySource, DynTransport, LiquiditySource, MockLiquiditySource,
    MockTransport, Settlement, Transport, TxHandle,
};

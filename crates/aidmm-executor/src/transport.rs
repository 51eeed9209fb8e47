//! Venue-facing trait seams.
//!
//! `Transport` wraps the signer and RPC node, `LiquiditySource` the escrow
//! query. Both are object-safe so the engine can hold them as `Arc<dyn _>`
//! and tests can swap in the mocks below.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aidmm_core::MakerId;
use aidmm_mm::RawLiquidity;
use alloy::primitives::{Address, Bytes, B256};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::TransportError;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// A contract call to sign and send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub to: Address,
    pub data: Bytes,
    /// Explicit gas limit, `None` lets the signer decide.
    pub gas_limit: Option<u64>,
}

impl Call {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            gas_limit: None,
        }
    }

    #[must_use]
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// Handle of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxHandle(pub B256);

/// Mined outcome of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub tx_hash: B256,
    pub success: bool,
}

/// Signer plus RPC transport.
pub trait Transport: Send + Sync {
    /// Estimate gas for `call`. Zero means the node could not price it.
    fn estimate_cost<'a>(&'a self, call: &'a Call) -> BoxFuture<'a, Result<u64, TransportError>>;

    /// Sign and broadcast `call`.
    fn submit(&self, call: Call) -> BoxFuture<'_, Result<TxHandle, TransportError>>;

    /// Wait until `handle` is mined.
    fn await_settlement(&self, handle: TxHandle) -> BoxFuture<'_, Result<Settlement, TransportError>>;

    /// Re-read the signer's sequence number from the node.
    fn resync_sequence(&self) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Escrowed liquidity query.
pub trait LiquiditySource: Send + Sync {
    fn query_available_liquidity(
        &self,
        maker: MakerId,
    ) -> BoxFuture<'_, Result<RawLiquidity, TransportError>>;
}

/// Arc wrapper for Transport trait objects.
pub type DynTransport = Arc<dyn Transport>;

/// Arc wrapper for LiquiditySource trait objects.
pub type DynLiquiditySource = Arc<dyn LiquiditySource>;

// ============================================================================
// Mocks
// ============================================================================

/// Queue of scripted results with a sticky fallback.
#[derive(Debug)]
struct Script<T: Clone> {
    queue: VecDeque<T>,
    fallback: T,
}

impl<T: Clone> Script<T> {
    fn new(fallback: T) -> Self {
        Self {
            queue: VecDeque::new(),
            fallback,
        }
    }

    fn next(&mut self) -> T {
        self.queue
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Mock transport for testing.
///
/// Every call succeeds by default. Results can be queued per call or set
/// as the sticky default, and settlement can be held open to keep an
/// action in flight.
#[derive(Debug)]
pub struct MockTransport {
    estimates: Mutex<Script<Result<u64, TransportError>>>,
    submits: Mutex<Script<Result<(), TransportError>>>,
    settlements: Mutex<Script<Result<bool, TransportError>>>,
    estimated: Mutex<Vec<Call>>,
    submitted: Mutex<Vec<Call>>,
    resyncs: AtomicUsize,
    settle_gate: watch::Sender<bool>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock where every call succeeds.
    pub fn new() -> Self {
        Self {
            estimates: Mutex::new(Script::new(Ok(100_000))),
            submits: Mutex::new(Script::new(Ok(()))),
            settlements: Mutex::new(Script::new(Ok(true))),
            estimated: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            resyncs: AtomicUsize::new(0),
            settle_gate: watch::channel(true).0,
        }
    }

    /// Set the default estimation result.
    pub fn set_estimate(&self, result: Result<u64, TransportError>) {
        self.estimates.lock().fallback = result;
    }

    /// Queue the result of the next estimation.
    pub fn push_estimate(&self, result: Result<u64, TransportError>) {
        self.estimates.lock().queue.push_back(result);
    }

    /// Set the default submission result.
    pub fn set_submit(&self, result: Result<(), TransportError>) {
        self.submits.lock().fallback = result;
    }

    /// Queue the result of the next submission.
    pub fn push_submit(&self, result: Result<(), TransportError>) {
        self.submits.lock().queue.push_back(result);
    }

    /// Set the default settlement result (`Ok(false)` is a revert).
    pub fn set_settlement(&self, result: Result<bool, TransportError>) {
        self.settlements.lock().fallback = result;
    }

    /// Queue the result of the next settlement.
    pub fn push_settlement(&self, result: Result<bool, TransportError>) {
        self.settlements.lock().queue.push_back(result);
    }

    /// Keep every settlement pending until `release_settlements`.
    pub fn hold_settlements(&self) {
        self.settle_gate.send_replace(false);
    }

    /// Let pending and future settlements complete.
    pub fn release_settlements(&self) {
        self.settle_gate.send_replace(true);
    }

    /// Calls passed to `estimate_cost`.
    pub fn estimated(&self) -> Vec<Call> {
        self.estimated.lock().clone()
    }

    /// Calls passed to `submit`.
    pub fn submitted(&self) -> Vec<Call> {
        self.submitted.lock().clone()
    }

    pub fn resync_count(&self) -> usize {
        self.resyncs.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn estimate_cost<'a>(&'a self, call: &'a Call) -> BoxFuture<'a, Result<u64, TransportError>> {
        Box::pin(async move {
            self.estimated.lock().push(call.clone());
            self.estimates.lock().next()
        })
    }

    fn submit(&self, call: Call) -> BoxFuture<'_, Result<TxHandle, TransportError>> {
        Box::pin(async move {
            let index = {
                let mut submitted = self.submitted.lock();
                submitted.push(call);
                submitted.len()
            };
            self.submits.lock().next()?;
            Ok(TxHandle(B256::left_padding_from(&index.to_be_bytes())))
        })
    }

    fn await_settlement(&self, handle: TxHandle) -> BoxFuture<'_, Result<Settlement, TransportError>> {
        Box::pin(async move {
            let mut gate = self.settle_gate.subscribe();
            // Sender lives in self, so the channel cannot close here.
            let _ = gate.wait_for(|open| *open).await;
            let success = self.settlements.lock().next()?;
            Ok(Settlement {
                tx_hash: handle.0,
                success,
            })
        })
    }

    fn resync_sequence(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.resyncs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Mock liquidity source for testing.
#[derive(Debug, Default)]
pub struct MockLiquiditySource {
    readings: Mutex<HashMap<MakerId, Result<RawLiquidity, TransportError>>>,
    queries: AtomicUsize,
}

impl MockLiquiditySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set what `maker`'s queries return from now on.
    pub fn set_reading(&self, maker: MakerId, reading: Result<RawLiquidity, TransportError>) {
        self.readings.lock().insert(maker, reading);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl LiquiditySource for MockLiquiditySource {
    fn query_available_liquidity(
        &self,
        maker: MakerId,
    ) -> BoxFuture<'_, Result<RawLiquidity, TransportError>> {
        Box::pin(async move {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.readings
                .lock()
                .get(&maker)
                .cloned()
                .unwrap_or_else(|| Err(TransportError::Rpc(format!("no reading for {maker}"))))
        })
    }
}

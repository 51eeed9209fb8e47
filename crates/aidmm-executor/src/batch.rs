//! Batched submission: many makers, one transaction per flush.
//!
//! Makers push `PendingAction`s onto a channel. The supervisor keeps only
//! the latest payload per (maker, kind) and on every tick flushes the whole
//! buffer as a single `batch` call:
//!
//! - One flush in flight at a time; a tick that finds one running is skipped
//! - The buffer is taken before submission, so actions arriving mid-flush
//!   start the next generation
//! - A zero estimate puts the taken actions back untouched
//! - Other failures either replay the taken actions into slots that were not
//!   overwritten since, or drop them, per `BatchFailurePolicy`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aidmm_core::{ActionEncoder, ActionKind, MakerId, PendingAction};
use aidmm_telemetry::Metrics;
use alloy::primitives::{Address, Bytes, B256};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, RetryPolicy};
use crate::error::ExecutionError;
use crate::transport::{Call, DynTransport};

const PATH_BATCH: &str = "batch";

// ============================================================================
// BatchBuffer
// ============================================================================

/// Latest payload per (maker, kind), in maker order then kind insertion order.
#[derive(Debug, Clone)]
pub struct BatchBuffer {
    slots: Vec<(MakerId, Vec<(ActionKind, Bytes)>)>,
}

impl BatchBuffer {
    /// One slot per known maker, in iteration order.
    pub fn new(makers: &[MakerId]) -> Self {
        Self {
            slots: makers.iter().map(|m| (*m, Vec::new())).collect(),
        }
    }

    /// Store `action`, replacing any payload of the same kind for its maker.
    ///
    /// Returns `false` for a maker the buffer does not know.
    pub fn insert(&mut self, action: PendingAction) -> bool {
        let Some((_, kinds)) = self.slots.iter_mut().find(|(m, _)| *m == action.maker) else {
            return false;
        };
        match kinds.iter_mut().find(|(k, _)| *k == action.kind) {
            Some((_, payload)) => *payload = action.payload,
            None => kinds.push((action.kind, action.payload)),
        }
        true
    }

    #[must_use]
    pub fn payload(&self, maker: MakerId, kind: ActionKind) -> Option<&Bytes> {
        self.slots
            .iter()
            .find(|(m, _)| *m == maker)
            .and_then(|(_, kinds)| kinds.iter().find(|(k, _)| *k == kind))
            .map(|(_, p)| p)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().map(|(_, kinds)| kinds.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All payloads in flush order.
    #[must_use]
    pub fn flatten(&self) -> Vec<Bytes> {
        self.slots
            .iter()
            .flat_map(|(_, kinds)| kinds.iter().map(|(_, p)| p.clone()))
            .collect()
    }

    /// Move every payload out, leaving empty slots for the same makers.
    pub fn take(&mut self) -> BatchBuffer {
        let empty = self.slots.iter().map(|(m, _)| (*m, Vec::new())).collect();
        BatchBuffer {
            slots: std::mem::replace(&mut self.slots, empty),
        }
    }

    /// Put `taken` back into slots that have not been refilled since.
    pub fn restore(&mut self, taken: BatchBuffer) {
        for (maker, kinds) in taken.slots {
            for (kind, payload) in kinds {
                if self.payload(maker, kind).is_none() {
                    self.insert(PendingAction::new(maker, kind, payload));
                }
            }
        }
    }
}

// ============================================================================
// BatchExecutor
// ============================================================================

/// What to do with dispatched actions when their batch fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailurePolicy {
    /// Put them back unless a newer action took their slot.
    #[default]
    Replay,
    /// Discard them.
    Drop,
}

/// Settings for the batch supervisor.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub market_aid: Address,
    pub gas_buffer: u64,
    pub interval: Duration,
    pub failure_policy: BatchFailurePolicy,
    pub retry: RetryPolicy,
}

/// Result of one flush tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Previous flush still running.
    SkippedInFlight,
    /// Nothing buffered.
    SkippedEmpty,
    /// Inside the backoff window.
    SkippedBackoff,
    /// Estimate was zero; actions kept.
    EstimateDeclined { actions: usize },
    Settled { actions: usize, tx_hash: B256 },
    Failed { actions: usize, replayed: bool },
}

impl FlushOutcome {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::SkippedInFlight => "skipped_in_flight",
            Self::SkippedEmpty => "skipped_empty",
            Self::SkippedBackoff => "skipped_backoff",
            Self::EstimateDeclined { .. } => "estimate_declined",
            Self::Settled { .. } => "settled",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Clears the in-flight flag when the flush ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Coalesces pending actions across makers and flushes them on a timer.
pub struct BatchExecutor {
    transport: DynTransport,
    encoder: Arc<dyn ActionEncoder>,
    config: BatchConfig,
    buffer: Mutex<BatchBuffer>,
    flush_in_flight: AtomicBool,
    backoff: Mutex<Backoff>,
}

impl BatchExecutor {
    pub fn new(
        transport: DynTransport,
        encoder: Arc<dyn ActionEncoder>,
        makers: &[MakerId],
        config: BatchConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            encoder,
            buffer: Mutex::new(BatchBuffer::new(makers)),
            flush_in_flight: AtomicBool::new(false),
            backoff: Mutex::new(Backoff::new(config.retry.clone())),
            config,
        })
    }

    /// Buffer `action`, replacing the previous one for its slot.
    pub fn add_action(&self, action: PendingAction) {
        let (maker, kind) = (action.maker, action.kind);
        let mut buffer = self.buffer.lock();
        if buffer.insert(action) {
            Metrics::batch_pending(buffer.len());
            debug!(maker = %maker, kind = %kind, pending = buffer.len(), "Action buffered");
        } else {
            warn!(maker = %maker, kind = %kind, "Action for unknown maker dropped");
        }
    }

    /// Copy of the current buffer.
    #[must_use]
    pub fn snapshot(&self) -> BatchBuffer {
        self.buffer.lock().clone()
    }

    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.flush_in_flight.load(Ordering::Acquire)
    }

    /// Run one flush attempt.
    pub async fn flush(&self) -> FlushOutcome {
        if self
            .flush_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            Metrics::batch_flush(FlushOutcome::SkippedInFlight.label());
            return FlushOutcome::SkippedInFlight;
        }
        let _in_flight = InFlight(&self.flush_in_flight);

        let outcome = self.flush_inner().await;
        Metrics::batch_flush(outcome.label());
        Metrics::batch_pending(self.buffer.lock().len());
        outcome
    }

    async fn flush_inner(&self) -> FlushOutcome {
        if !self.backoff.lock().ready(Instant::now()) {
            return FlushOutcome::SkippedBackoff;
        }
        // Taken before estimating. The restore on a zero estimate below keeps this
        // equivalent to clearing only once estimation succeeds; do not drop it.
        let taken = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return FlushOutcome::SkippedEmpty;
            }
            buffer.take()
        };
        let actions = taken.len();
        let call = Call::new(self.config.market_aid, self.encoder.batch(&taken.flatten()));

        let estimate = match self.transport.estimate_cost(&call).await {
            Ok(0) => {
                self.buffer.lock().restore(taken);
                self.backoff.lock().record_failure(Instant::now());
                warn!(actions, "Batch estimate was zero, keeping actions");
                return FlushOutcome::EstimateDeclined { actions };
            }
            Ok(estimate) => estimate,
            Err(e) => return self.fail(taken, ExecutionError::CostEstimation(e)).await,
        };

        let call = call.with_gas_limit(estimate.saturating_add(self.config.gas_buffer));
        let handle = match self.transport.submit(call).await {
            Ok(handle) => handle,
            Err(e) => return self.fail(taken, ExecutionError::Submission(e)).await,
        };
        match self.transport.await_settlement(handle).await {
            Ok(settlement) if settlement.success => {
                self.backoff.lock().record_success();
                info!(actions, tx = %settlement.tx_hash, "Batch settled");
                Metrics::submission(PATH_BATCH, PATH_BATCH, "settled");
                FlushOutcome::Settled {
                    actions,
                    tx_hash: settlement.tx_hash,
                }
            }
            Ok(settlement) => {
                let e = ExecutionError::Settlement(format!(
                    "transaction {} reverted",
                    settlement.tx_hash
                ));
                self.fail(taken, e).await
            }
            Err(e) => {
                self.fail(taken, ExecutionError::Settlement(e.to_string()))
                    .await
            }
        }
    }

    async fn fail(&self, taken: BatchBuffer, error: ExecutionError) -> FlushOutcome {
        let actions = taken.len();
        let replayed = self.config.failure_policy == BatchFailurePolicy::Replay;
        if replayed {
            self.buffer.lock().restore(taken);
        }
        let retry_in = self.backoff.lock().record_failure(Instant::now());
        warn!(
            actions,
            replayed,
            error = %error,
            retry_in_ms = retry_in.as_millis() as u64,
            "Batch failed"
        );
        Metrics::submission(PATH_BATCH, PATH_BATCH, error.label());

        if error.after_submission() {
            Metrics::resync(PATH_BATCH);
            if let Err(e) = self.transport.resync_sequence().await {
                warn!(error = %ExecutionError::Resync(e), "Sequence resync failed");
            }
        }
        FlushOutcome::Failed { actions, replayed }
    }

    /// Drain `actions` into the buffer and flush every `interval`, starting
    /// one interval from now, until `shutdown` fires. Each flush runs in its own task so a slow settlement
    /// never blocks intake.
    pub async fn run(
        self: Arc<Self>,
        mut actions: mpsc::Receiver<PendingAction>,
        shutdown: CancellationToken,
    ) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "Batch supervisor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(action) = actions.recv() => self.add_action(action),
                _ = ticker.tick() => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        let outcome = this.flush().await;
                        debug!(outcome = outcome.label(), "Flush tick");
                    });
                }
            }
        }
        info!("Batch supervisor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::market_aid::MarketAidEncoder;
    use crate::transport::MockTransport;

    fn makers() -> Vec<MakerId> {
        vec![MakerId(1), MakerId(2)]
    }

    fn payload(tag: u8) -> Bytes {
        Bytes::from(vec![tag])
    }

    fn action(maker: u32, kind: ActionKind, tag: u8) -> PendingAction {
        PendingAction::new(MakerId(maker), kind, payload(tag))
    }

    fn batch_config(policy: BatchFailurePolicy) -> BatchConfig {
        BatchConfig {
            market_aid: Address::repeat_byte(0xaa),
            gas_buffer: 0,
            interval: Duration::from_secs(2),
            failure_policy: policy,
            retry: RetryPolicy::fixed(),
        }
    }

    fn executor(policy: BatchFailurePolicy) -> (Arc<MockTransport>, Arc<BatchExecutor>) {
        let transport = Arc::new(MockTransport::new());
        let exec = BatchExecutor::new(
            transport.clone(),
            Arc::new(MarketAidEncoder),
            &makers(),
            batch_config(policy),
        );
        (transport, exec)
    }

    // Test 1: last write wins per slot
    #[test]
    fn test_buffer_overwrite() {
        let mut buffer = BatchBuffer::new(&makers());
        buffer.insert(action(1, ActionKind::Requote, 1));
        buffer.insert(action(1, ActionKind::Requote, 2));

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.payload(MakerId(1), ActionKind::Requote), Some(&payload(2)));
    }

    // Test 2: flush order is maker order, then kind insertion order
    #[test]
    fn test_buffer_flatten_order() {
        let mut buffer = BatchBuffer::new(&makers());
        buffer.insert(action(2, ActionKind::PlaceInitial, 20));
        buffer.insert(action(1, ActionKind::Wipe, 10));
        buffer.insert(action(1, ActionKind::Requote, 11));
        buffer.insert(action(1, ActionKind::Wipe, 12));

        assert_eq!(buffer.flatten(), vec![payload(12), payload(11), payload(20)]);
    }

    #[test]
    fn test_buffer_unknown_maker() {
        let mut buffer = BatchBuffer::new(&makers());
        assert!(!buffer.insert(action(9, ActionKind::Wipe, 1)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_buffer_take_and_restore() {
        let mut buffer = BatchBuffer::new(&makers());
        buffer.insert(action(1, ActionKind::Requote, 1));
        buffer.insert(action(2, ActionKind::Wipe, 2));

        let taken = buffer.take();
        assert!(buffer.is_empty());
        assert_eq!(taken.len(), 2);

        // A newer requote arrived while the batch was out.
        buffer.insert(action(1, ActionKind::Requote, 3));
        buffer.restore(taken);
        assert_eq!(buffer.payload(MakerId(1), ActionKind::Requote), Some(&payload(3)));
        assert_eq!(buffer.payload(MakerId(2), ActionKind::Wipe), Some(&payload(2)));
    }

    // Test 3: a settled flush submits one combined call and empties the buffer
    #[tokio::test]
    async fn test_flush_submits_combined_call() {
        let (transport, exec) = executor(BatchFailurePolicy::Replay);
        exec.add_action(action(1, ActionKind::Requote, 1));
        exec.add_action(action(1, ActionKind::Requote, 2));
        exec.add_action(action(2, ActionKind::Wipe, 3));

        let outcome = exec.flush().await;
        assert!(matches!(outcome, FlushOutcome::Settled { actions: 2, .. }));
        assert!(exec.snapshot().is_empty());
        assert!(!exec.is_flushing());

        let submitted = transport.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(
            submitted[0].data,
            MarketAidEncoder.batch(&[payload(2), payload(3)])
        );
    }

    #[tokio::test]
    async fn test_empty_buffer_skips() {
        let (transport, exec) = executor(BatchFailurePolicy::Replay);
        assert_eq!(exec.flush().await, FlushOutcome::SkippedEmpty);
        assert!(transport.estimated().is_empty());
    }

    // Test 4: zero estimate keeps the buffer
    #[tokio::test]
    async fn test_zero_estimate_keeps_actions() {
        let (transport, exec) = executor(BatchFailurePolicy::Drop);
        transport.push_estimate(Ok(0));
        exec.add_action(action(1, ActionKind::Wipe, 1));

        assert_eq!(exec.flush().await, FlushOutcome::EstimateDeclined { actions: 1 });
        assert_eq!(exec.snapshot().len(), 1);
        assert!(transport.submitted().is_empty());
    }

    // Test 5: failure policies
    #[tokio::test]
    async fn test_failure_drop_policy_loses_actions() {
        let (transport, exec) = executor(BatchFailurePolicy::Drop);
        transport.push_submit(Err(TransportError::Rejected("nonce too low".into())));
        exec.add_action(action(1, ActionKind::Requote, 1));

        let outcome = exec.flush().await;
        assert_eq!(
            outcome,
            FlushOutcome::Failed {
                actions: 1,
                replayed: false
            }
        );
        assert!(exec.snapshot().is_empty());
        assert_eq!(transport.resync_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_replay_policy_restores_actions() {
        let (transport, exec) = executor(BatchFailurePolicy::Replay);
        transport.push_settlement(Ok(false));
        exec.add_action(action(2, ActionKind::PlaceInitial, 7));

        let outcome = exec.flush().await;
        assert_eq!(
            outcome,
            FlushOutcome::Failed {
                actions: 1,
                replayed: true
            }
        );
        assert_eq!(
            exec.snapshot().payload(MakerId(2), ActionKind::PlaceInitial),
            Some(&payload(7))
        );

        // Next tick resubmits it.
        assert!(matches!(exec.flush().await, FlushOutcome::Settled { actions: 1, .. }));
        assert_eq!(transport.submitted().len(), 2);
    }

    #[tokio::test]
    async fn test_estimation_error_with_drop_policy_clears() {
        let (transport, exec) = executor(BatchFailurePolicy::Drop);
        transport.push_estimate(Err(TransportError::Rpc("execution reverted".into())));
        exec.add_action(action(1, ActionKind::Wipe, 1));

        assert!(matches!(exec.flush().await, FlushOutcome::Failed { .. }));
        assert!(exec.snapshot().is_empty());
        assert_eq!(transport.resync_count(), 0);
    }

    // Test 6: a tick during an in-flight flush is skipped; new actions start a fresh buffer
    #[tokio::test]
    async fn test_in_flight_flush_skips_tick() {
        let (transport, exec) = executor(BatchFailurePolicy::Replay);
        transport.hold_settlements();
        exec.add_action(action(1, ActionKind::Requote, 1));

        let first = {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move { exec.flush().await })
        };
        while transport.submitted().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(exec.is_flushing());

        exec.add_action(action(1, ActionKind::Requote, 2));
        assert_eq!(exec.flush().await, FlushOutcome::SkippedInFlight);

        transport.release_settlements();
        assert!(matches!(first.await.unwrap(), FlushOutcome::Settled { actions: 1, .. }));
        assert_eq!(exec.snapshot().payload(MakerId(1), ActionKind::Requote), Some(&payload(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_skips_ticks() {
        let transport = Arc::new(MockTransport::new());
        let mut config = batch_config(BatchFailurePolicy::Replay);
        config.retry = RetryPolicy {
            enabled: true,
            base_delay_ms: 4_000,
            max_delay_ms: 10_000,
        };
        let exec = BatchExecutor::new(
            transport.clone(),
            Arc::new(MarketAidEncoder),
            &makers(),
            config,
        );
        transport.push_submit(Err(TransportError::Rpc("down".into())));
        exec.add_action(action(1, ActionKind::Wipe, 1));

        assert!(matches!(exec.flush().await, FlushOutcome::Failed { .. }));
        assert_eq!(exec.flush().await, FlushOutcome::SkippedBackoff);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(matches!(exec.flush().await, FlushOutcome::Settled { .. }));
    }

    // Test 7: the supervisor drains the channel and flushes on its timer
    #[tokio::test(start_paused = true)]
    async fn test_run_loop_flushes_on_tick() {
        let (transport, exec) = executor(BatchFailurePolicy::Replay);
        let (tx, rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&exec).run(rx, shutdown.clone()));

        tx.send(action(1, ActionKind::PlaceInitial, 1)).await.unwrap();
        tx.send(action(2, ActionKind::PlaceInitial, 2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_100)).await;

        let submitted = transport.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(
            submitted[0].data,
            MarketAidEncoder.batch(&[payload(1), payload(2)])
        );

        shutdown.cancel();
        handle.await.unwrap();
    }
}

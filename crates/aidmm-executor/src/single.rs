//! Direct (non-batched) submission path.
//!
//! One action per transaction:
//!
//! ```text
//! backoff window open? → estimate → submit(gas = estimate + buffer) → await settlement
//!                                                                    ↓
//!                           success: hold permit for the throttle delay, then release
//!                           failure: release, back off, resync if the sequence may be stale
//! ```
//!
//! The caller acquires the `GuardPermit` before building the action; this
//! path only ever releases it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aidmm_core::{ActionKind, MakerId, PendingAction};
use aidmm_telemetry::Metrics;
use alloy::primitives::{Address, Bytes};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, RetryPolicy};
use crate::error::{ExecutionError, ExecutionResult};
use crate::guard::GuardPermit;
use crate::transport::{Call, DynTransport, Settlement};

const PATH_DIRECT: &str = "direct";
const PATH_OFFLOAD: &str = "offload";

/// Settings for direct submissions.
#[derive(Debug, Clone)]
pub struct SingleConfig {
    /// Contract every call is sent to.
    pub market_aid: Address,
    /// Gas added on top of the estimate.
    pub gas_buffer: u64,
    /// How long a settled action keeps its slot busy.
    pub post_action_delay: Duration,
    pub retry: RetryPolicy,
}

/// Submits one action at a time and owns the per-(maker, kind) backoff.
pub struct SingleSubmissionExecutor {
    transport: DynTransport,
    config: SingleConfig,
    backoff: Mutex<HashMap<(MakerId, ActionKind), Backoff>>,
}

impl SingleSubmissionExecutor {
    pub fn new(transport: DynTransport, config: SingleConfig) -> Arc<Self> {
        Arc::new(Self {
            transport,
            config,
            backoff: Mutex::new(HashMap::new()),
        })
    }

    /// Whether `(maker, kind)` is outside its backoff window.
    #[must_use]
    pub fn ready(&self, maker: MakerId, kind: ActionKind) -> bool {
        self.backoff
            .lock()
            .get(&(maker, kind))
            .map_or(true, |b| b.ready(Instant::now()))
    }

    /// Submit `action` and release `permit` when done.
    pub async fn execute(
        &self,
        permit: GuardPermit,
        action: PendingAction,
    ) -> ExecutionResult<Settlement> {
        debug_assert_eq!(permit.kind(), action.kind);
        let PendingAction {
            maker,
            kind,
            payload,
        } = action;

        match self.submit_and_settle(payload).await {
            Ok(settlement) => {
                self.backoff_entry(maker, kind, |b| b.record_success());
                info!(
                    maker = %maker,
                    kind = %kind,
                    tx = %settlement.tx_hash,
                    "Action settled"
                );
                Metrics::submission(PATH_DIRECT, kind.as_str(), "settled");
                tokio::time::sleep(self.config.post_action_delay).await;
                drop(permit);
                Ok(settlement)
            }
            Err(e) => {
                drop(permit);
                let retry_in =
                    self.backoff_entry(maker, kind, |b| b.record_failure(Instant::now()));
                warn!(
                    maker = %maker,
                    kind = %kind,
                    error = %e,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "Action failed"
                );
                Metrics::submission(PATH_DIRECT, kind.as_str(), e.label());
                if kind.resyncs_on_failure() || e.after_submission() {
                    self.resync(PATH_DIRECT).await;
                }
                Err(e)
            }
        }
    }

    /// Submit an offload (rebalance) call. No guard, no throttle.
    pub async fn offload(&self, payload: Bytes) -> ExecutionResult<Settlement> {
        match self.submit_and_settle(payload).await {
            Ok(settlement) => {
                info!(tx = %settlement.tx_hash, "Offload settled");
                Metrics::submission(PATH_OFFLOAD, "rebalance", "settled");
                Ok(settlement)
            }
            Err(e) => {
                warn!(error = %e, "Offload failed");
                Metrics::submission(PATH_OFFLOAD, "rebalance", e.label());
                self.resync(PATH_OFFLOAD).await;
                Err(e)
            }
        }
    }

    async fn submit_and_settle(&self, payload: Bytes) -> ExecutionResult<Settlement> {
        let call = Call::new(self.config.market_aid, payload);
        let estimate = self
            .transport
            .estimate_cost(&call)
            .await
            .map_err(ExecutionError::CostEstimation)?;
        if estimate == 0 {
            return Err(ExecutionError::ZeroEstimate);
        }

        let call = call.with_gas_limit(estimate.saturating_add(self.config.gas_buffer));
        debug!(gas_limit = ?call.gas_limit, "Submitting");
        let handle = self
            .transport
            .submit(call)
            .await
            .map_err(ExecutionError::Submission)?;
        let settlement = self
            .transport
            .await_settlement(handle)
            .await
            .map_err(|e| ExecutionError::Settlement(e.to_string()))?;

        if settlement.success {
            Ok(settlement)
        } else {
            Err(ExecutionError::Settlement(format!(
                "transaction {} reverted",
                settlement.tx_hash
            )))
        }
    }

    async fn resync(&self, path: &str) {
        Metrics::resync(path);
        if let Err(e) = self.transport.resync_sequence().await {
            warn!(path, error = %ExecutionError::Resync(e), "Sequence resync failed");
        }
    }

    fn backoff_entry<T>(
        &self,
        maker: MakerId,
        kind: ActionKind,
        f: impl FnOnce(&mut Backoff) -> T,
    ) -> T {
        let mut backoff = self.backoff.lock();
        let entry = backoff
            .entry((maker, kind))
            .or_insert_with(|| Backoff::new(self.config.retry.clone()));
        f(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::guard::{ActionGuard, GuardState};
    use crate::transport::MockTransport;

    fn config() -> SingleConfig {
        SingleConfig {
            market_aid: Address::repeat_byte(0xaa),
            gas_buffer: 100_000,
            post_action_delay: Duration::from_secs(2),
            retry: RetryPolicy::fixed(),
        }
    }

    fn action(kind: ActionKind) -> PendingAction {
        PendingAction::new(MakerId(1), kind, Bytes::from_static(b"\x01\x02"))
    }

    fn setup() -> (Arc<MockTransport>, Arc<SingleSubmissionExecutor>, Arc<ActionGuard>) {
        let transport = Arc::new(MockTransport::new());
        let executor = SingleSubmissionExecutor::new(transport.clone(), config());
        (transport, executor, ActionGuard::new(MakerId(1)))
    }

    // Test 1: happy path adds the gas buffer and releases after the throttle
    #[tokio::test(start_paused = true)]
    async fn test_settled_action_holds_slot_for_delay() {
        let (transport, executor, guard) = setup();
        transport.set_estimate(Ok(50_000));

        let permit = guard.try_acquire(ActionKind::PlaceInitial).unwrap();
        let exec = Arc::clone(&executor);
        let task = tokio::spawn(async move {
            exec.execute(permit, action(ActionKind::PlaceInitial)).await
        });

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(guard.state(ActionKind::PlaceInitial), GuardState::InFlight);

        let settlement = task.await.unwrap().unwrap();
        assert!(settlement.success);
        assert_eq!(guard.state(ActionKind::PlaceInitial), GuardState::Idle);

        let submitted = transport.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].gas_limit, Some(150_000));
        assert_eq!(submitted[0].to, Address::repeat_byte(0xaa));
        assert_eq!(transport.resync_count(), 0);
    }

    // Test 2: estimation failure never submits and releases the slot
    #[tokio::test(start_paused = true)]
    async fn test_estimation_failure() {
        let (transport, executor, guard) = setup();
        transport.set_estimate(Err(TransportError::Rpc("execution reverted".into())));

        let permit = guard.try_acquire(ActionKind::PlaceInitial).unwrap();
        let result = executor
            .execute(permit, action(ActionKind::PlaceInitial))
            .await;

        assert!(matches!(result, Err(ExecutionError::CostEstimation(_))));
        assert!(transport.submitted().is_empty());
        assert_eq!(guard.state(ActionKind::PlaceInitial), GuardState::Idle);
        assert_eq!(transport.resync_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wipe_estimation_failure_resyncs() {
        let (transport, executor, guard) = setup();
        transport.set_estimate(Err(TransportError::Rpc("execution reverted".into())));

        let permit = guard.try_acquire(ActionKind::Wipe).unwrap();
        let result = executor.execute(permit, action(ActionKind::Wipe)).await;

        assert!(matches!(result, Err(ExecutionError::CostEstimation(_))));
        assert!(transport.submitted().is_empty());
        assert_eq!(guard.state(ActionKind::Wipe), GuardState::Idle);
        assert_eq!(transport.resync_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_estimate_is_a_failure() {
        let (transport, executor, guard) = setup();
        transport.set_estimate(Ok(0));

        let permit = guard.try_acquire(ActionKind::Requote).unwrap();
        let result = executor.execute(permit, action(ActionKind::Requote)).await;

        assert!(matches!(result, Err(ExecutionError::ZeroEstimate)));
        assert_eq!(transport.resync_count(), 1);
    }

    // Test 3: wipe and requote failures resync the sequence number
    #[tokio::test(start_paused = true)]
    async fn test_submission_failure_resyncs() {
        let (transport, executor, guard) = setup();
        transport.set_submit(Err(TransportError::Rejected("nonce too low".into())));

        for kind in [ActionKind::Wipe, ActionKind::Requote, ActionKind::PlaceInitial] {
            let permit = guard.try_acquire(kind).unwrap();
            let result = executor.execute(permit, action(kind)).await;
            assert!(matches!(result, Err(ExecutionError::Submission(_))));
            assert_eq!(guard.state(kind), GuardState::Idle);
        }
        assert_eq!(transport.resync_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_releases_and_resyncs() {
        let (transport, executor, guard) = setup();
        transport.set_settlement(Ok(false));

        let permit = guard.try_acquire(ActionKind::Wipe).unwrap();
        let result = executor.execute(permit, action(ActionKind::Wipe)).await;

        assert!(matches!(result, Err(ExecutionError::Settlement(_))));
        assert_eq!(guard.state(ActionKind::Wipe), GuardState::Idle);
        assert_eq!(transport.resync_count(), 1);
    }

    // Test 4: backoff closes the window after a failure
    #[tokio::test(start_paused = true)]
    async fn test_backoff_window() {
        let transport = Arc::new(MockTransport::new());
        let mut cfg = config();
        cfg.retry = RetryPolicy {
            enabled: true,
            base_delay_ms: 1_000,
            max_delay_ms: 8_000,
        };
        let executor = SingleSubmissionExecutor::new(transport.clone(), cfg);
        let guard = ActionGuard::new(MakerId(1));
        transport.push_estimate(Err(TransportError::Rpc("down".into())));

        let permit = guard.try_acquire(ActionKind::Requote).unwrap();
        let _ = executor.execute(permit, action(ActionKind::Requote)).await;
        assert!(!executor.ready(MakerId(1), ActionKind::Requote));
        assert!(executor.ready(MakerId(1), ActionKind::Wipe));

        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert!(executor.ready(MakerId(1), ActionKind::Requote));
    }

    #[tokio::test(start_paused = true)]
    async fn test_offload_failure_resyncs() {
        let (transport, executor, _guard) = setup();
        transport.push_submit(Err(TransportError::Rpc("timeout".into())));

        assert!(executor.offload(Bytes::from_static(b"swap")).await.is_err());
        assert_eq!(transport.resync_count(), 1);

        assert!(executor.offload(Bytes::from_static(b"swap")).await.is_ok());
        assert_eq!(transport.submitted().len(), 2);
    }
}

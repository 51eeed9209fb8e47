//! Prometheus metrics for the engine.
//!
//! Covers:
//! - Reconciliation decisions and guard suppressions
//! - Submissions per path (direct, batch, offload)
//! - Batch flush outcomes and buffer depth
//! - Available liquidity per maker
//! - Sequence-number resyncs
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! (e.g. a duplicate metric name) is a startup bug and should crash during
//! static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_int_gauge, CounterVec, Encoder, GaugeVec,
    IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Reconciliation decisions.
/// Labels: maker, decision (no_op/place_initial/requote/wipe)
pub static DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aidmm_decisions_total",
        "Reconciliation decisions",
        &["maker", "decision"]
    )
    .unwrap()
});

/// Decisions dropped because the same kind was already in flight.
pub static ACTIONS_SUPPRESSED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aidmm_actions_suppressed_total",
        "Actions suppressed by an in-flight guard",
        &["maker", "kind"]
    )
    .unwrap()
});

/// Submission outcomes.
/// Labels: path (direct/batch/offload), kind, outcome
pub static SUBMISSIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aidmm_submissions_total",
        "Submission outcomes",
        &["path", "kind", "outcome"]
    )
    .unwrap()
});

/// Batch flush ticks by outcome.
pub static BATCH_FLUSHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aidmm_batch_flushes_total",
        "Batch flush ticks by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Actions currently waiting in the batch buffer.
pub static BATCH_PENDING_ACTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "aidmm_batch_pending_actions",
        "Actions waiting in the batch buffer"
    )
    .unwrap()
});

/// Haircut liquidity available to sizing.
/// Labels: maker, side (asset/quote)
pub static AVAILABLE_LIQUIDITY: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "aidmm_available_liquidity",
        "Liquidity available to sizing after haircut",
        &["maker", "side"]
    )
    .unwrap()
});

/// Sequence-number resyncs per submission path.
pub static RESYNC_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "aidmm_resync_total",
        "Signer sequence-number resyncs",
        &["path"]
    )
    .unwrap()
});

/// Metrics helper for recording values.
pub struct Metrics;

impl Metrics {
    /// Record a reconciliation decision.
    pub fn decision(maker: &str, decision: &str) {
        DECISIONS_TOTAL.with_label_values(&[maker, decision]).inc();
    }

    /// Record a decision suppressed by the guard.
    pub fn action_suppressed(maker: &str, kind: &str) {
        ACTIONS_SUPPRESSED_TOTAL
            .with_label_values(&[maker, kind])
            .inc();
    }

    /// Record a submission outcome.
    pub fn submission(path: &str, kind: &str, outcome: &str) {
        SUBMISSIONS_TOTAL
            .with_label_values(&[path, kind, outcome])
            .inc();
    }

    /// Record a batch flush tick.
    pub fn batch_flush(outcome: &str) {
        BATCH_FLUSHES_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Set the batch buffer depth.
    pub fn batch_pending(count: usize) {
        BATCH_PENDING_ACTIONS.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Set available liquidity for one side.
    pub fn available_liquidity(maker: &str, side: &str, amount: f64) {
        AVAILABLE_LIQUIDITY
            .with_label_values(&[maker, side])
            .set(amount);
    }

    /// Record a sequence-number resync.
    pub fn resync(path: &str) {
        RESYNC_TOTAL.with_label_values(&[path]).inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

//! Per-maker runtime.
//!
//! One task per maker drives the reconcile loop:
//!
//! ```text
//! liquidity tick ─→ LiquidityTracker.apply() ─┬─→ ladder feed
//!                                             │
//! target changed ─────────────────────────────┼─→ reconcile → guard → build → dispatch
//! live changed ───────────────────────────────┘
//! ```
//!
//! After every good liquidity reading the size ladder is published to the
//! reference-venue feed, when one is attached.
//!
//! Dispatch is either a direct submission (the permit travels with the
//! action and is released by the executor) or a hand-off to the batch
//! supervisor (the permit is held for the throttle delay, then released).

use std::sync::Arc;
use std::time::Duration;

use aidmm_core::{ActionKind, Book, LiveBook, MakerId, PendingAction};
use aidmm_executor::{
    ActionGuard, DynLiquiditySource, ExecutionError, GuardPermit, SingleSubmissionExecutor,
};
use aidmm_mm::{
    ActionBuilder, BookReconciler, Decision, LiquidityLadder, LiquidityTracker, NoOpReason,
};
use aidmm_telemetry::Metrics;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Collaborator feeds for one maker.
#[derive(Debug, Clone)]
pub struct MakerChannels {
    /// Strategy target book; `None` until the strategy has one.
    pub target: watch::Receiver<Option<Book>>,
    /// Venue position tracker view.
    pub live: watch::Receiver<LiveBook>,
}

/// Where built actions go.
#[derive(Clone)]
pub enum Dispatch {
    Direct(Arc<SingleSubmissionExecutor>),
    Batched {
        actions: mpsc::Sender<PendingAction>,
        post_action_delay: Duration,
    },
}

impl Dispatch {
    /// Submission path label for metrics.
    #[must_use]
    pub fn path(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Batched { .. } => "batch",
        }
    }
}

/// Reference-venue ladder feed and its depth.
struct LadderFeed {
    sender: watch::Sender<LiquidityLadder>,
    levels: u32,
}

/// Everything one maker owns.
pub struct MakerRuntime {
    maker: MakerId,
    label: String,
    reconciler: BookReconciler,
    tracker: LiquidityTracker,
    builder: ActionBuilder,
    guard: Arc<ActionGuard>,
    liquidity: DynLiquiditySource,
    dispatch: Dispatch,
    poll_interval: Duration,
    channels: MakerChannels,
    ladder: Option<LadderFeed>,
}

impl MakerRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        maker: MakerId,
        reconciler: BookReconciler,
        tracker: LiquidityTracker,
        builder: ActionBuilder,
        liquidity: DynLiquiditySource,
        dispatch: Dispatch,
        poll_interval: Duration,
        channels: MakerChannels,
    ) -> Self {
        Self {
            maker,
            label: maker.to_string(),
            reconciler,
            tracker,
            builder,
            guard: ActionGuard::new(maker),
            liquidity,
            dispatch,
            poll_interval,
            channels,
            ladder: None,
        }
    }

    /// Publish a `levels`-deep size ladder after every good liquidity reading.
    #[must_use]
    pub fn with_ladder(mut self, sender: watch::Sender<LiquidityLadder>, levels: u32) -> Self {
        self.ladder = Some(LadderFeed { sender, levels });
        self
    }

    #[must_use]
    pub fn maker(&self) -> MakerId {
        self.maker
    }

    /// Shared handle on this maker's in-flight slots.
    #[must_use]
    pub fn guard(&self) -> Arc<ActionGuard> {
        Arc::clone(&self.guard)
    }

    /// Run until `shutdown` fires or the strategy feed closes.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            maker = %self.maker,
            pair = %self.builder.pair(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "Maker runtime started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = poll.tick() => {
                    self.poll_liquidity().await;
                    self.step().await;
                }
                changed = self.channels.target.changed() => {
                    if changed.is_err() {
                        warn!(maker = %self.maker, "Strategy feed closed");
                        break;
                    }
                    self.step().await;
                }
                changed = self.channels.live.changed() => {
                    if changed.is_err() {
                        warn!(maker = %self.maker, "Position feed closed");
                        break;
                    }
                    self.step().await;
                }
            }
        }
        info!(maker = %self.maker, "Maker runtime stopped");
    }

    async fn poll_liquidity(&mut self) {
        let reading = self.liquidity.query_available_liquidity(self.maker).await;
        let raw = match reading {
            Ok(raw) => raw,
            Err(e) => {
                self.tracker.record_failure(&e);
                return;
            }
        };

        let target = self.channels.target.borrow().clone();
        if let Err(e) = self.tracker.apply(&raw, target.as_ref()) {
            self.tracker.record_failure(&e);
            return;
        }
        if let Some(state) = self.tracker.state() {
            Metrics::available_liquidity(
                &self.label,
                "asset",
                state.asset_amount.to_f64().unwrap_or(0.0),
            );
            Metrics::available_liquidity(
                &self.label,
                "quote",
                state.quote_amount.to_f64().unwrap_or(0.0),
            );
        }
        if let Some(feed) = &self.ladder {
            if let Some(ladder) = self.tracker.ladder(feed.levels) {
                feed.sender.send_replace(ladder);
            }
        }
    }

    /// Reconcile the latest views and dispatch at most one action.
    async fn step(&mut self) {
        let target = self.channels.target.borrow_and_update().clone();
        let live = self.channels.live.borrow_and_update().clone();

        let (decision, target) = match target {
            Some(mut target) => {
                let decision =
                    self.reconciler
                        .reconcile(&mut target, live.book.as_ref(), self.tracker.state());
                (decision, target)
            }
            None => (Decision::NoOp(NoOpReason::MissingBook), Book::default()),
        };
        Metrics::decision(&self.label, decision.as_str());

        let Some(kind) = decision.action_kind() else {
            return;
        };
        let Some(permit) = self.acquire(kind) else {
            return;
        };

        let action = match self.builder.build(
            decision,
            &target,
            &live,
            self.tracker.relative_balances(),
        ) {
            Ok(Some(action)) => action,
            Ok(None) => return,
            Err(e) => {
                let e = ExecutionError::from(e);
                warn!(maker = %self.maker, kind = %kind, error = %e, "Failed to build action");
                Metrics::submission(self.dispatch.path(), kind.as_str(), e.label());
                return;
            }
        };
        debug!(maker = %self.maker, decision = %decision, "Dispatching action");
        self.dispatch(permit, action).await;
    }

    fn acquire(&self, kind: ActionKind) -> Option<GuardPermit> {
        if let Dispatch::Direct(executor) = &self.dispatch {
            if !executor.ready(self.maker, kind) {
                debug!(maker = %self.maker, kind = %kind, "Backing off");
                return None;
            }
        }
        let permit = self.guard.try_acquire(kind);
        if permit.is_none() {
            Metrics::action_suppressed(&self.label, kind.as_str());
            debug!(maker = %self.maker, kind = %kind, "Previous action still in flight");
        }
        permit
    }

    async fn dispatch(&self, permit: GuardPermit, action: PendingAction) {
        match &self.dispatch {
            Dispatch::Direct(executor) => {
                let executor = Arc::clone(executor);
                tokio::spawn(async move {
                    // Outcome is logged and counted by the executor.
                    let _ = executor.execute(permit, action).await;
                });
            }
            Dispatch::Batched {
                actions,
                post_action_delay,
            } => {
                if let Err(e) = actions.send(action).await {
                    warn!(maker = %self.maker, kind = %e.0.kind, "Batch supervisor gone, action dropped");
                    return;
                }
                let delay = *post_action_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    drop(permit);
                });
            }
        }
    }
}

//! Application orchestration.
//!
//! Wires one `MakerRuntime` per configured maker, the batch supervisor
//! (batched mode only) and the fill offloader onto shared executors, then
//! runs them as tasks until shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use aidmm_core::{ActionEncoder, MakerId, PendingAction};
use aidmm_executor::{
    ActionGuard, BatchExecutor, DynLiquiditySource, DynTransport, MarketAidEncoder,
    SingleSubmissionExecutor,
};
use aidmm_mm::{
    ActionBuilder, BookReconciler, InventoryBiasCalculator, LiquidityLadder, LiquidityTracker,
};
use aidmm_telemetry::Metrics;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{AppConfig, EngineMode};
use crate::error::{AppError, AppResult};
use crate::maker::{Dispatch, MakerChannels, MakerRuntime};
use crate::offload::{FillOffloader, VenueEvent};

/// Capacity of the maker → batch supervisor channel.
const ACTION_CHANNEL_CAPACITY: usize = 256;

/// External systems the engine runs against.
pub struct Collaborators {
    pub transport: DynTransport,
    pub liquidity: DynLiquiditySource,
    pub encoder: Arc<dyn ActionEncoder>,
    /// Strategy and position feeds per maker.
    pub makers: HashMap<MakerId, MakerChannels>,
    /// Reference-venue size ladders, for makers that publish one.
    pub ladders: HashMap<MakerId, watch::Sender<LiquidityLadder>>,
    pub venue_events: mpsc::Receiver<VenueEvent>,
}

impl Collaborators {
    /// Collaborators using the market-aid encoder and no maker feeds yet.
    pub fn new(
        transport: DynTransport,
        liquidity: DynLiquiditySource,
        venue_events: mpsc::Receiver<VenueEvent>,
    ) -> Self {
        Self {
            transport,
            liquidity,
            encoder: Arc::new(MarketAidEncoder),
            makers: HashMap::new(),
            ladders: HashMap::new(),
            venue_events,
        }
    }

    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn ActionEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    #[must_use]
    pub fn with_maker(mut self, maker: MakerId, channels: MakerChannels) -> Self {
        self.makers.insert(maker, channels);
        self
    }

    /// Publish `maker`'s liquidity ladder on `sender` after every poll.
    #[must_use]
    pub fn with_ladder(mut self, maker: MakerId, sender: watch::Sender<LiquidityLadder>) -> Self {
        self.ladders.insert(maker, sender);
        self
    }
}

/// Main application state.
pub struct Application {
    mode: EngineMode,
    makers: Vec<MakerRuntime>,
    guards: HashMap<MakerId, Arc<ActionGuard>>,
    single: Arc<SingleSubmissionExecutor>,
    batch: Option<(Arc<BatchExecutor>, mpsc::Receiver<PendingAction>)>,
    offloader: FillOffloader,
    venue_events: mpsc::Receiver<VenueEvent>,
}

impl Application {
    /// Build every component from `config`.
    ///
    /// Fails if the configuration is invalid or a configured maker has no feeds.
    pub fn new(config: AppConfig, collaborators: Collaborators) -> AppResult<Self> {
        config.validate()?;
        let Collaborators {
            transport,
            liquidity,
            encoder,
            makers: mut feeds,
            mut ladders,
            venue_events,
        } = collaborators;

        let single = SingleSubmissionExecutor::new(Arc::clone(&transport), config.single_config()?);
        let (dispatch, batch) = match config.engine.mode {
            EngineMode::Direct => (Dispatch::Direct(Arc::clone(&single)), None),
            EngineMode::Batched => {
                let (tx, rx) = mpsc::channel(ACTION_CHANNEL_CAPACITY);
                let batch = BatchExecutor::new(
                    Arc::clone(&transport),
                    Arc::clone(&encoder),
                    &config.maker_ids(),
                    config.batch_config()?,
                );
                let dispatch = Dispatch::Batched {
                    actions: tx,
                    post_action_delay: config.post_action_delay(),
                };
                (dispatch, Some((batch, rx)))
            }
        };

        let mut offloader = FillOffloader::new(Arc::clone(&single));
        let mut makers = Vec::with_capacity(config.makers.len());
        let mut guards = HashMap::with_capacity(config.makers.len());
        for settings in &config.makers {
            let maker = settings.maker_id();
            let channels = feeds.remove(&maker).ok_or_else(|| {
                AppError::Config(format!("no strategy or position feed for {maker}"))
            })?;
            let pair = settings.pair()?;
            let quoting = &settings.quoting;

            if settings.offload_fills {
                offloader.register(
                    maker,
                    pair.clone(),
                    Arc::clone(&encoder),
                    settings.rebalance_pool_fee,
                );
            }
            let bias = settings
                .inventory_managed
                .then(|| InventoryBiasCalculator::new(quoting.inventory_delta));

            let mut runtime = MakerRuntime::new(
                maker,
                BookReconciler::new(maker, quoting.delta_trigger),
                LiquidityTracker::new(maker, pair.clone(), quoting.liquidity_usage_bps),
                ActionBuilder::new(maker, pair, Arc::clone(&encoder), bias),
                Arc::clone(&liquidity),
                dispatch.clone(),
                settings.liquidity_poll_interval(),
                channels,
            );
            if let Some(sender) = ladders.remove(&maker) {
                runtime = runtime.with_ladder(sender, quoting.ladder_levels);
            }
            guards.insert(maker, runtime.guard());
            makers.push(runtime);
        }
        for maker in feeds.keys().chain(ladders.keys()) {
            warn!(maker = %maker, "Feeds supplied for an unconfigured maker, ignoring");
        }

        Ok(Self {
            mode: config.engine.mode,
            makers,
            guards,
            single,
            batch,
            offloader,
            venue_events,
        })
    }

    #[must_use]
    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    /// In-flight slots of `maker`.
    #[must_use]
    pub fn guard(&self, maker: MakerId) -> Option<Arc<ActionGuard>> {
        self.guards.get(&maker).cloned()
    }

    #[must_use]
    pub fn single_executor(&self) -> Arc<SingleSubmissionExecutor> {
        Arc::clone(&self.single)
    }

    /// Batch supervisor, present in batched mode.
    #[must_use]
    pub fn batch_executor(&self) -> Option<Arc<BatchExecutor>> {
        self.batch.as_ref().map(|(batch, _)| Arc::clone(batch))
    }

    /// Install the global tracing subscriber. Fails if one is already set.
    pub fn init_logging() -> AppResult<()> {
        Ok(aidmm_telemetry::init_logging()?)
    }

    /// Prometheus text exposition of every engine metric.
    pub fn render_metrics() -> AppResult<String> {
        Ok(Metrics::render()?)
    }

    /// Run every task until `shutdown` fires, then wait for them to stop.
    pub async fn run(self, shutdown: CancellationToken) -> AppResult<()> {
        info!(
            mode = ?self.mode,
            makers = self.makers.len(),
            "Starting application"
        );

        let mut tasks: Vec<JoinHandle<()>> = Vec::with_capacity(self.makers.len() + 2);
        if let Some((batch, actions)) = self.batch {
            tasks.push(tokio::spawn(batch.run(actions, shutdown.clone())));
        }
        tasks.push(tokio::spawn(
            self.offloader.run(self.venue_events, shutdown.clone()),
        ));
        for maker in self.makers {
            tasks.push(tokio::spawn(maker.run(shutdown.clone())));
        }

        shutdown.cancelled().await;
        info!("Shutdown signal received");
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Task ended abnormally");
            }
        }
        info!("Application stopped");
        Ok(())
    }
}

//! Mock venue for integration tests.
//!
//! Owns the sending half of every feed the engine consumes plus the mock
//! transport and liquidity source, so a test can script the world and
//! inspect what the engine submitted.

use aidmm_bot::{AppConfig, Application, Collaborators, MakerChannels, VenueEvent};
use aidmm_core::{Book, BookLevel, LiveBook, MakerId, Price, Size};
use aidmm_executor::{Call, MockLiquiditySource, MockTransport};
use aidmm_mm::{LiquidityLadder, RawLiquidity};
use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const MARKET_AID: &str = "0x00000000000000000000000000000000000000aa";

pub fn weth() -> Address {
    Address::repeat_byte(0x11)
}

pub fn usdc() -> Address {
    Address::repeat_byte(0x22)
}

/// TOML for `makers` trading WETH/USDC with a one second liquidity poll.
pub fn config(engine: &str, makers: &[u32], maker_extra: &str) -> AppConfig {
    let mut toml_str = format!(
        r#"
[engine]
market_aid = "{MARKET_AID}"
{engine}

[retry]
enabled = false
"#
    );
    for id in makers {
        toml_str.push_str(&format!(
            r#"
[[makers]]
id = {id}
asset = {{ address = "{}", decimals = 18, symbol = "WETH" }}
quote = {{ address = "{}", decimals = 6, symbol = "USDC" }}
{maker_extra}
"#,
            weth(),
            usdc()
        ));
    }
    AppConfig::from_toml_str(&toml_str).expect("valid test config")
}

/// Sending side of one maker's feeds.
pub struct MakerFeeds {
    pub target: watch::Sender<Option<Book>>,
    pub live: watch::Sender<LiveBook>,
    /// Ladder published after each liquidity poll.
    pub ladder: watch::Receiver<LiquidityLadder>,
}

pub struct MockVenue {
    pub transport: Arc<MockTransport>,
    pub liquidity: Arc<MockLiquiditySource>,
    pub feeds: HashMap<MakerId, MakerFeeds>,
    pub events: mpsc::Sender<VenueEvent>,
    pub shutdown: CancellationToken,
}

impl MockVenue {
    /// Build the venue and an `Application` wired to it.
    pub fn start(config: AppConfig) -> (Self, Application) {
        // Only the first test in the binary installs the subscriber.
        let _ = Application::init_logging();
        let transport = Arc::new(MockTransport::new());
        let liquidity = Arc::new(MockLiquiditySource::new());
        let (events, event_rx) = mpsc::channel(64);
        let mut collaborators =
            Collaborators::new(transport.clone(), liquidity.clone(), event_rx);

        let mut feeds = HashMap::new();
        for maker in config.maker_ids() {
            let (target, target_rx) = watch::channel(None);
            let (live, live_rx) = watch::channel(LiveBook::default());
            let (ladder_tx, ladder) = watch::channel(LiquidityLadder::default());
            collaborators = collaborators
                .with_maker(
                    maker,
                    MakerChannels {
                        target: target_rx,
                        live: live_rx,
                    },
                )
                .with_ladder(maker, ladder_tx);
            feeds.insert(maker, MakerFeeds { target, live, ladder });
        }

        let app = Application::new(config, collaborators).expect("application builds");
        let venue = Self {
            transport,
            liquidity,
            feeds,
            events,
            shutdown: CancellationToken::new(),
        };
        (venue, app)
    }

    pub fn spawn(&self, app: Application) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            app.run(shutdown).await.expect("application run");
        })
    }

    pub fn feeds(&self, maker: MakerId) -> &MakerFeeds {
        &self.feeds[&maker]
    }

    /// Calls submitted to the market-aid contract so far.
    pub fn submitted(&self) -> Vec<Call> {
        self.transport.submitted()
    }

    pub async fn stop(self, handle: JoinHandle<()>) {
        self.shutdown.cancel();
        handle.await.expect("application task");
    }
}

pub fn level(price: Decimal, size: Decimal) -> BookLevel {
    BookLevel::new(Price::new(price), Size::new(size))
}

/// Book with unit size at every price.
pub fn book(asks: &[Decimal], bids: &[Decimal]) -> Book {
    Book::new(
        asks.iter().map(|p| level(*p, Decimal::ONE)).collect(),
        bids.iter().map(|p| level(*p, Decimal::ONE)).collect(),
    )
}

/// Empty live book, as right after startup.
pub fn empty_live() -> LiveBook {
    LiveBook::new(Book::new(Vec::new(), Vec::new()), Vec::new())
}

/// Raw reading in base units (18-decimal asset, 6-decimal quote).
pub fn raw_liquidity(weth_whole: u64, usdc_whole: u64) -> RawLiquidity {
    RawLiquidity {
        asset_amount: U256::from(weth_whole) * U256::from(10u64).pow(U256::from(18)),
        quote_amount: U256::from(usdc_whole) * U256::from(1_000_000u64),
        ok: true,
    }
}

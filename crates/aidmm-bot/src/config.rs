//! Application configuration.

use crate::error::{AppError, AppResult};
use aidmm_core::{AssetPair, MakerId, TokenMeta};
use aidmm_executor::{BatchConfig, BatchFailurePolicy, RetryPolicy, SingleConfig};
use aidmm_mm::MakerConfig;
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Largest token precision the decimal conversions support.
const MAX_TOKEN_DECIMALS: u8 = 28;
const BPS_DENOMINATOR: u32 = 10_000;

/// How maker actions reach the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// Each maker submits its own transactions.
    #[default]
    Direct,
    /// Makers hand actions to one supervisor that submits them together.
    Batched,
}

/// Submission settings shared by every maker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub mode: EngineMode,

    /// Market-aid contract address (hex).
    #[serde(default)]
    pub market_aid: String,

    /// Batch flush interval (ms). Default: 2,000.
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,

    /// Throttle after each action (ms). Default: 2,000.
    #[serde(default = "default_post_action_delay_ms")]
    pub post_action_delay_ms: u64,

    /// Gas added on top of every estimate. Default: 100,000.
    #[serde(default = "default_gas_buffer")]
    pub gas_buffer: u64,

    #[serde(default)]
    pub batch_failure_policy: BatchFailurePolicy,
}

fn default_batch_interval_ms() -> u64 {
    2_000
}

fn default_post_action_delay_ms() -> u64 {
    2_000
}

fn default_gas_buffer() -> u64 {
    100_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::default(),
            market_aid: String::new(),
            batch_interval_ms: default_batch_interval_ms(),
            post_action_delay_ms: default_post_action_delay_ms(),
            gas_buffer: default_gas_buffer(),
            batch_failure_policy: BatchFailurePolicy::default(),
        }
    }
}

/// One side of a maker's pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token address (hex).
    pub address: String,
    pub decimals: u8,
    #[serde(default)]
    pub symbol: String,
}

impl TokenConfig {
    fn to_meta(&self) -> AppResult<TokenMeta> {
        let address = parse_address(&self.address, &self.symbol)?;
        Ok(TokenMeta::new(address, self.decimals, self.symbol.clone()))
    }
}

/// Per-maker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakerSettings {
    pub id: u32,
    pub asset: TokenConfig,
    pub quote: TokenConfig,

    /// Scale requote sizes by the inventory bias.
    #[serde(default)]
    pub inventory_managed: bool,

    /// Offload fills through the reference venue once their block seals.
    #[serde(default)]
    pub offload_fills: bool,

    /// Reference-venue pool fee (hundredths of a bip). Default: 3,000 (0.3%).
    #[serde(default = "default_rebalance_pool_fee")]
    pub rebalance_pool_fee: u32,

    #[serde(default)]
    pub quoting: MakerConfig,
}

fn default_rebalance_pool_fee() -> u32 {
    3_000
}

impl MakerSettings {
    #[must_use]
    pub fn maker_id(&self) -> MakerId {
        MakerId(self.id)
    }

    pub fn pair(&self) -> AppResult<AssetPair> {
        Ok(AssetPair::new(self.asset.to_meta()?, self.quote.to_meta()?))
    }

    #[must_use]
    pub fn liquidity_poll_interval(&self) -> Duration {
        Duration::from_millis(self.quoting.liquidity_poll_interval_ms)
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    /// Retry pacing for every submission path.
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub makers: Vec<MakerSettings>,
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        self.market_aid()?;
        if self.engine.batch_interval_ms == 0 {
            return Err(AppError::Config(
                "engine.batch_interval_ms must be positive".to_string(),
            ));
        }
        if self.retry.enabled && self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(AppError::Config(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }

        let mut seen = HashSet::new();
        for maker in &self.makers {
            if !seen.insert(maker.id) {
                return Err(AppError::Config(format!("duplicate maker id {}", maker.id)));
            }
            maker.pair()?;
            for token in [&maker.asset, &maker.quote] {
                if token.decimals > MAX_TOKEN_DECIMALS {
                    return Err(AppError::Config(format!(
                        "maker {}: token {} has {} decimals (max {MAX_TOKEN_DECIMALS})",
                        maker.id, token.symbol, token.decimals
                    )));
                }
            }
            if maker.quoting.liquidity_poll_interval_ms == 0 {
                return Err(AppError::Config(format!(
                    "maker {}: liquidity_poll_interval_ms must be positive",
                    maker.id
                )));
            }
            if maker.quoting.liquidity_usage_bps > BPS_DENOMINATOR {
                return Err(AppError::Config(format!(
                    "maker {}: liquidity_usage_bps {} exceeds {BPS_DENOMINATOR}",
                    maker.id, maker.quoting.liquidity_usage_bps
                )));
            }
        }
        Ok(())
    }

    pub fn market_aid(&self) -> AppResult<Address> {
        parse_address(&self.engine.market_aid, "market_aid")
    }

    #[must_use]
    pub fn maker_ids(&self) -> Vec<MakerId> {
        self.makers.iter().map(MakerSettings::maker_id).collect()
    }

    #[must_use]
    pub fn post_action_delay(&self) -> Duration {
        Duration::from_millis(self.engine.post_action_delay_ms)
    }

    pub fn single_config(&self) -> AppResult<SingleConfig> {
        Ok(SingleConfig {
            market_aid: self.market_aid()?,
            gas_buffer: self.engine.gas_buffer,
            post_action_delay: self.post_action_delay(),
            retry: self.retry.clone(),
        })
    }

    pub fn batch_config(&self) -> AppResult<BatchConfig> {
        Ok(BatchConfig {
            market_aid: self.market_aid()?,
            gas_buffer: self.engine.gas_buffer,
            interval: Duration::from_millis(self.engine.batch_interval_ms),
            failure_policy: self.engine.batch_failure_policy,
            retry: self.retry.clone(),
        })
    }
}

fn parse_address(value: &str, what: &str) -> AppResult<Address> {
    value
        .parse::<Address>()
        .map_err(|e| AppError::Config(format!("invalid {what} address {value:?}: {e}")))
}

//! Configuration module

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::redundancy::LinearEstimator;

const ETHER: u128 = 1_000_000_000_000_000_000;
/// Estimator count the redundancy stage can run.
pub const MAX_REDUNDANCY_LEVEL: u8 = 3;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transaction screening
    pub prefilter: PrefilterConfig,

    /// Pool state cache
    pub state: StateConfig,

    /// Precomputed sizing table and tip policy
    pub sizer: SizerConfig,

    /// Cross-validation of profit estimates
    pub redundancy: RedundancyConfig,

    /// Viability thresholds and bundle assembly
    pub strategy: StrategyConfig,

    /// Worker pool settings
    pub performance: PerformanceConfig,

    /// Initial fee environment and block cadence
    pub network: NetworkConfig,

    pub logging: LoggingConfig,

    /// Prometheus export
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefilterConfig {
    /// Bloom filter holds 2^bloom_bits_log2 bits
    pub bloom_bits_log2: u32,
    pub bloom_hashes: u32,
    /// Routers registered on top of the built-in list
    pub extra_routers: Vec<Address>,
    /// Hex selectors registered as V2-family swaps
    pub extra_selectors: Vec<String>,
    pub large_transfer_wei: U256,
    pub high_gas_limit: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Placeholder reserves inserted on a cache miss
    pub default_reserve0: U256,
    pub default_reserve1: U256,
    pub default_fee_bps: u32,
    /// Pools inserted with placeholder reserves at startup
    pub prewarm: Vec<Address>,
    pub refresh_timeout_ms: u64,
    pub stale_after_blocks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizerConfig {
    pub victim_buckets: usize,
    pub liquidity_buckets: usize,
    pub min_victim_wei: U256,
    pub max_victim_wei: U256,
    pub min_liquidity_wei: U256,
    pub max_liquidity_wei: U256,
    /// Fee the table is precomputed for; other fees are solved exactly
    pub table_fee_bps: u32,
    /// Share of profit bid as priority tip
    pub tip_share_bps: u32,
    pub congestion_threshold: u8,
    pub congestion_multiplier_bps: u32,
    /// Tip floor above the base fee
    pub base_fee_margin_bps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedundancyConfig {
    /// Number of estimators consulted, 1..=3
    pub level: u8,
    pub parallel: bool,
    pub timeout_ms: u64,
    /// Max relative spread for estimates to count as agreeing
    pub tolerance_bps: u32,
    /// impact, impact^2, fee fraction, bias
    pub linear_weights: [f64; 4],
    pub linear_learning_rate: f64,
    pub heuristic_frontrun_bps: u32,
    pub heuristic_margin_bps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub searcher_address: Address,
    pub starting_nonce: u64,
    pub min_profit_wei: U256,
    /// Highest priority tip we are willing to pay
    pub max_fee_wei: U256,
    pub max_bundle_gas: u64,
    pub max_bundle_bytes: usize,
    pub max_victim_slippage_bps: u32,
    /// Threshold multiplier when consensus confidence is low
    pub low_confidence_multiplier_bps: u32,
    pub fee_nudge_wei: U256,
    pub deadline_secs: u64,
    /// Run every stage but never hand bundles to the submitter
    pub simulation_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub worker_threads: usize,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub initial_base_fee_wei: U256,
    /// 0..=100
    pub initial_congestion: u8,
    pub block_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter, overridden by `RUST_LOG`
    pub level: String,
    pub json_output: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus listener, disabled when `None`
    pub listen_addr: Option<String>,
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            bloom_bits_log2: 20,
            bloom_hashes: 7,
            extra_routers: vec![],
            extra_selectors: vec![],
            large_transfer_wei: U256::from(50 * ETHER),
            high_gas_limit: 500_000,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            default_reserve0: U256::from(1_000_000 * ETHER),
            default_reserve1: U256::from(2_000_000_000_000_000u128),
            default_fee_bps: 30,
            prewarm: vec![],
            refresh_timeout_ms: 50,
            stale_after_blocks: 3,
        }
    }
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            victim_buckets: 64,
            liquidity_buckets: 32,
            min_victim_wei: U256::from(ETHER / 1_000),
            max_victim_wei: U256::from(10_000 * ETHER),
            min_liquidity_wei: U256::from(ETHER),
            max_liquidity_wei: U256::from(100_000_000 * ETHER),
            table_fee_bps: 30,
            tip_share_bps: 1_500,
            congestion_threshold: 50,
            congestion_multiplier_bps: 15_000,
            base_fee_margin_bps: 1_000,
        }
    }
}

impl Default for RedundancyConfig {
    fn default() -> Self {
        Self {
            level: MAX_REDUNDANCY_LEVEL,
            parallel: true,
            timeout_ms: 10,
            tolerance_bps: 1_000,
            linear_weights: LinearEstimator::DEFAULT_WEIGHTS,
            linear_learning_rate: 0.05,
            heuristic_frontrun_bps: 2_500,
            heuristic_margin_bps: 200,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            searcher_address: Address::zero(),
            starting_nonce: 0,
            min_profit_wei: U256::from(ETHER / 1_000), // 0.001 ETH
            max_fee_wei: U256::from(ETHER / 2),
            max_bundle_gas: 1_500_000,
            max_bundle_bytes: 128 * 1024,
            max_victim_slippage_bps: 50,
            low_confidence_multiplier_bps: 20_000,
            fee_nudge_wei: U256::one(),
            deadline_secs: 120,
            simulation_only: false,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            queue_capacity: 4_096,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            initial_base_fee_wei: U256::from(20_000_000_000u128),
            initial_congestion: 50,
            block_interval_ms: 12_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_output: false,
        }
    }
}

impl RedundancyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl NetworkConfig {
    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }
}

impl StateConfig {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }
}

impl PrefilterConfig {
    /// Extra selectors as raw bytes. Invalid entries are rejected by
    /// [`Config::validate`].
    pub fn parsed_selectors(&self) -> Vec<[u8; 4]> {
        self.extra_selectors
            .iter()
            .filter_map(|s| parse_selector(s))
            .collect()
    }
}

fn parse_selector(s: &str) -> Option<[u8; 4]> {
    let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
    bytes.try_into().ok()
}

impl Config {
    /// Load config from environment
    pub fn from_env() -> anyhow::Result<Self> {
        // Try to load from file first
        let config_path = std::env::var("MEV_CONFIG")
            .unwrap_or_else(|_| "config/config.json".to_string());

        let mut config = if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        if let Ok(addr) = std::env::var("MEV_SEARCHER_ADDRESS") {
            config.strategy.searcher_address = addr.parse()?;
        }
        if let Ok(flag) = std::env::var("MEV_SIMULATION_ONLY") {
            config.strategy.simulation_only = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        if let Ok(level) = std::env::var("MEV_REDUNDANCY_LEVEL") {
            config.redundancy.level = level.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.redundancy;
        if r.level == 0 || r.level > MAX_REDUNDANCY_LEVEL {
            return Err(ConfigError::RedundancyLevel {
                got: r.level,
                max: MAX_REDUNDANCY_LEVEL,
            });
        }
        if r.timeout_ms == 0 {
            return Err(ConfigError::Zero("redundancy.timeout_ms"));
        }
        if !(10..=30).contains(&self.prefilter.bloom_bits_log2) {
            return Err(ConfigError::BloomBits(self.prefilter.bloom_bits_log2));
        }
        if self.prefilter.bloom_hashes == 0 {
            return Err(ConfigError::Zero("prefilter.bloom_hashes"));
        }
        if let Some(bad) = self
            .prefilter
            .extra_selectors
            .iter()
            .find(|s| parse_selector(s).is_none())
        {
            return Err(ConfigError::Selector(bad.clone()));
        }
        let s = &self.sizer;
        if s.victim_buckets == 0 {
            return Err(ConfigError::Zero("sizer.victim_buckets"));
        }
        if s.liquidity_buckets == 0 {
            return Err(ConfigError::Zero("sizer.liquidity_buckets"));
        }
        if s.min_victim_wei.is_zero() || s.min_victim_wei >= s.max_victim_wei {
            return Err(ConfigError::Range("sizer victim range"));
        }
        if s.min_liquidity_wei.is_zero() || s.min_liquidity_wei >= s.max_liquidity_wei {
            return Err(ConfigError::Range("sizer liquidity range"));
        }
        if self.performance.worker_threads == 0 {
            return Err(ConfigError::Zero("performance.worker_threads"));
        }
        if self.performance.queue_capacity == 0 {
            return Err(ConfigError::Zero("performance.queue_capacity"));
        }
        if self.network.initial_congestion > 100 {
            return Err(ConfigError::Range("network.initial_congestion"));
        }
        if self.network.block_interval_ms == 0 {
            return Err(ConfigError::Zero("network.block_interval_ms"));
        }
        if self.strategy.fee_nudge_wei.is_zero() {
            return Err(ConfigError::Zero("strategy.fee_nudge_wei"));
        }
        Ok(())
    }

    /// Save config to file
    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

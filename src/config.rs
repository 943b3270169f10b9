//! Configuration Module
//!
//! This module defines all configuration structures for the batcher.
//! Static configuration is loaded from TOML files and parsed using serde.
//! The sealing section is additionally exposed through [`ConfigSource`] so the
//! scheduling loop can pick up changes between cycles.

use crate::{Address, BatcherError, TokenAmount};
use serde::Deserialize;
use std::fs;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Main configuration structure
///
/// # Example TOML
/// ```toml
/// [miner]
/// address = "f01000"
///
/// [sealing]
/// max_precommit_batch = 256
/// precommit_batch_wait_ms = 86400000
/// precommit_batch_slack_ms = 10800000
///
/// [api]
/// host = "127.0.0.1"
/// port = 2345
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub miner: MinerConfig,
    #[serde(default)]
    pub sealing: SealingConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub chain: ChainConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    /// Miner actor address, in ID form.
    pub address: Address,
    /// Never send pre-commits from the owner address.
    #[serde(default)]
    pub disable_owner_fallback: bool,
}

/// Batching limits and collateral sourcing.
///
/// # Fields
/// - `max_precommit_batch`: Maximum sectors per batch message
/// - `precommit_batch_wait_ms`: Longest a batch may accumulate before it is sent
/// - `precommit_batch_slack_ms`: Safety margin subtracted from sector cutoffs
/// - `batch_precommit_above_base_fee`: Below this base fee sectors are sent individually (0 disables)
/// - `collateral_from_miner_balance`: Pay deposits from the miner's available balance
/// - `disable_collateral_fallback`: Never send collateral from the sending wallet
/// - `available_balance_buffer`: Portion of the miner balance kept untouched
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SealingConfig {
    pub max_precommit_batch: usize,
    pub precommit_batch_wait_ms: u64,
    pub precommit_batch_slack_ms: u64,
    pub batch_precommit_above_base_fee: TokenAmount,
    pub collateral_from_miner_balance: bool,
    pub disable_collateral_fallback: bool,
    pub available_balance_buffer: TokenAmount,
}

impl Default for SealingConfig {
    fn default() -> Self {
        Self {
            max_precommit_batch: 256,
            precommit_batch_wait_ms: 24 * 60 * 60 * 1000,
            precommit_batch_slack_ms: 3 * 60 * 60 * 1000,
            batch_precommit_above_base_fee: 320_000_000, // 0.32 nanoFIL
            collateral_from_miner_balance: false,
            disable_collateral_fallback: false,
            available_balance_buffer: 0,
        }
    }
}

impl SealingConfig {
    /// Reject limits the scheduling loop cannot work with.
    pub fn validate(&self) -> Result<(), BatcherError> {
        if self.max_precommit_batch == 0 {
            return Err(BatcherError::Config(
                "max_precommit_batch must be positive".to_string(),
            ));
        }
        if self.precommit_batch_wait_ms == 0 {
            return Err(BatcherError::Config(
                "precommit_batch_wait_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn batch_wait(&self) -> Duration {
        Duration::from_millis(self.precommit_batch_wait_ms)
    }

    pub fn batch_slack(&self) -> Duration {
        Duration::from_millis(self.precommit_batch_slack_ms)
    }
}

/// Gas fee caps for pre-commit messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Max fee for an individually sent pre-commit.
    pub max_precommit_gas_fee: TokenAmount,
    pub max_precommit_batch_gas_fee: BatchFeeConfig,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            max_precommit_gas_fee: 25_000_000_000_000_000, // 0.025 FIL
            max_precommit_batch_gas_fee: BatchFeeConfig {
                base: 0,
                per_sector: 20_000_000_000_000_000, // 0.02 FIL
            },
        }
    }
}

/// Max fee of a batch message, growing linearly with its sector count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BatchFeeConfig {
    pub base: TokenAmount,
    pub per_sector: TokenAmount,
}

impl BatchFeeConfig {
    pub fn fee_for_sectors(&self, sectors: usize) -> TokenAmount {
        self.base
            .saturating_add(self.per_sector.saturating_mul(sectors as TokenAmount))
    }
}

/// Admin JSON-RPC endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

/// Chain parameters.
///
/// Everything except `block_delay_secs` only seeds the in-memory devnet used
/// by the binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub block_delay_secs: u64,
    pub network_version: u32,
    pub start_height: i64,
    pub base_fee: TokenAmount,
    pub miner_available_balance: TokenAmount,
    pub wallet_balance: TokenAmount,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            block_delay_secs: 30,
            network_version: 16,
            start_height: 0,
            base_fee: 100,
            miner_available_balance: 0,
            wallet_balance: 1_000 * crate::ONE_TOKEN,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Example
    /// ```no_run
    /// # use precommit_batcher::Config;
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.sealing.validate()?;
        Ok(config)
    }
}

/// Source of the current sealing configuration, polled once per loop cycle.
pub trait ConfigSource: Send + Sync {
    fn sealing_config(&self) -> Result<SealingConfig, BatcherError>;
}

/// Runtime-updatable sealing configuration.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<SealingConfig>>,
}

impl SharedConfig {
    pub fn new(config: SealingConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Replace the configuration; picked up by the next scheduling cycle.
    pub fn update(&self, config: SealingConfig) -> Result<(), BatcherError> {
        config.validate()?;
        let mut guard = self
            .inner
            .write()
            .map_err(|e| BatcherError::Config(e.to_string()))?;
        *guard = config;
        Ok(())
    }
}

impl ConfigSource for SharedConfig {
    fn sealing_config(&self) -> Result<SealingConfig, BatcherError> {
        self.inner
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|e| BatcherError::Config(e.to_string()))
    }
}

//! # Relayer Configuration
//!
//! Tuning for the sync engines, the contract call path and the scheduler.
//! Loaded from TOML; every section and field falls back to its default.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    DEFAULT_BTC_BATCH_SIZE, DEFAULT_CONSENSUS_BATCH_SIZE, DEFAULT_MAX_INTERVAL,
    DEFAULT_MAX_WALK_BACK, DEFAULT_PADDING_BLOCK_SIZE, MIN_PADDING_SIZE,
};

/// Overrides `scheduler.cycle_delay_ms`.
pub const ENV_CYCLE_DELAY_MS: &str = "RELAYER_CYCLE_DELAY_MS";

/// Overrides `contract.call_timeout_ms`.
pub const ENV_CALL_TIMEOUT_MS: &str = "RELAYER_CALL_TIMEOUT_MS";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("Failed to read config {path}: {error}")]
    Io {
        /// Path of the file
        path: String,
        /// Underlying error message
        error: String,
    },

    /// TOML could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Bitcoin header sync settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BtcSyncConfig {
    /// Headers per `submit_headers` call.
    pub batch_size: usize,
    /// Walk-back bound before a fork is declared unresolved.
    pub max_walk_back: u64,
    /// Multiplier applied to the previous submission's gas usage.
    pub gas_margin: f64,
    /// Fixed gas per batch; takes precedence over the estimate.
    pub gas_limit: Option<u64>,
}

impl Default for BtcSyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BTC_BATCH_SIZE,
            max_walk_back: DEFAULT_MAX_WALK_BACK,
            gas_margin: 1.2,
            gas_limit: None,
        }
    }
}

/// Consensus light-block sync settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsensusSyncConfig {
    /// Largest height gap the light client tolerates between updates.
    pub max_interval: u64,
    /// Light blocks per flushed batch (batched engine).
    pub batch_size: usize,
}

impl Default for ConsensusSyncConfig {
    fn default() -> Self {
        Self {
            max_interval: DEFAULT_MAX_INTERVAL,
            batch_size: DEFAULT_CONSENSUS_BATCH_SIZE,
        }
    }
}

/// Contract call path settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContractCallConfig {
    /// Padding block size in bytes.
    pub block_size: usize,
    /// Smallest gap worth padding.
    pub min_padding_size: usize,
    /// Deadline for any single RPC or contract call.
    pub call_timeout_ms: u64,
    /// Total attempts for a read-only query.
    pub query_max_attempts: u32,
    /// Base of the quadratic query backoff.
    pub query_backoff_base_ms: u64,
}

impl Default for ContractCallConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_PADDING_BLOCK_SIZE,
            min_padding_size: MIN_PADDING_SIZE,
            call_timeout_ms: 30_000,
            query_max_attempts: 5,
            query_backoff_base_ms: 500,
        }
    }
}

impl ContractCallConfig {
    /// Call deadline as a [`Duration`].
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Scheduler settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause between the end of one cycle and the start of the next.
    pub cycle_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_delay_ms: 10_000,
        }
    }
}

impl SchedulerConfig {
    /// Cycle delay as a [`Duration`].
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
}

/// Relayer configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayerConfig {
    /// Bitcoin header sync.
    pub btc: BtcSyncConfig,
    /// Consensus light-block sync.
    pub consensus: ConsensusSyncConfig,
    /// Contract call path.
    pub contract: ContractCallConfig,
    /// Scheduler.
    pub scheduler: SchedulerConfig,
}

impl RelayerConfig {
    /// Create a config for testing (small batches, short timeouts).
    pub fn for_testing() -> Self {
        Self {
            btc: BtcSyncConfig {
                batch_size: 3,
                max_walk_back: 50,
                ..Default::default()
            },
            consensus: ConsensusSyncConfig {
                max_interval: 5,
                batch_size: 2,
            },
            contract: ContractCallConfig {
                call_timeout_ms: 1_000,
                query_max_attempts: 3,
                query_backoff_base_ms: 10,
                ..Default::default()
            },
            scheduler: SchedulerConfig {
                cycle_delay_ms: 100,
            },
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Reject values the engines cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.btc.batch_size == 0 {
            return Err(ConfigError::Invalid("btc.batch_size must be > 0".into()));
        }
        if self.btc.gas_margin < 1.0 {
            return Err(ConfigError::Invalid("btc.gas_margin must be >= 1.0".into()));
        }
        if self.consensus.batch_size == 0 {
            return Err(ConfigError::Invalid("consensus.batch_size must be > 0".into()));
        }
        if self.consensus.max_interval == 0 {
            return Err(ConfigError::Invalid("consensus.max_interval must be > 0".into()));
        }
        if self.contract.block_size == 0 {
            return Err(ConfigError::Invalid("contract.block_size must be > 0".into()));
        }
        if self.contract.min_padding_size >= self.contract.block_size {
            return Err(ConfigError::Invalid(format!(
                "contract.min_padding_size ({}) must be below block_size ({})",
                self.contract.min_padding_size, self.contract.block_size
            )));
        }
        Ok(())
    }

    /// Apply `RELAYER_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CYCLE_DELAY_MS) {
            self.scheduler.cycle_delay_ms = parse_ms(ENV_CYCLE_DELAY_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_CALL_TIMEOUT_MS) {
            self.contract.call_timeout_ms = parse_ms(ENV_CALL_TIMEOUT_MS, &value)?;
        }
        Ok(())
    }
}

fn parse_ms(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}={value} is not a millisecond count")))
}

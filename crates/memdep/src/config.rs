//! Configuration for the memory dependence unit.
//!
//! This module defines the structures used to parameterize the unit. It provides:
//! 1. **Defaults:** Baseline store-set table sizes, clear period, and trace directory.
//! 2. **Structures:** `StoreSetConfig`, `OracleConfig`, and the root `MemDepConfig`.
//! 3. **Enums:** The oracle operating mode.
//!
//! Configuration is read once at construction. The host supplies it as JSON or builds
//! it directly; nothing is read from the environment.

use std::path::PathBuf;

use serde::Deserialize;

use crate::common::error::{MemDepError, Result};

/// Default configuration constants.
mod defaults {
    /// Load/store operations predicted between store-set table wipes.
    pub const CLEAR_PERIOD: u64 = 62_464;

    /// Store Set ID Table entries. Must be a power of two.
    pub const SSIT_SIZE: usize = 1024;

    /// Last Fetched Store Table entries.
    pub const LFST_SIZE: usize = 1024;

    /// Branch outcomes folded into the SSIT index (0 disables folding).
    pub const BRANCH_HISTORY_LENGTH: u32 = 0;

    /// Directory holding trace shards.
    pub const TRACE_DIR: &str = "m5out";

    /// Buffered trace records before a flush to disk.
    pub const FLUSH_THRESHOLD: usize = 1_000_000;
}

/// Largest supported branch history length (bits in the folded history word).
pub const MAX_BRANCH_HISTORY_LENGTH: u32 = 64;

/// Dependency oracle operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum OracleMode {
    /// No recording or replay.
    #[default]
    Disabled,
    /// Record ground-truth dependencies from committed instructions.
    Trace,
    /// Replay recorded dependencies and write refinement edges for confirmed violations.
    Refine,
    /// Reserved; behaves like `Disabled`.
    Run,
    /// Replay recorded dependencies and write barrier records for confirmed violations.
    Barrier,
}

impl OracleMode {
    /// Returns true for modes that load previously written shards.
    pub const fn replays(self) -> bool {
        matches!(self, Self::Refine | Self::Barrier)
    }

    /// Returns true for modes that write trace output.
    pub const fn writes(self) -> bool {
        matches!(self, Self::Trace | Self::Refine | Self::Barrier)
    }
}

/// Root configuration for the memory dependence unit.
///
/// # Examples
///
/// ```
/// use memdep_core::config::{MemDepConfig, OracleMode};
///
/// let config = MemDepConfig::from_json(r#"{
///     "store_set": { "ssit_size": 2048, "branch_history_length": 4 },
///     "oracle": { "mode": "Refine", "trace_dir": "traces/run1" }
/// }"#).unwrap();
/// assert_eq!(config.store_set.ssit_size, 2048);
/// assert_eq!(config.store_set.lfst_size, 1024);
/// assert_eq!(config.oracle.mode, OracleMode::Refine);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemDepConfig {
    /// Store-set predictor parameters
    #[serde(default)]
    pub store_set: StoreSetConfig,
    /// Dependency oracle parameters
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Commits between progress reports (`None` disables the heartbeat)
    #[serde(default)]
    pub heartbeat_interval: Option<u64>,
}

impl MemDepConfig {
    /// Deserializes and validates a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every parameter can be used to build the unit.
    pub fn validate(&self) -> Result<()> {
        self.store_set.validate()?;
        if self.oracle.flush_threshold == 0 {
            return Err(MemDepError::InvalidConfig(
                "oracle flush_threshold must be non-zero".into(),
            ));
        }
        if self.heartbeat_interval == Some(0) {
            return Err(MemDepError::InvalidConfig(
                "heartbeat_interval must be non-zero when set".into(),
            ));
        }
        Ok(())
    }
}

/// Store-set predictor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSetConfig {
    /// Predicted operations between full table wipes
    #[serde(default = "StoreSetConfig::default_clear_period")]
    pub clear_period: u64,

    /// Store Set ID Table entries (power of two)
    #[serde(default = "StoreSetConfig::default_ssit_size")]
    pub ssit_size: usize,

    /// Last Fetched Store Table entries
    #[serde(default = "StoreSetConfig::default_lfst_size")]
    pub lfst_size: usize,

    /// Branch outcomes folded into the SSIT index
    #[serde(default = "StoreSetConfig::default_branch_history_length")]
    pub branch_history_length: u32,
}

impl StoreSetConfig {
    /// Returns the default clear period.
    fn default_clear_period() -> u64 {
        defaults::CLEAR_PERIOD
    }

    /// Returns the default SSIT size.
    fn default_ssit_size() -> usize {
        defaults::SSIT_SIZE
    }

    /// Returns the default LFST size.
    fn default_lfst_size() -> usize {
        defaults::LFST_SIZE
    }

    /// Returns the default branch history length.
    fn default_branch_history_length() -> u32 {
        defaults::BRANCH_HISTORY_LENGTH
    }

    /// Checks table sizes and history length.
    pub fn validate(&self) -> Result<()> {
        if !self.ssit_size.is_power_of_two() {
            return Err(MemDepError::InvalidConfig(format!(
                "SSIT size {} must be a power of two",
                self.ssit_size
            )));
        }
        if self.lfst_size == 0 {
            return Err(MemDepError::InvalidConfig(
                "LFST size must be non-zero".into(),
            ));
        }
        if self.clear_period == 0 {
            return Err(MemDepError::InvalidConfig(
                "store set clear period must be non-zero".into(),
            ));
        }
        if self.branch_history_length > MAX_BRANCH_HISTORY_LENGTH {
            return Err(MemDepError::InvalidConfig(format!(
                "branch history length {} exceeds {MAX_BRANCH_HISTORY_LENGTH}",
                self.branch_history_length
            )));
        }
        Ok(())
    }
}

impl Default for StoreSetConfig {
    fn default() -> Self {
        Self {
            clear_period: defaults::CLEAR_PERIOD,
            ssit_size: defaults::SSIT_SIZE,
            lfst_size: defaults::LFST_SIZE,
            branch_history_length: defaults::BRANCH_HISTORY_LENGTH,
        }
    }
}

/// Dependency oracle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Operating mode
    #[serde(default)]
    pub mode: OracleMode,

    /// Directory holding `mini_trace_<n>` and `full_trace` shards
    #[serde(default = "OracleConfig::default_trace_dir")]
    pub trace_dir: PathBuf,

    /// Buffered records before flushing to the shard
    #[serde(default = "OracleConfig::default_flush_threshold")]
    pub flush_threshold: usize,
}

impl OracleConfig {
    /// Returns the default trace directory.
    fn default_trace_dir() -> PathBuf {
        PathBuf::from(defaults::TRACE_DIR)
    }

    /// Returns the default flush threshold.
    fn default_flush_threshold() -> usize {
        defaults::FLUSH_THRESHOLD
    }

    /// Creates a configuration for `mode` writing to `trace_dir`.
    pub fn new(mode: OracleMode, trace_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            trace_dir: trace_dir.into(),
            flush_threshold: defaults::FLUSH_THRESHOLD,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self::new(OracleMode::default(), defaults::TRACE_DIR)
    }
}

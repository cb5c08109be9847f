//! Configuration management for the UTXO sieve.
//!
//! Settings are stored in TOML. Every field has a default, so an empty file
//! (or no file at all, via [`ensure_config_exists`]) yields a working setup.
//!
//! ```toml
//! [selection]
//! dust_threshold = 546
//! default_strategy = "knapsack"
//! seed = 7
//!
//! [source]
//! fixture_dir = "fixtures"
//! default_fixture = "default.json"
//!
//! [service]
//! fetch_timeout_ms = 2000
//! preload_addresses = ["bcrt1qtest1"]
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::logging::LogConfig;
use crate::utxo_selection::types::SelectionStrategy;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub logging: LogConfig,
}

/// Selection engine tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Outputs below this value (sats) are never selected
    #[serde(default = "default_dust_threshold")]
    pub dust_threshold: u64,

    /// Fee rate used when a request does not carry one
    #[serde(default = "default_fee_rate")]
    pub default_fee_rate: u64,

    /// Strategy tag used when a request does not carry one
    #[serde(default = "default_strategy")]
    pub default_strategy: String,

    /// Knapsack explores sums up to `target * factor + fee(all inputs)`
    #[serde(default = "default_knapsack_ceiling_factor")]
    pub knapsack_ceiling_factor: u64,

    /// Maximum number of distinct sums knapsack may track
    #[serde(default = "default_knapsack_max_states")]
    pub knapsack_max_states: usize,

    /// Maximum number of nodes branch-and-bound may visit
    #[serde(default = "default_bnb_max_nodes")]
    pub bnb_max_nodes: usize,

    /// Candidate count above which branch-and-bound hands over to the genetic search
    #[serde(default = "default_large_set_threshold")]
    pub large_set_threshold: usize,

    /// Maximum number of ascending picks made by consolidation
    #[serde(default = "default_consolidation_max_inputs")]
    pub consolidation_max_inputs: usize,

    /// Maximum number of equally good subsets privacy chooses among
    #[serde(default = "default_privacy_max_ties")]
    pub privacy_max_ties: usize,

    #[serde(default = "default_genetic_population")]
    pub genetic_population: usize,

    #[serde(default = "default_genetic_generations")]
    pub genetic_generations: usize,

    /// Seed for the randomized strategies when a request carries none
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            dust_threshold: default_dust_threshold(),
            default_fee_rate: default_fee_rate(),
            default_strategy: default_strategy(),
            knapsack_ceiling_factor: default_knapsack_ceiling_factor(),
            knapsack_max_states: default_knapsack_max_states(),
            bnb_max_nodes: default_bnb_max_nodes(),
            large_set_threshold: default_large_set_threshold(),
            consolidation_max_inputs: default_consolidation_max_inputs(),
            privacy_max_ties: default_privacy_max_ties(),
            genetic_population: default_genetic_population(),
            genetic_generations: default_genetic_generations(),
            seed: None,
        }
    }
}

impl SelectionConfig {
    /// Parsed default strategy
    pub fn strategy(&self) -> Result<SelectionStrategy> {
        self.default_strategy
            .parse()
            .map_err(|e| anyhow!("Invalid default strategy: {}", e))
    }
}

/// Where UTXO data comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory holding `<address>.json` fixture files
    #[serde(default = "default_fixture_dir")]
    pub fixture_dir: String,

    /// File (relative to `fixture_dir`) used for addresses without their own file
    #[serde(default)]
    pub default_fixture: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            fixture_dir: default_fixture_dir(),
            default_fixture: None,
        }
    }
}

/// Service facade settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Upper bound on one source fetch
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Addresses loaded at start-up
    #[serde(default)]
    pub preload_addresses: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            preload_addresses: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| anyhow!("Failed to read config file: {}", e))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| anyhow!("Failed to parse config file: {}", e))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        fs::write(path, content).map_err(|e| anyhow!("Failed to write config file: {}", e))?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let selection = &self.selection;

        if selection.knapsack_ceiling_factor == 0 {
            return Err(anyhow!("Invalid knapsack ceiling factor: must be greater than 0"));
        }

        if selection.knapsack_max_states == 0 {
            return Err(anyhow!("Invalid knapsack state budget: must be greater than 0"));
        }

        if selection.bnb_max_nodes == 0 {
            return Err(anyhow!("Invalid branch-and-bound node budget: must be greater than 0"));
        }

        if selection.consolidation_max_inputs == 0 {
            return Err(anyhow!("Invalid consolidation input cap: must be greater than 0"));
        }

        if selection.privacy_max_ties == 0 {
            return Err(anyhow!("Invalid privacy tie cap: must be greater than 0"));
        }

        if selection.genetic_population < 2 {
            return Err(anyhow!("Invalid genetic population: must be at least 2"));
        }

        if selection.genetic_generations == 0 {
            return Err(anyhow!("Invalid genetic generation budget: must be greater than 0"));
        }

        selection.strategy()?;

        if self.service.fetch_timeout_ms == 0 {
            return Err(anyhow!("Invalid fetch timeout: must be greater than 0"));
        }

        Ok(())
    }
}

// Default value functions
fn default_dust_threshold() -> u64 {
    crate::DUST_THRESHOLD
}

fn default_fee_rate() -> u64 {
    1
}

fn default_strategy() -> String {
    "default".to_string()
}

fn default_knapsack_ceiling_factor() -> u64 {
    2
}

fn default_knapsack_max_states() -> usize {
    50_000
}

fn default_bnb_max_nodes() -> usize {
    100_000
}

fn default_large_set_threshold() -> usize {
    64
}

fn default_consolidation_max_inputs() -> usize {
    50
}

fn default_privacy_max_ties() -> usize {
    32
}

fn default_genetic_population() -> usize {
    40
}

fn default_genetic_generations() -> usize {
    120
}

fn default_fixture_dir() -> String {
    "fixtures".to_string()
}

fn default_fetch_timeout_ms() -> u64 {
    5_000
}

/// Ensures the config file exists, creating default if needed
pub fn ensure_config_exists(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    } else {
        let config = Config::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

//! UTXO Sieve Common Library
//!
//! Address-indexed UTXO store, read-through snapshot cache and coin
//! selection engine shared by the `sieve` service and its tools.
//!
//! # Modules
//!
//! - `utxo_selection`: data model, selection strategies and the selector
//! - `utxo_store`: concurrent per-address UTXO index
//! - `utxo_cache`: generation-checked snapshot cache in front of the store
//! - `utxo_source`: where UTXO data comes from (fixtures, files)
//! - `fee_model`: transaction size and fee estimation
//! - `events`: event bus for store, cache and selection events
//! - `config`: TOML configuration
//! - `logging`: logging setup and context-tagged helpers
//! - `error`: error types
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use bitcoin::Amount;
//! use sieve_common::utxo_source::StaticSource;
//! use sieve_common::{CachedUtxoStore, SelectionRequest, UtxoSelector, UtxoStore};
//!
//! let store = Arc::new(UtxoStore::new(Arc::new(StaticSource::new())));
//! let cache = CachedUtxoStore::new(store);
//! let selector = UtxoSelector::default();
//!
//! let request = SelectionRequest::new("bcrt1qempty", Amount::from_sat(1_000), 1);
//! assert!(selector.select_from(&cache, &request).is_err());
//! ```

/// Configuration management
pub mod config;

/// Error types
pub mod error;

/// UTXO event bus
pub mod events;

/// Transaction size and fee model
pub mod fee_model;

/// Logging setup and helpers
pub mod logging;

/// Snapshot cache
pub mod utxo_cache;

/// UTXO selection algorithms and utilities
pub mod utxo_selection;

/// UTXO data sources
pub mod utxo_source;

/// Per-address UTXO index
pub mod utxo_store;

pub use config::Config;
pub use error::{SelectionError, SieveError, SieveResult, SourceError};
pub use events::{UtxoEvent, UtxoEventBus};
pub use utxo_cache::{CacheStats, CachedUtxoStore};
pub use utxo_selection::selector::UtxoSelector;
pub use utxo_selection::types::{
    SelectionRequest, SelectionResult, SelectionStrategy, Utxo, UtxoSet,
};
pub use utxo_source::{FallbackSource, FileSource, StaticSource, UtxoSource};
pub use utxo_store::{AddressStats, AddressSummary, RefreshOutcome, StoreSummary, UtxoStore};

pub use bitcoin::{Amount, OutPoint, Txid};

/// Default dust threshold in satoshis
pub const DUST_THRESHOLD: u64 = 546;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::sync::OnceLock;

static INIT_RESULT: OnceLock<Result<(), String>> = OnceLock::new();

/// Library initialization
///
/// Initializes logging with the default configuration. Safe to call any
/// number of times from any thread; later calls return the first result.
pub fn init() -> Result<(), String> {
    INIT_RESULT
        .get_or_init(|| {
            let config = logging::LogConfig::default();
            logging::init(&config).map_err(|e| format!("Failed to initialize logging: {}", e))
        })
        .clone()
}

/// Parsing and formatting helpers for user-supplied Bitcoin values
pub mod bitcoin_utils {
    use crate::error::{SieveError, SieveResult};
    use bitcoin::{Amount, Denomination, OutPoint, Txid};
    use std::str::FromStr;

    /// Validate if a string is a valid transaction ID
    pub fn is_valid_txid(txid: &str) -> bool {
        Txid::from_str(txid).is_ok()
    }

    /// Parse `txid:vout`
    pub fn parse_outpoint(s: &str) -> SieveResult<OutPoint> {
        OutPoint::from_str(s.trim()).map_err(|e| SieveError::Serialization {
            context: format!("Invalid outpoint '{}': expected txid:vout", s),
            source: Some(Box::new(e)),
        })
    }

    /// Format an amount with appropriate units (BTC or sats)
    pub fn format_bitcoin_amount(amount: Amount, as_btc: bool) -> String {
        if as_btc {
            format!("{} BTC", amount.to_string_in(Denomination::Bitcoin))
        } else {
            format!("{} sats", amount.to_sat())
        }
    }

    /// Parse an amount from user input
    ///
    /// Plain integers and `N sat(s)` are satoshis; `X btc` is bitcoin.
    pub fn parse_bitcoin_amount(s: &str) -> SieveResult<Amount> {
        let s = s.trim().to_lowercase();
        let invalid = |reason: String| SieveError::Serialization {
            context: reason,
            source: None,
        };

        if s.is_empty() {
            return Err(invalid("Empty amount string".to_string()));
        }

        if let Some(btc) = s.strip_suffix("btc") {
            return Amount::from_str_in(btc.trim(), Denomination::Bitcoin)
                .map_err(|e| invalid(format!("Invalid BTC value '{}': {}", btc.trim(), e)));
        }

        let sats = s
            .strip_suffix("sats")
            .or_else(|| s.strip_suffix("sat"))
            .unwrap_or(&s)
            .trim();
        sats.parse::<u64>()
            .map(Amount::from_sat)
            .map_err(|_| invalid(format!("Invalid satoshi value: {}", sats)))
    }

}

//! Error types for the UTXO sieve
//!
//! Three layers of errors live here:
//!
//! - [`SelectionError`]: the outcome kinds a caller of the store or the
//!   selection engine must handle.
//! - [`SourceError`]: failures of a [`UtxoSource`](crate::utxo_source::UtxoSource)
//!   fetch, converted into [`SelectionError::SourceUnavailable`] at the store boundary.
//! - [`SieveError`]: the crate-wide error that wraps both together with I/O
//!   and (de)serialization failures, with an [`ErrorContext`] extension trait.
//!
//! # Usage
//!
//! ```
//! use sieve_common::error::{ErrorContext, SieveError};
//!
//! fn read_fixture(path: &str) -> Result<String, SieveError> {
//!     let content = std::fs::read_to_string(path)
//!         .map_err(SieveError::from)
//!         .context("Failed to read fixture")?;
//!     Ok(content)
//! }
//! ```

use bitcoin::Amount;
use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Outcome kinds of store and selection operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// The spendable candidates cannot cover the target plus fee
    #[error(
        "Insufficient funds: required {} sat, available {} sat, short {} sat",
        .required.to_sat(), .available.to_sat(), .shortage.to_sat()
    )]
    InsufficientFunds {
        /// Target plus the estimated fee
        required: Amount,
        /// Total value of the usable candidates
        available: Amount,
        /// `required - available`
        shortage: Amount,
    },

    /// The address has no records at all
    #[error("Address not found: {0}")]
    AddressNotFound(String),

    /// The strategy tag is not recognised
    #[error("Invalid strategy: {0}")]
    InvalidStrategy(String),

    /// The requested amount is not a payable value
    #[error("Invalid target amount: {0}")]
    InvalidTarget(String),

    /// The source of truth could not be reached for an unloaded address
    #[error("Source unavailable for {address}: {reason}")]
    SourceUnavailable {
        /// Address whose fetch failed
        address: String,
        /// Human-readable failure description
        reason: String,
    },

    /// A bounded search ran out of budget before completing
    #[error("Search budget exceeded in {strategy} after {explored} steps")]
    SearchBudgetExceeded {
        /// Strategy whose budget ran out
        strategy: &'static str,
        /// Work units spent
        explored: usize,
    },
}

impl SelectionError {
    /// Builds an `InsufficientFunds` error, computing the shortage
    pub fn insufficient_funds(required: Amount, available: Amount) -> Self {
        let shortage = Amount::from_sat(required.to_sat().saturating_sub(available.to_sat()));
        SelectionError::InsufficientFunds {
            required,
            available,
            shortage,
        }
    }

    /// Whether retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SelectionError::SourceUnavailable { .. })
    }

    /// Short machine-readable kind, used in events and logs
    pub fn kind(&self) -> &'static str {
        match self {
            SelectionError::InsufficientFunds { .. } => "insufficient_funds",
            SelectionError::AddressNotFound(_) => "address_not_found",
            SelectionError::InvalidStrategy(_) => "invalid_strategy",
            SelectionError::InvalidTarget(_) => "invalid_target",
            SelectionError::SourceUnavailable { .. } => "source_unavailable",
            SelectionError::SearchBudgetExceeded { .. } => "search_budget_exceeded",
        }
    }
}

/// Failures reported by a UTXO source
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading a fixture or cache file failed
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The source returned data that does not describe valid outputs
    #[error("Malformed UTXO data for {address}: {reason}")]
    Parse { address: String, reason: String },

    /// The source cannot serve requests at all
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// The fetch did not complete in time
    #[error("Fetch timed out after {0} ms")]
    Timeout(u64),
}

impl SourceError {
    /// Converts the failure into the store-level error for `address`
    pub fn into_selection_error(self, address: &str) -> SelectionError {
        SelectionError::SourceUnavailable {
            address: address.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum SieveError {
    /// Store or selection outcome
    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    /// UTXO source failure
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration errors
    #[error("Configuration error: {context}")]
    Config {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// I/O errors
    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Unexpected errors that don't fit other categories
    #[error("Unexpected error: {context}")]
    Unexpected {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

/// Extension trait for adding context to error results
pub trait ErrorContext<T> {
    /// Replace the error's context string, keeping its source
    fn context(self, context: impl Into<String>) -> Result<T, SieveError>;
}

impl<T> ErrorContext<T> for Result<T, SieveError> {
    fn context(self, context: impl Into<String>) -> Result<T, SieveError> {
        self.map_err(|err| match err {
            SieveError::Config { source, .. } => SieveError::Config {
                context: context.into(),
                source,
            },
            SieveError::Io { source, .. } => SieveError::Io {
                context: context.into(),
                source,
            },
            SieveError::Serialization { source, .. } => SieveError::Serialization {
                context: context.into(),
                source,
            },
            SieveError::Unexpected { source, .. } => SieveError::Unexpected {
                context: context.into(),
                source,
            },
            other => SieveError::Unexpected {
                context: context.into(),
                source: Some(Box::new(other)),
            },
        })
    }
}

impl From<io::Error> for SieveError {
    fn from(err: io::Error) -> Self {
        SieveError::Io {
            context: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for SieveError {
    fn from(err: serde_json::Error) -> Self {
        SieveError::Serialization {
            context: format!("JSON serialization error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<toml::de::Error> for SieveError {
    fn from(err: toml::de::Error) -> Self {
        SieveError::Serialization {
            context: format!("TOML deserialization error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

impl From<toml::ser::Error> for SieveError {
    fn from(err: toml::ser::Error) -> Self {
        SieveError::Serialization {
            context: format!("TOML serialization error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

/// Create a new configuration error with context
pub fn config_error<S: Into<String>>(context: S) -> SieveError {
    SieveError::Config {
        context: context.into(),
        source: None,
    }
}

/// Type alias for a Result with SieveError
pub type SieveResult<T> = Result<T, SieveError>;

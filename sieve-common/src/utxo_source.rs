//! Sources of truth for UTXO data
//!
//! The store calls a [`UtxoSource`] the first time an address is requested
//! and again on refresh. Three implementations are provided:
//!
//! - [`StaticSource`]: in-memory records, for tests and demos
//! - [`FileSource`]: Esplora-format JSON files, one per address, with an
//!   optional default file for addresses that have none
//! - [`FallbackSource`]: tries a primary source, then a secondary one
//!
//! The Esplora format is the array returned by `GET /address/:address/utxo`:
//!
//! ```json
//! [{"txid": "…", "vout": 0, "value": 100000,
//!   "status": {"confirmed": true, "block_height": 101, "block_hash": "…", "block_time": 1700000000}}]
//! ```

use crate::error::SourceError;
use crate::logging::{log_source, sanitize_for_logging, LogLevel};
use crate::utxo_selection::types::Utxo;
use bitcoin::{Amount, OutPoint, Txid};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Something that can report the outputs of an address
pub trait UtxoSource: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Fetch every known output of `address`
    ///
    /// An address the source knows nothing about yields an empty vector;
    /// errors mean the source itself could not answer.
    fn fetch_utxos(&self, address: &str) -> Result<Vec<Utxo>, SourceError>;
}

/// Confirmation status block of an Esplora UTXO entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EsploraStatus {
    #[serde(default)]
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u32>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub block_time: Option<u64>,
}

/// One entry of an Esplora UTXO listing
#[derive(Debug, Clone, Deserialize)]
pub struct EsploraUtxo {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    #[serde(default)]
    pub status: EsploraStatus,
}

impl EsploraUtxo {
    /// Convert into an unspent record owned by `address`
    pub fn into_utxo(self, address: &str) -> Result<Utxo, SourceError> {
        let txid = Txid::from_str(&self.txid).map_err(|e| SourceError::Parse {
            address: address.to_string(),
            reason: format!("invalid txid {}: {}", self.txid, e),
        })?;

        if self.value > Amount::MAX_MONEY.to_sat() {
            return Err(SourceError::Parse {
                address: address.to_string(),
                reason: format!("value {} sat exceeds the money supply", self.value),
            });
        }

        let height = if self.status.confirmed {
            self.status.block_height.unwrap_or(0)
        } else {
            0
        };

        Ok(Utxo::new(
            OutPoint::new(txid, self.vout),
            address,
            Amount::from_sat(self.value),
            height,
        ))
    }
}

/// Parse an Esplora UTXO listing, attributing every entry to `address`
pub fn parse_esplora(address: &str, data: &str) -> Result<Vec<Utxo>, SourceError> {
    let entries: Vec<EsploraUtxo> =
        serde_json::from_str(data).map_err(|e| SourceError::Parse {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

    entries
        .into_iter()
        .map(|entry| entry.into_utxo(address))
        .collect()
}

/// In-memory source
///
/// Records can be replaced at runtime, which makes refresh behaviour testable.
#[derive(Default)]
pub struct StaticSource {
    records: RwLock<HashMap<String, Vec<Utxo>>>,
}

impl StaticSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_address(self, address: &str, utxos: Vec<Utxo>) -> Self {
        self.set(address, utxos);
        self
    }

    /// Replace the records reported for `address`
    pub fn set(&self, address: &str, utxos: Vec<Utxo>) {
        self.records.write().insert(address.to_string(), utxos);
    }
}

impl UtxoSource for StaticSource {
    fn name(&self) -> &'static str {
        "static"
    }

    fn fetch_utxos(&self, address: &str) -> Result<Vec<Utxo>, SourceError> {
        Ok(self
            .records
            .read()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}

/// Reads Esplora-format JSON files from a directory
///
/// Lookup order for an address: an explicit mapping, then `<address>.json`,
/// then the default file. Addresses with no file at all have no outputs.
pub struct FileSource {
    dir: PathBuf,
    default_file: Option<PathBuf>,
    mapping: HashMap<String, PathBuf>,
}

impl FileSource {
    /// Create a source over `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            default_file: None,
            mapping: HashMap::new(),
        }
    }

    /// Use `file` (relative to the directory) for addresses without their own file
    pub fn with_default_file(mut self, file: impl AsRef<Path>) -> Self {
        self.default_file = Some(self.dir.join(file));
        self
    }

    /// Read `address` from a specific file (relative to the directory)
    pub fn with_mapping(mut self, address: &str, file: impl AsRef<Path>) -> Self {
        self.mapping.insert(address.to_string(), self.dir.join(file));
        self
    }

    fn candidates(&self, address: &str) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(3);
        if let Some(path) = self.mapping.get(address) {
            paths.push(path.clone());
        }
        paths.push(self.dir.join(format!("{}.json", address)));
        if let Some(path) = &self.default_file {
            paths.push(path.clone());
        }
        paths
    }
}

/// Addresses name files, so only plain alphanumeric ones are accepted
fn check_file_address(address: &str) -> Result<(), SourceError> {
    if address.is_empty() || !address.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SourceError::Parse {
            address: address.to_string(),
            reason: "address is not alphanumeric".to_string(),
        });
    }
    Ok(())
}

impl UtxoSource for FileSource {
    fn name(&self) -> &'static str {
        "file"
    }

    fn fetch_utxos(&self, address: &str) -> Result<Vec<Utxo>, SourceError> {
        check_file_address(address)?;
        if !self.dir.is_dir() {
            return Err(SourceError::Unavailable(format!(
                "fixture directory {} does not exist",
                self.dir.display()
            )));
        }

        for path in self.candidates(address) {
            match fs::read_to_string(&path) {
                Ok(data) => {
                    let utxos = parse_esplora(address, &data)?;
                    log_source(
                        LogLevel::Debug,
                        "Read fixture",
                        Some(json!({
                            "address": sanitize_for_logging(address),
                            "path": path.display().to_string(),
                            "records": utxos.len(),
                        })),
                    );
                    return Ok(utxos);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(SourceError::Io {
                        path: path.display().to_string(),
                        source: e,
                    })
                }
            }
        }

        log_source(
            LogLevel::Debug,
            "No fixture for address",
            Some(json!({ "address": sanitize_for_logging(address) })),
        );
        Ok(Vec::new())
    }
}

/// Tries `primary`, then `secondary` when the primary fails or knows nothing
pub struct FallbackSource<P, S> {
    primary: P,
    secondary: S,
}

impl<P: UtxoSource, S: UtxoSource> FallbackSource<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P: UtxoSource, S: UtxoSource> UtxoSource for FallbackSource<P, S> {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn fetch_utxos(&self, address: &str) -> Result<Vec<Utxo>, SourceError> {
        match self.primary.fetch_utxos(address) {
            Ok(utxos) if !utxos.is_empty() => Ok(utxos),
            Ok(_) => self.secondary.fetch_utxos(address),
            Err(e) => {
                log_source(
                    LogLevel::Warn,
                    "Primary source failed, trying secondary",
                    Some(json!({
                        "primary": self.primary.name(),
                        "secondary": self.secondary.name(),
                        "error": e.to_string(),
                    })),
                );
                self.secondary.fetch_utxos(address)
            }
        }
    }
}

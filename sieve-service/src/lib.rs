//! Async facade over the UTXO sieve.
//!
//! [`UtxoService`] wires a [`UtxoStore`], its [`CachedUtxoStore`] and a
//! [`UtxoSelector`] together and exposes the operations a request-handling
//! front end needs. Store and engine calls are synchronous, so every call is
//! moved onto tokio's blocking pool. Calls that may reach the source are
//! bounded by `service.fetch_timeout_ms`.

use bitcoin::{Amount, OutPoint, Txid};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::json;
use sieve_common::config::Config;
use sieve_common::logging::{log_service, sanitize_for_logging, LogLevel};
use sieve_common::{
    AddressStats, AddressSummary, CacheStats, CachedUtxoStore, FileSource, RefreshOutcome,
    SelectionError, SelectionRequest, SelectionResult, SelectionStrategy, StoreSummary, Utxo,
    UtxoEventBus, UtxoSelector, UtxoSource, UtxoStore,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The store or the engine rejected the request
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// A source fetch did not finish within the configured bound
    #[error("{operation} timed out after {millis} ms")]
    Timeout { operation: &'static str, millis: u64 },

    /// The blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(String),
}

impl ServiceError {
    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Selection(e) => e.is_retryable(),
            ServiceError::Timeout { .. } => true,
            ServiceError::Join(_) => false,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Balance of one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub address: String,
    /// Unspent value in sats
    pub balance: u64,
}

/// Service-wide counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub version: String,
    pub addresses: Vec<String>,
    pub store: StoreSummary,
    pub cache: CacheStats,
}

/// Store, cache and selector behind one async handle
#[derive(Clone)]
pub struct UtxoService {
    cache: Arc<CachedUtxoStore>,
    selector: Arc<UtxoSelector>,
    event_bus: Arc<UtxoEventBus>,
    config: Arc<Config>,
}

impl UtxoService {
    /// Build a service reading from `source`
    pub fn new(config: Config, source: Arc<dyn UtxoSource>) -> Self {
        let event_bus = Arc::new(UtxoEventBus::new());
        let store = Arc::new(UtxoStore::new(source).with_event_bus(event_bus.clone()));
        let selector =
            UtxoSelector::new(config.selection.clone()).with_event_bus(event_bus.clone());

        Self {
            cache: Arc::new(CachedUtxoStore::new(store)),
            selector: Arc::new(selector),
            event_bus,
            config: Arc::new(config),
        }
    }

    /// Build a service over the fixture directory named in `config`
    ///
    /// Relative fixture directories are resolved against `base_dir`.
    pub fn from_config(config: Config, base_dir: &Path) -> Self {
        let dir = base_dir.join(&config.source.fixture_dir);
        let mut source = FileSource::new(dir);
        if let Some(default_fixture) = &config.source.default_fixture {
            source = source.with_default_file(default_fixture);
        }
        Self::new(config, Arc::new(source))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CachedUtxoStore> {
        &self.cache
    }

    /// Bus carrying store, cache and selection events
    pub fn event_bus(&self) -> &Arc<UtxoEventBus> {
        &self.event_bus
    }

    fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.config.service.fetch_timeout_ms)
    }

    /// Run `f` on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&CachedUtxoStore, &UtxoSelector) -> Result<T, SelectionError> + Send + 'static,
        T: Send + 'static,
    {
        let cache = self.cache.clone();
        let selector = self.selector.clone();
        let result = tokio::task::spawn_blocking(move || f(&cache, &selector))
            .await
            .map_err(|e| ServiceError::Join(e.to_string()))?;
        Ok(result?)
    }

    /// Run `f` on the blocking pool, giving up after the fetch timeout
    ///
    /// The blocking task keeps running after a timeout; a later call for the
    /// same address waits on the in-flight fetch instead of starting another.
    async fn bounded<T, F>(&self, operation: &'static str, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&CachedUtxoStore, &UtxoSelector) -> Result<T, SelectionError> + Send + 'static,
        T: Send + 'static,
    {
        let millis = self.config.service.fetch_timeout_ms;
        match tokio::time::timeout(self.fetch_timeout(), self.blocking(f)).await {
            Ok(result) => result,
            Err(_) => {
                log_service(
                    LogLevel::Warn,
                    "Source fetch timed out",
                    Some(json!({ "operation": operation, "timeout_ms": millis })),
                );
                Err(ServiceError::Timeout { operation, millis })
            }
        }
    }

    /// Unspent outputs of `address` in the order the source reported them
    pub async fn utxos(&self, address: &str) -> ServiceResult<Vec<Utxo>> {
        let address = address.to_string();
        self.bounded("utxos", move |cache, _| {
            cache.snapshot(&address).map(|set| set.as_slice().to_vec())
        })
        .await
    }

    pub async fn balance(&self, address: &str) -> ServiceResult<Balance> {
        let owned = address.to_string();
        let total = self
            .bounded("balance", move |cache, _| cache.total_value(&owned))
            .await?;
        Ok(Balance {
            address: address.to_string(),
            balance: total.to_sat(),
        })
    }

    pub async fn stats(&self, address: &str) -> ServiceResult<AddressStats> {
        let address = address.to_string();
        self.bounded("stats", move |cache, _| cache.store().stats(&address))
            .await
    }

    /// Build a request, filling gaps from the selection defaults
    pub fn request(
        &self,
        address: &str,
        target: Amount,
        fee_rate: Option<u64>,
        strategy: Option<&str>,
    ) -> ServiceResult<SelectionRequest> {
        let selection = &self.config.selection;
        let strategy = match strategy {
            Some(tag) => tag.parse::<SelectionStrategy>()?,
            None => selection
                .default_strategy
                .parse::<SelectionStrategy>()?,
        };
        let mut request = SelectionRequest::new(
            address,
            target,
            fee_rate.unwrap_or(selection.default_fee_rate),
        )
        .with_strategy(strategy);
        request.seed = selection.seed;
        Ok(request)
    }

    /// Select outputs of one address
    ///
    /// Nothing is marked spent; callers spend the result explicitly once the
    /// transaction is broadcast.
    pub async fn select(&self, request: SelectionRequest) -> ServiceResult<SelectionResult> {
        // Warm the cache under the fetch bound, then search without one
        self.ensure_loaded("select", &request.address).await?;

        debug!(
            "Selecting {} for {} with {}",
            request.target.to_sat(),
            sanitize_for_logging(&request.address),
            request.strategy
        );
        self.blocking(move |cache, selector| selector.select_from(cache, &request))
            .await
    }

    /// Select over the union of several addresses
    pub async fn multi_select(
        &self,
        addresses: &[String],
        target: Amount,
        fee_rate: Option<u64>,
        strategy: Option<&str>,
    ) -> ServiceResult<SelectionResult> {
        let template = self.request("", target, fee_rate, strategy)?;

        let owned = addresses.to_vec();
        self.bounded("multi_select", move |cache, _| {
            cache.union_snapshot(&owned).map(|_| ())
        })
        .await?;

        let owned = addresses.to_vec();
        self.blocking(move |cache, selector| {
            selector.select_multi(
                cache,
                &owned,
                template.target,
                template.fee_rate,
                template.strategy,
                template.seed,
            )
        })
        .await
    }

    /// Confirmed/unconfirmed split per address
    pub async fn multi_summary(&self, addresses: &[String]) -> ServiceResult<Vec<AddressSummary>> {
        let owned = addresses.to_vec();
        self.bounded("multi_summary", move |cache, _| {
            owned
                .iter()
                .map(|address| cache.store().address_summary(address))
                .collect()
        })
        .await
    }

    /// Load `address` under the fetch bound if it is not loaded yet
    async fn ensure_loaded(&self, operation: &'static str, address: &str) -> ServiceResult<()> {
        let address = address.to_string();
        self.bounded(operation, move |cache, _| cache.snapshot(&address).map(|_| ()))
            .await
    }

    /// Mark outputs of `address` spent; returns how many transitioned
    ///
    /// An address that was never read is loaded first, so the spend is not
    /// lost when the source later reports the output again.
    pub async fn spend(&self, address: &str, outpoints: Vec<OutPoint>) -> ServiceResult<usize> {
        self.ensure_loaded("spend", address).await?;
        let address = address.to_string();
        self.blocking(move |cache, _| Ok(cache.mark_spent_many(&address, &outpoints)))
            .await
    }

    /// Mark every output of `txid` held by `address` spent
    pub async fn spend_txid(&self, address: &str, txid: Txid) -> ServiceResult<usize> {
        self.ensure_loaded("spend_txid", address).await?;
        let address = address.to_string();
        self.blocking(move |cache, _| Ok(cache.mark_spent_txid(&address, &txid)))
            .await
    }

    /// Re-fetch `address` from the source and merge
    pub async fn refresh(&self, address: &str) -> ServiceResult<RefreshOutcome> {
        let address = address.to_string();
        self.bounded("refresh", move |cache, _| cache.refresh(&address))
            .await
    }

    /// Version, loaded addresses and counters; never fetches
    pub async fn info(&self) -> ServiceResult<ServiceInfo> {
        self.blocking(|cache, _| {
            Ok(ServiceInfo {
                version: sieve_common::VERSION.to_string(),
                addresses: cache.store().addresses(),
                store: cache.store().summary(),
                cache: cache.stats(),
            })
        })
        .await
    }

    /// Load the configured addresses
    ///
    /// Failures are logged and skipped. Returns the number of addresses loaded.
    pub async fn preload(&self) -> usize {
        let addresses = self.config.service.preload_addresses.clone();
        let mut loaded = 0;
        for address in &addresses {
            match self.utxos(address).await {
                Ok(utxos) => {
                    loaded += 1;
                    debug!(
                        "Preloaded {} outputs for {}",
                        utxos.len(),
                        sanitize_for_logging(address)
                    );
                }
                Err(e) => warn!("Failed to preload {}: {}", sanitize_for_logging(address), e),
            }
        }
        info!("Preloaded {}/{} addresses", loaded, addresses.len());
        loaded
    }
}

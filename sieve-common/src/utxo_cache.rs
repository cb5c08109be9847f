//! Read-through snapshot cache in front of the [`UtxoStore`]
//!
//! Entries hold the unspent snapshot of an address together with the store
//! generation it was computed at. A read first asks the store for the
//! current generation and only serves the cached entry if it matches, so a
//! cached read never differs from a fresh store read at the same logical
//! time. Entries are additionally dropped eagerly on refresh and on any
//! mark-spent that changed at least one record.

use crate::error::SelectionError;
use crate::events::UtxoEvent;
use crate::logging::{log_cache, sanitize_for_logging, LogLevel};
use crate::utxo_selection::types::{Utxo, UtxoSet};
use crate::utxo_store::{RefreshOutcome, UtxoStore};
use bitcoin::{Amount, OutPoint, Txid};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
struct CacheEntry {
    generation: u64,
    utxos: Arc<UtxoSet>,
    total_value: Amount,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}

/// Address-keyed snapshot cache
pub struct CachedUtxoStore {
    store: Arc<UtxoStore>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl CachedUtxoStore {
    pub fn new(store: Arc<UtxoStore>) -> Self {
        Self {
            store,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<UtxoStore> {
        &self.store
    }

    fn entry(&self, address: &str) -> Result<CacheEntry, SelectionError> {
        if let Some(generation) = self.store.generation(address) {
            let cached = self
                .entries
                .read()
                .get(address)
                .filter(|entry| entry.generation == generation)
                .cloned();
            if let Some(entry) = cached {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let (utxos, generation) = self.store.snapshot_with_generation(address)?;
        let entry = CacheEntry {
            generation,
            total_value: utxos.total_value(),
            utxos: Arc::new(utxos),
        };

        let mut entries = self.entries.write();
        let keep_existing = entries
            .get(address)
            .map_or(false, |existing| existing.generation > generation);
        if !keep_existing {
            entries.insert(address.to_string(), entry.clone());
        }
        Ok(entry)
    }

    /// Unspent snapshot of `address`
    pub fn snapshot(&self, address: &str) -> Result<Arc<UtxoSet>, SelectionError> {
        self.entry(address).map(|entry| entry.utxos)
    }

    /// Unspent value of `address`
    pub fn total_value(&self, address: &str) -> Result<Amount, SelectionError> {
        self.entry(address).map(|entry| entry.total_value)
    }

    /// Unspent snapshots of several addresses, concatenated in request order
    ///
    /// Outputs appearing under more than one address are kept once.
    pub fn union_snapshot(&self, addresses: &[String]) -> Result<UtxoSet, SelectionError> {
        let mut seen: HashSet<OutPoint> = HashSet::new();
        let mut union: Vec<Utxo> = Vec::new();
        for address in addresses {
            let snapshot = self.snapshot(address)?;
            for utxo in snapshot.iter() {
                if seen.insert(utxo.outpoint) {
                    union.push(utxo.clone());
                }
            }
        }
        Ok(UtxoSet::from(union))
    }

    /// Mark one output spent, invalidating the entry if anything changed
    pub fn mark_spent(&self, address: &str, outpoint: &OutPoint) -> usize {
        self.after_spend(address, self.store.mark_spent(address, outpoint))
    }

    /// Mark several outputs spent
    pub fn mark_spent_many(&self, address: &str, outpoints: &[OutPoint]) -> usize {
        self.after_spend(address, self.store.mark_spent_many(address, outpoints))
    }

    /// Mark every output of `txid` spent
    pub fn mark_spent_txid(&self, address: &str, txid: &Txid) -> usize {
        self.after_spend(address, self.store.mark_spent_txid(address, txid))
    }

    fn after_spend(&self, address: &str, count: usize) -> usize {
        if count > 0 {
            self.invalidate(address, "spent");
        }
        count
    }

    /// Re-fetch `address` and drop its entry
    pub fn refresh(&self, address: &str) -> Result<RefreshOutcome, SelectionError> {
        let outcome = self.store.refresh(address)?;
        self.invalidate(address, "refresh");
        Ok(outcome)
    }

    /// Drop the entry of `address`
    pub fn invalidate(&self, address: &str, reason: &str) {
        let removed = self.entries.write().remove(address).is_some();
        if !removed {
            return;
        }
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        log_cache(
            LogLevel::Debug,
            "Invalidated snapshot",
            Some(json!({
                "address": sanitize_for_logging(address),
                "reason": reason,
            })),
        );
        if let Some(bus) = self.store.event_bus() {
            bus.publish(UtxoEvent::CacheInvalidated {
                address: address.to_string(),
                reason: reason.to_string(),
            });
        }
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.entries.read().len(),
        }
    }
}

//! Address-indexed, concurrency-safe UTXO store
//!
//! # Overview
//!
//! The store keeps every output it has ever ingested for an address, spent
//! or not. Records are created when an address is first requested (the
//! store asks its [`UtxoSource`]), flipped to spent by [`UtxoStore::mark_spent`]
//! or by a [`UtxoStore::refresh`] that no longer sees them, and never deleted.
//!
//! # Locking
//!
//! Each address owns a slot with its own `RwLock`. The outer map lock is held
//! only long enough to find or insert a slot, so work on different addresses
//! never waits on each other. Operations on one address are linearizable:
//! a snapshot either sees a mark-spent completely or not at all.
//!
//! Every mutation of an address bumps its generation counter, which the
//! snapshot cache uses to detect stale entries.

use crate::error::SelectionError;
use crate::events::{OutPointInfo, UtxoEvent, UtxoEventBus};
use crate::logging::{log_store, sanitize_for_logging, LogLevel};
use crate::utxo_selection::types::{Utxo, UtxoSet};
use crate::utxo_source::UtxoSource;
use bitcoin::{Amount, OutPoint, Txid};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Record counts for one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressStats {
    pub address: String,
    pub total_utxos: usize,
    pub unspent_count: usize,
    pub spent_count: usize,
    /// Unspent value in sats
    pub total_value: u64,
}

/// Confirmed/unconfirmed split of one address's unspent value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressSummary {
    pub address: String,
    pub confirmed: u64,
    pub unconfirmed: u64,
    /// Number of unspent outputs
    pub total_utxos: usize,
}

/// Totals over every loaded address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub total_addresses: usize,
    /// Unspent outputs across all addresses
    pub total_utxos: usize,
    /// Unspent value in sats
    pub total_value: u64,
}

/// What a refresh changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshOutcome {
    /// Outputs seen for the first time
    pub added: usize,
    /// Unspent outputs the source no longer reports, now marked spent
    pub vanished: usize,
}

struct AddressState {
    records: Vec<Utxo>,
    index: HashMap<OutPoint, usize>,
    generation: u64,
}

impl AddressState {
    fn from_records(address: &str, fetched: Vec<Utxo>) -> Self {
        let mut state = AddressState {
            records: Vec::with_capacity(fetched.len()),
            index: HashMap::with_capacity(fetched.len()),
            generation: 1,
        };
        for utxo in fetched {
            state.insert(address, utxo);
        }
        state
    }

    fn insert(&mut self, address: &str, mut utxo: Utxo) -> bool {
        if self.index.contains_key(&utxo.outpoint) {
            return false;
        }
        utxo.address = address.to_string();
        self.index.insert(utxo.outpoint, self.records.len());
        self.records.push(utxo);
        true
    }

    fn mark_spent(&mut self, outpoint: &OutPoint) -> bool {
        match self.index.get(outpoint) {
            Some(&i) if !self.records[i].spent => {
                self.records[i].spent = true;
                true
            }
            _ => false,
        }
    }

    fn unspent(&self) -> impl Iterator<Item = &Utxo> {
        self.records.iter().filter(|u| !u.spent)
    }

    fn unspent_value(&self) -> Amount {
        Amount::from_sat(
            self.unspent()
                .fold(0u64, |acc, u| acc.saturating_add(u.value.to_sat())),
        )
    }
}

#[derive(Default)]
struct AddressSlot {
    state: RwLock<Option<AddressState>>,
}

/// Concurrent UTXO store keyed by address
pub struct UtxoStore {
    source: Arc<dyn UtxoSource>,
    slots: RwLock<HashMap<String, Arc<AddressSlot>>>,
    event_bus: Option<Arc<UtxoEventBus>>,
}

impl UtxoStore {
    /// Create a store backed by `source`
    pub fn new(source: Arc<dyn UtxoSource>) -> Self {
        Self {
            source,
            slots: RwLock::new(HashMap::new()),
            event_bus: None,
        }
    }

    /// Publish store events on `event_bus`
    pub fn with_event_bus(mut self, event_bus: Arc<UtxoEventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// The event bus, if one is attached
    pub fn event_bus(&self) -> Option<&Arc<UtxoEventBus>> {
        self.event_bus.as_ref()
    }

    fn publish(&self, event: UtxoEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    fn existing_slot(&self, address: &str) -> Option<Arc<AddressSlot>> {
        self.slots.read().get(address).cloned()
    }

    fn slot(&self, address: &str) -> Arc<AddressSlot> {
        if let Some(slot) = self.existing_slot(address) {
            return slot;
        }
        self.slots
            .write()
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(AddressSlot::default()))
            .clone()
    }

    /// Returns the slot for `address`, fetching from the source on first use
    fn loaded_slot(&self, address: &str) -> Result<Arc<AddressSlot>, SelectionError> {
        let slot = self.slot(address);
        if slot.state.read().is_some() {
            return Ok(slot);
        }

        let loaded = {
            let mut guard = slot.state.write();
            if guard.is_some() {
                None
            } else {
                let fetched = self.source.fetch_utxos(address).map_err(|e| {
                    log_store(
                        LogLevel::Warn,
                        "Fetch failed",
                        Some(json!({
                            "address": sanitize_for_logging(address),
                            "source": self.source.name(),
                            "error": e.to_string(),
                        })),
                    );
                    e.into_selection_error(address)
                })?;

                let state = AddressState::from_records(address, fetched);
                let count = state.records.len();
                let total_value = state.unspent_value().to_sat();
                *guard = Some(state);
                Some((count, total_value))
            }
        };

        if let Some((count, total_value)) = loaded {
            log_store(
                LogLevel::Info,
                "Loaded address",
                Some(json!({
                    "address": sanitize_for_logging(address),
                    "records": count,
                    "total_value": total_value,
                })),
            );
            self.publish(UtxoEvent::Loaded {
                address: address.to_string(),
                count,
                total_value,
            });
        }
        Ok(slot)
    }

    /// Runs `f` against the loaded state of `address`
    fn with_state<R>(
        &self,
        address: &str,
        f: impl FnOnce(&AddressState) -> R,
    ) -> Result<R, SelectionError> {
        let slot = self.loaded_slot(address)?;
        let guard = slot.state.read();
        let result = match guard.as_ref() {
            Some(state) => Ok(f(state)),
            None => Err(SelectionError::AddressNotFound(address.to_string())),
        };
        result
    }

    /// Every record of `address`, spent or not, fetching on first use
    pub fn load_or_fetch(&self, address: &str) -> Result<UtxoSet, SelectionError> {
        self.with_state(address, |state| UtxoSet::from(state.records.clone()))
    }

    /// Point-in-time copy of the unspent records of `address`
    pub fn snapshot(&self, address: &str) -> Result<UtxoSet, SelectionError> {
        self.snapshot_with_generation(address).map(|(set, _)| set)
    }

    /// Unspent records together with the generation they belong to
    pub fn snapshot_with_generation(
        &self,
        address: &str,
    ) -> Result<(UtxoSet, u64), SelectionError> {
        self.with_state(address, |state| {
            let unspent: Vec<Utxo> = state.unspent().cloned().collect();
            (UtxoSet::from(unspent), state.generation)
        })
    }

    /// Current generation of a loaded address
    pub fn generation(&self, address: &str) -> Option<u64> {
        let slot = self.existing_slot(address)?;
        let guard = slot.state.read();
        guard.as_ref().map(|state| state.generation)
    }

    /// Whether `address` has been fetched
    pub fn is_loaded(&self, address: &str) -> bool {
        self.generation(address).is_some()
    }

    /// Mark one output spent
    ///
    /// Idempotent: returns 1 if the record transitioned, 0 if it was already
    /// spent, unknown, or the address was never loaded.
    pub fn mark_spent(&self, address: &str, outpoint: &OutPoint) -> usize {
        self.mark_spent_many(address, std::slice::from_ref(outpoint))
    }

    /// Mark several outputs spent, returning how many transitioned
    pub fn mark_spent_many(&self, address: &str, outpoints: &[OutPoint]) -> usize {
        let Some(slot) = self.existing_slot(address) else {
            return 0;
        };

        let mut transitioned = Vec::new();
        {
            let mut guard = slot.state.write();
            let Some(state) = guard.as_mut() else {
                return 0;
            };
            for outpoint in outpoints {
                if state.mark_spent(outpoint) {
                    transitioned.push(*outpoint);
                }
            }
            if !transitioned.is_empty() {
                state.generation += 1;
            }
        }

        let count = transitioned.len();
        log_store(
            LogLevel::Debug,
            "Marked spent",
            Some(json!({
                "address": sanitize_for_logging(address),
                "requested": outpoints.len(),
                "transitioned": count,
            })),
        );
        if count > 0 {
            self.publish(UtxoEvent::Spent {
                address: address.to_string(),
                outpoints: transitioned.iter().map(OutPointInfo::from).collect(),
                count,
            });
        }
        count
    }

    /// Mark every output of transaction `txid` owned by `address` spent
    pub fn mark_spent_txid(&self, address: &str, txid: &Txid) -> usize {
        let Some(slot) = self.existing_slot(address) else {
            return 0;
        };
        let outpoints: Vec<OutPoint> = {
            let guard = slot.state.read();
            let outpoints = match guard.as_ref() {
                Some(state) => state
                    .records
                    .iter()
                    .filter(|u| &u.outpoint.txid == txid)
                    .map(|u| u.outpoint)
                    .collect(),
                None => Vec::new(),
            };
            outpoints
        };
        self.mark_spent_many(address, &outpoints)
    }

    /// Sum of unspent values of `address`
    pub fn total_value(&self, address: &str) -> Result<Amount, SelectionError> {
        self.with_state(address, AddressState::unspent_value)
    }

    /// Record counts of `address`
    pub fn stats(&self, address: &str) -> Result<AddressStats, SelectionError> {
        self.with_state(address, |state| {
            let unspent_count = state.unspent().count();
            AddressStats {
                address: address.to_string(),
                total_utxos: state.records.len(),
                unspent_count,
                spent_count: state.records.len() - unspent_count,
                total_value: state.unspent_value().to_sat(),
            }
        })
    }

    /// Confirmed/unconfirmed split of the unspent value of `address`
    pub fn address_summary(&self, address: &str) -> Result<AddressSummary, SelectionError> {
        self.with_state(address, |state| {
            let mut summary = AddressSummary {
                address: address.to_string(),
                confirmed: 0,
                unconfirmed: 0,
                total_utxos: 0,
            };
            for utxo in state.unspent() {
                let value = utxo.value.to_sat();
                if utxo.is_confirmed() {
                    summary.confirmed = summary.confirmed.saturating_add(value);
                } else {
                    summary.unconfirmed = summary.unconfirmed.saturating_add(value);
                }
                summary.total_utxos += 1;
            }
            summary
        })
    }

    /// Loaded addresses, sorted
    pub fn addresses(&self) -> Vec<String> {
        let slots: Vec<(String, Arc<AddressSlot>)> = self
            .slots
            .read()
            .iter()
            .map(|(address, slot)| (address.clone(), slot.clone()))
            .collect();
        let mut loaded: Vec<String> = slots
            .into_iter()
            .filter(|(_, slot)| slot.state.read().is_some())
            .map(|(address, _)| address)
            .collect();
        loaded.sort();
        loaded
    }

    /// Totals over every loaded address; never fetches
    pub fn summary(&self) -> StoreSummary {
        let slots: Vec<Arc<AddressSlot>> = self.slots.read().values().cloned().collect();
        let mut summary = StoreSummary {
            total_addresses: 0,
            total_utxos: 0,
            total_value: 0,
        };
        for slot in slots {
            let guard = slot.state.read();
            if let Some(state) = guard.as_ref() {
                summary.total_addresses += 1;
                summary.total_utxos += state.unspent().count();
                summary.total_value = summary
                    .total_value
                    .saturating_add(state.unspent_value().to_sat());
            }
        }
        summary
    }

    /// Re-fetch `address` and merge the result
    ///
    /// Spent records stay spent. New outputs are added. Known unspent outputs
    /// the source no longer reports are marked spent, unless the source reports
    /// nothing at all: an empty answer for an address holding unspent outputs
    /// is logged and changes nothing. The generation is bumped even when
    /// nothing changed.
    pub fn refresh(&self, address: &str) -> Result<RefreshOutcome, SelectionError> {
        let fetched = self
            .source
            .fetch_utxos(address)
            .map_err(|e| e.into_selection_error(address))?;

        let slot = self.slot(address);
        let outcome = {
            let mut guard = slot.state.write();
            match guard.as_mut() {
                None => {
                    let state = AddressState::from_records(address, fetched);
                    let outcome = RefreshOutcome {
                        added: state.records.len(),
                        vanished: 0,
                    };
                    *guard = Some(state);
                    outcome
                }
                Some(state) if fetched.is_empty() && state.unspent().next().is_some() => {
                    log_store(
                        LogLevel::Warn,
                        "Source reported no outputs, keeping loaded records",
                        Some(json!({
                            "address": sanitize_for_logging(address),
                            "unspent": state.unspent().count(),
                        })),
                    );
                    state.generation += 1;
                    RefreshOutcome::default()
                }
                Some(state) => {
                    let mut outcome = RefreshOutcome::default();
                    let mut seen = HashSet::with_capacity(fetched.len());
                    for utxo in fetched {
                        seen.insert(utxo.outpoint);
                        match state.index.get(&utxo.outpoint) {
                            Some(&i) => {
                                state.records[i].confirmation_height = utxo.confirmation_height;
                            }
                            None => {
                                if state.insert(address, utxo) {
                                    outcome.added += 1;
                                }
                            }
                        }
                    }
                    for record in state.records.iter_mut() {
                        if !record.spent && !seen.contains(&record.outpoint) {
                            record.spent = true;
                            outcome.vanished += 1;
                        }
                    }
                    state.generation += 1;
                    outcome
                }
            }
        };

        log_store(
            LogLevel::Info,
            "Refreshed address",
            Some(json!({
                "address": sanitize_for_logging(address),
                "added": outcome.added,
                "vanished": outcome.vanished,
            })),
        );
        self.publish(UtxoEvent::Refreshed {
            address: address.to_string(),
            added: outcome.added,
            vanished: outcome.vanished,
        });
        Ok(outcome)
    }
}

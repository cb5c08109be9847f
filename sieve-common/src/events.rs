//! UTXO event bus
//!
//! Store, cache and selector publish [`UtxoEvent`]s so that collaborators
//! (balance caches, audit trails, UI feeds) can follow state changes without
//! the core depending on them. Subscribers receive events on unbounded
//! crossbeam channels; a dropped receiver is pruned on the next publish.
//!
//! ```
//! use sieve_common::events::{UtxoEvent, UtxoEventBus};
//!
//! let bus = UtxoEventBus::new();
//! let receiver = bus.subscribe("spent");
//! bus.publish(UtxoEvent::Spent { address: "bcrt1qtest1".into(), outpoints: vec![], count: 0 });
//! assert!(receiver.try_recv().is_ok());
//! ```

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Events emitted by the store, the cache and the selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UtxoEvent {
    /// Records for an address were fetched from the source for the first time
    Loaded {
        address: String,
        /// Number of records ingested
        count: usize,
        /// Unspent value after the load
        total_value: u64,
    },
    /// An address was re-fetched and merged
    Refreshed {
        address: String,
        /// Records seen for the first time
        added: usize,
        /// Records marked spent because the source no longer reports them
        vanished: usize,
    },
    /// Records were marked spent
    Spent {
        address: String,
        outpoints: Vec<OutPointInfo>,
        /// Number of records that actually transitioned
        count: usize,
    },
    /// A cached snapshot was dropped
    CacheInvalidated { address: String, reason: String },
    /// A selection succeeded
    Selected {
        utxos: Vec<OutPointInfo>,
        strategy_requested: String,
        strategy_used: String,
        target_amount: u64,
        fee_amount: u64,
        change_amount: u64,
    },
    /// A selection failed
    SelectionFailed {
        reason: String,
        strategy: String,
        target_amount: u64,
        available_amount: u64,
    },
}

impl UtxoEvent {
    /// Subscription key of this event
    pub fn event_type(&self) -> &'static str {
        match self {
            UtxoEvent::Loaded { .. } => "loaded",
            UtxoEvent::Refreshed { .. } => "refreshed",
            UtxoEvent::Spent { .. } => "spent",
            UtxoEvent::CacheInvalidated { .. } => "cache_invalidated",
            UtxoEvent::Selected { .. } => "selected",
            UtxoEvent::SelectionFailed { .. } => "selection_failed",
        }
    }
}

/// Serializable representation of a Bitcoin OutPoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutPointInfo {
    /// Transaction ID as a string
    pub txid: String,
    /// Output index
    pub vout: u32,
}

impl From<&bitcoin::OutPoint> for OutPointInfo {
    fn from(outpoint: &bitcoin::OutPoint) -> Self {
        Self {
            txid: outpoint.txid.to_string(),
            vout: outpoint.vout,
        }
    }
}

/// Fan-out bus for UTXO events
#[derive(Debug, Default)]
pub struct UtxoEventBus {
    subscribers: Mutex<HashMap<String, Vec<Sender<UtxoEvent>>>>,
}

impl UtxoEventBus {
    /// Create a new UTXO event bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all UTXO events
    pub fn subscribe_all(&self) -> Receiver<UtxoEvent> {
        self.subscribe("all")
    }

    /// Subscribe to one kind of UTXO event
    ///
    /// # Arguments
    ///
    /// * `event_type` - One of the keys returned by [`UtxoEvent::event_type`],
    ///                  or "all" for every event
    pub fn subscribe(&self, event_type: &str) -> Receiver<UtxoEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers
            .lock()
            .entry(event_type.to_lowercase())
            .or_insert_with(Vec::new)
            .push(sender);
        receiver
    }

    /// Publish an event to its subscribers and to "all" subscribers
    pub fn publish(&self, event: UtxoEvent) {
        let mut subscribers = self.subscribers.lock();
        for key in [event.event_type(), "all"] {
            if let Some(senders) = subscribers.get_mut(key) {
                senders.retain(|sender| sender.send(event.clone()).is_ok());
            }
        }
    }

    /// Get the number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().values().map(|v| v.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spent_event(count: usize) -> UtxoEvent {
        UtxoEvent::Spent {
            address: "bcrt1qtest1".to_string(),
            outpoints: vec![OutPointInfo {
                txid: "a".repeat(64),
                vout: 0,
            }],
            count,
        }
    }

    #[test]
    fn test_basic_subscribe_publish() {
        let bus = UtxoEventBus::new();
        let spent = bus.subscribe("spent");
        let selected = bus.subscribe("selected");
        let all = bus.subscribe_all();

        bus.publish(spent_event(1));

        assert_eq!(spent.try_recv().unwrap(), spent_event(1));
        assert_eq!(all.try_recv().unwrap(), spent_event(1));
        assert!(selected.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let bus = UtxoEventBus::new();
        let keep = bus.subscribe("SPENT");
        {
            let _dropped = bus.subscribe("spent");
        }
        assert_eq!(bus.subscriber_count(), 2);
        bus.publish(spent_event(0));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_string(&spent_event(2)).unwrap();
        let back: UtxoEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spent_event(2));
    }
}

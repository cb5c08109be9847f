#![allow(dead_code)]

use bitcoin::{Amount, OutPoint, Txid};
use log::LevelFilter;
use sieve_common::utxo_source::StaticSource;
use sieve_common::{CachedUtxoStore, Utxo, UtxoEventBus, UtxoStore};
use std::str::FromStr;
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

pub const ADDRESS: &str = "bcrt1qtest1";

/// Initialize logging for tests
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(LevelFilter::Debug)
            .try_init();
    });
}

/// Txid made of one repeated byte
pub fn txid(tag: u8) -> Txid {
    Txid::from_str(&format!("{:02x}", tag).repeat(32)).unwrap()
}

/// Confirmed output of `ADDRESS`
pub fn utxo(tag: u8, vout: u32, sats: u64) -> Utxo {
    Utxo::new(OutPoint::new(txid(tag), vout), ADDRESS, Amount::from_sat(sats), 100)
}

/// `{A,0,100000}`, `{A,1,50000}`, `{A,2,25000}`
pub fn scenario_set() -> Vec<Utxo> {
    vec![utxo(0xaa, 0, 100_000), utxo(0xaa, 1, 50_000), utxo(0xaa, 2, 25_000)]
}

/// Store and cache over a static source holding `records` for `ADDRESS`
pub fn cached_store(records: Vec<Utxo>) -> (Arc<StaticSource>, CachedUtxoStore, Arc<UtxoEventBus>) {
    let source = Arc::new(StaticSource::new().with_address(ADDRESS, records));
    let bus = Arc::new(UtxoEventBus::new());
    let store = UtxoStore::new(source.clone()).with_event_bus(bus.clone());
    (source, CachedUtxoStore::new(Arc::new(store)), bus)
}

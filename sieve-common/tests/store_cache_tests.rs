mod test_helpers;

use bitcoin::{Amount, OutPoint};
use sieve_common::{UtxoEvent, Utxo};
use std::time::Duration;
use test_helpers::*;

#[test]
fn test_mark_spent_is_idempotent() {
    init_test_logging();
    let (_, cache, _) = cached_store(scenario_set());
    cache.snapshot(ADDRESS).unwrap();

    let outpoint = OutPoint::new(txid(0xaa), 0);
    assert_eq!(cache.mark_spent(ADDRESS, &outpoint), 1);
    assert_eq!(cache.mark_spent(ADDRESS, &outpoint), 0);

    let unknown = OutPoint::new(txid(0x99), 7);
    assert_eq!(cache.mark_spent(ADDRESS, &unknown), 0);
}

#[test]
fn test_mark_spent_before_load_affects_nothing() {
    let (_, cache, _) = cached_store(scenario_set());
    assert_eq!(cache.mark_spent(ADDRESS, &OutPoint::new(txid(0xaa), 0)), 0);
    assert_eq!(cache.total_value(ADDRESS).unwrap(), Amount::from_sat(175_000));
}

#[test]
fn test_snapshot_never_returns_spent_records() {
    let (_, cache, _) = cached_store(scenario_set());
    let before = cache.snapshot(ADDRESS).unwrap();
    assert_eq!(before.len(), 3);

    cache.mark_spent(ADDRESS, &OutPoint::new(txid(0xaa), 1));
    let after = cache.snapshot(ADDRESS).unwrap();
    assert_eq!(after.len(), 2);
    assert!(after.iter().all(|u| !u.spent));

    // The earlier snapshot is an independent copy
    assert_eq!(before.len(), 3);

    let all = cache.store().load_or_fetch(ADDRESS).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all.iter().filter(|u| u.spent).count(), 1);
}

#[test]
fn test_cache_matches_store_after_every_write() {
    let (source, cache, _) = cached_store(scenario_set());
    let store = cache.store().clone();

    let check = |label: &str| {
        let cached = cache.snapshot(ADDRESS).unwrap();
        let fresh = store.snapshot(ADDRESS).unwrap();
        assert_eq!(cached.as_slice(), fresh.as_slice(), "after {}", label);
        assert_eq!(cache.total_value(ADDRESS).unwrap(), fresh.total_value());
    };

    check("load");
    cache.mark_spent(ADDRESS, &OutPoint::new(txid(0xaa), 2));
    check("spend");

    source.set(ADDRESS, vec![utxo(0xaa, 0, 100_000), utxo(0xee, 0, 5_000)]);
    cache.refresh(ADDRESS).unwrap();
    check("refresh");

    cache.mark_spent_txid(ADDRESS, &txid(0xee));
    check("txid spend");
}

#[test]
fn test_cache_hits_and_invalidations() {
    let (_, cache, _) = cached_store(scenario_set());

    cache.snapshot(ADDRESS).unwrap();
    cache.snapshot(ADDRESS).unwrap();
    cache.total_value(ADDRESS).unwrap();
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.entries, 1);

    // A no-op spend keeps the entry
    cache.mark_spent(ADDRESS, &OutPoint::new(txid(0x99), 0));
    assert_eq!(cache.stats().invalidations, 0);

    cache.mark_spent(ADDRESS, &OutPoint::new(txid(0xaa), 0));
    let stats = cache.stats();
    assert_eq!(stats.invalidations, 1);
    assert_eq!(stats.entries, 0);
}

#[test]
fn test_refresh_merge_rules() {
    let (source, cache, _) = cached_store(scenario_set());
    cache.snapshot(ADDRESS).unwrap();
    cache.mark_spent(ADDRESS, &OutPoint::new(txid(0xaa), 0));

    // The source still reports the spent output, drops {A,2} and adds a new one
    let mut reconfirmed = utxo(0xaa, 1, 50_000);
    reconfirmed.confirmation_height = 250;
    source.set(
        ADDRESS,
        vec![utxo(0xaa, 0, 100_000), reconfirmed, utxo(0xcc, 0, 9_000)],
    );

    let outcome = cache.refresh(ADDRESS).unwrap();
    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.vanished, 1);

    let snapshot = cache.snapshot(ADDRESS).unwrap();
    let mut values: Vec<u64> = snapshot.iter().map(|u| u.value.to_sat()).collect();
    values.sort();
    assert_eq!(values, vec![9_000, 50_000]);
    assert_eq!(
        snapshot.get(&OutPoint::new(txid(0xaa), 1)).map(|u| u.confirmation_height),
        Some(250)
    );

    let stats = cache.store().stats(ADDRESS).unwrap();
    assert_eq!(stats.total_utxos, 4);
    assert_eq!(stats.unspent_count, 2);
    assert_eq!(stats.spent_count, 2);
    assert_eq!(stats.total_value, 59_000);
}

#[test]
fn test_empty_refresh_keeps_unspent_outputs() {
    let (source, cache, _) = cached_store(scenario_set());
    cache.snapshot(ADDRESS).unwrap();
    let before = cache.store().generation(ADDRESS).unwrap();

    source.set(ADDRESS, vec![]);
    let outcome = cache.refresh(ADDRESS).unwrap();
    assert_eq!(outcome.added, 0);
    assert_eq!(outcome.vanished, 0);
    assert_eq!(cache.total_value(ADDRESS).unwrap(), Amount::from_sat(175_000));
    assert_eq!(cache.store().generation(ADDRESS), Some(before + 1));

    // A non-empty answer still retires what it no longer lists
    source.set(ADDRESS, vec![utxo(0xaa, 0, 100_000)]);
    assert_eq!(cache.refresh(ADDRESS).unwrap().vanished, 2);
    assert_eq!(cache.total_value(ADDRESS).unwrap(), Amount::from_sat(100_000));
}

#[test]
fn test_summaries() {
    let mut records = scenario_set();
    let mut pending = utxo(0xbb, 0, 7_000);
    pending.confirmation_height = 0;
    records.push(pending);
    let (source, cache, _) = cached_store(records);
    source.set("bcrt1qtest2", vec![utxo(0xcc, 0, 1_000)]);

    let summary = cache.store().address_summary(ADDRESS).unwrap();
    assert_eq!(summary.confirmed, 175_000);
    assert_eq!(summary.unconfirmed, 7_000);
    assert_eq!(summary.total_utxos, 4);

    cache.snapshot("bcrt1qtest2").unwrap();
    let totals = cache.store().summary();
    assert_eq!(totals.total_addresses, 2);
    assert_eq!(totals.total_utxos, 5);
    assert_eq!(totals.total_value, 183_000);
    assert_eq!(
        cache.store().addresses(),
        vec![ADDRESS.to_string(), "bcrt1qtest2".to_string()]
    );
}

#[test]
fn test_union_snapshot_drops_duplicates() {
    let (source, cache, _) = cached_store(scenario_set());
    // The same output reported under a second address
    source.set("bcrt1qtest2", vec![utxo(0xaa, 0, 100_000), utxo(0xbb, 3, 4_000)]);

    let union = cache
        .union_snapshot(&[ADDRESS.to_string(), "bcrt1qtest2".to_string()])
        .unwrap();
    assert_eq!(union.len(), 4);
    let first: &Utxo = union.iter().next().unwrap();
    assert_eq!(first.address, ADDRESS);
}

#[test]
fn test_events_follow_state_changes() {
    let (source, cache, bus) = cached_store(scenario_set());
    let events = bus.subscribe_all();

    cache.snapshot(ADDRESS).unwrap();
    cache.mark_spent(ADDRESS, &OutPoint::new(txid(0xaa), 0));
    cache.snapshot(ADDRESS).unwrap();
    source.set(ADDRESS, scenario_set());
    cache.refresh(ADDRESS).unwrap();

    let received: Vec<UtxoEvent> = events.try_iter().collect();
    let kinds: Vec<&str> = received.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        kinds,
        vec!["loaded", "spent", "cache_invalidated", "refreshed", "cache_invalidated"]
    );

    match &received[0] {
        UtxoEvent::Loaded { count, total_value, .. } => {
            assert_eq!(*count, 3);
            assert_eq!(*total_value, 175_000);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(events.recv_timeout(Duration::from_millis(10)).is_err());
}

use bitcoin::{Amount, OutPoint, Txid};
use sieve_common::config::Config;
use sieve_common::utxo_source::{StaticSource, UtxoSource};
use sieve_common::{SelectionError, SelectionStrategy, SourceError, Utxo};
use sieve_service::{ServiceError, UtxoService};
use std::fs;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const ADDRESS: &str = "bcrt1qtest1";
const SECOND: &str = "bcrt1qtest2";
const BROKEN: &str = "bcrt1qbroken";

fn txid(tag: u8) -> Txid {
    Txid::from_str(&format!("{:02x}", tag).repeat(32)).unwrap()
}

fn utxo(address: &str, tag: u8, vout: u32, sats: u64) -> Utxo {
    Utxo::new(OutPoint::new(txid(tag), vout), address, Amount::from_sat(sats), 100)
}

/// Static fixtures plus one address whose fetch always fails
struct TestSource {
    inner: StaticSource,
    delay: Duration,
}

impl UtxoSource for TestSource {
    fn name(&self) -> &'static str {
        "test"
    }

    fn fetch_utxos(&self, address: &str) -> Result<Vec<Utxo>, SourceError> {
        std::thread::sleep(self.delay);
        if address == BROKEN {
            return Err(SourceError::Unavailable("backend offline".to_string()));
        }
        self.inner.fetch_utxos(address)
    }
}

fn service_with(config: Config, delay: Duration) -> UtxoService {
    let _ = sieve_common::init();
    let inner = StaticSource::new()
        .with_address(
            ADDRESS,
            vec![
                utxo(ADDRESS, 0xaa, 0, 100_000),
                utxo(ADDRESS, 0xaa, 1, 50_000),
                utxo(ADDRESS, 0xaa, 2, 25_000),
            ],
        )
        .with_address(SECOND, vec![utxo(SECOND, 0xbb, 0, 40_000)]);
    UtxoService::new(config, Arc::new(TestSource { inner, delay }))
}

fn service() -> UtxoService {
    service_with(Config::default(), Duration::ZERO)
}

#[tokio::test]
async fn test_default_selection_scenario() {
    let service = service();
    let request = service
        .request(ADDRESS, Amount::from_sat(120_000), Some(1), None)
        .unwrap();
    let result = service.select(request).await.unwrap();

    let mut values: Vec<u64> = result.selected.iter().map(|u| u.value.to_sat()).collect();
    values.sort();
    assert_eq!(values, vec![50_000, 100_000]);
    assert_eq!(result.estimated_fee, Amount::from_sat(374));
    assert_eq!(result.change, Amount::from_sat(150_000 - 120_000 - 374));
    assert_eq!(result.strategy_used, SelectionStrategy::Greedy);

    // Selection leaves the records unspent
    assert_eq!(service.balance(ADDRESS).await.unwrap().balance, 175_000);
}

#[tokio::test]
async fn test_queries_for_known_and_unknown_addresses() {
    let service = service();

    let utxos = service.utxos(ADDRESS).await.unwrap();
    assert_eq!(utxos.len(), 3);
    let stats = service.stats(ADDRESS).await.unwrap();
    assert_eq!(stats.unspent_count, 3);
    assert_eq!(stats.total_value, 175_000);

    assert!(service.utxos("bcrt1qnobody").await.unwrap().is_empty());
    assert_eq!(service.balance("bcrt1qnobody").await.unwrap().balance, 0);

    let request = service
        .request("bcrt1qnobody", Amount::from_sat(1_000), None, None)
        .unwrap();
    assert!(matches!(
        service.select(request).await,
        Err(ServiceError::Selection(SelectionError::AddressNotFound(_)))
    ));
}

#[tokio::test]
async fn test_spend_then_select_fails() {
    let service = service();
    service.utxos(ADDRESS).await.unwrap();

    let spent = service
        .spend(ADDRESS, vec![OutPoint::new(txid(0xaa), 0)])
        .await
        .unwrap();
    assert_eq!(spent, 1);
    assert_eq!(service.utxos(ADDRESS).await.unwrap().len(), 2);

    let request = service
        .request(ADDRESS, Amount::from_sat(120_000), Some(1), None)
        .unwrap();
    match service.select(request).await {
        Err(ServiceError::Selection(SelectionError::InsufficientFunds { available, .. })) => {
            assert_eq!(available, Amount::from_sat(75_000));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    assert_eq!(service.spend_txid(ADDRESS, txid(0xaa)).await.unwrap(), 2);
    assert_eq!(service.balance(ADDRESS).await.unwrap().balance, 0);
}

#[tokio::test]
async fn test_spend_on_cold_address_loads_it_first() {
    let service = service();
    let spent = service
        .spend(ADDRESS, vec![OutPoint::new(txid(0xaa), 0)])
        .await
        .unwrap();
    assert_eq!(spent, 1);
    assert_eq!(service.balance(ADDRESS).await.unwrap().balance, 75_000);

    let fresh = crate::service();
    assert_eq!(fresh.spend_txid(ADDRESS, txid(0xaa)).await.unwrap(), 3);
    assert_eq!(fresh.balance(ADDRESS).await.unwrap().balance, 0);

    assert!(matches!(
        fresh.spend(BROKEN, vec![OutPoint::new(txid(0xaa), 0)]).await,
        Err(ServiceError::Selection(SelectionError::SourceUnavailable { .. }))
    ));
}

#[tokio::test]
async fn test_utxos_keep_source_order() {
    let service = service();
    let values: Vec<u64> = service
        .utxos(ADDRESS)
        .await
        .unwrap()
        .iter()
        .map(|u| u.value.to_sat())
        .collect();
    assert_eq!(values, vec![100_000, 50_000, 25_000]);
}

#[tokio::test]
async fn test_strategy_tags() {
    let service = service();
    assert!(matches!(
        service.request(ADDRESS, Amount::from_sat(1_000), None, Some("fastest")),
        Err(ServiceError::Selection(SelectionError::InvalidStrategy(_)))
    ));

    let request = service
        .request(ADDRESS, Amount::from_sat(60_000), Some(2), Some("optimize_fee_2"))
        .unwrap();
    assert_eq!(request.strategy, SelectionStrategy::Knapsack);
    let result = service.select(request).await.unwrap();
    assert!(result.total_input_value >= Amount::from_sat(60_000) + result.estimated_fee);
}

#[tokio::test]
async fn test_multi_address_selection_and_summary() {
    let service = service();
    let addresses = vec![ADDRESS.to_string(), SECOND.to_string()];

    let result = service
        .multi_select(&addresses, Amount::from_sat(160_000), Some(1), Some("greedy"))
        .await
        .unwrap();
    assert_eq!(result.selected.len(), 3);
    assert!(result.selected.iter().any(|u| u.address == SECOND));
    assert!(result.total_input_value >= Amount::from_sat(160_000) + result.estimated_fee);

    let summaries = service.multi_summary(&addresses).await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].confirmed, 175_000);
    assert_eq!(summaries[1].confirmed, 40_000);
    assert_eq!(summaries[1].unconfirmed, 0);
}

#[tokio::test]
async fn test_source_failure_is_retryable() {
    let service = service();
    let err = service.utxos(BROKEN).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Selection(SelectionError::SourceUnavailable { .. })
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_slow_fetch_times_out() {
    let mut config = Config::default();
    config.service.fetch_timeout_ms = 50;
    let service = service_with(config, Duration::from_millis(300));

    let err = service.utxos(ADDRESS).await.unwrap_err();
    assert!(matches!(err, ServiceError::Timeout { operation: "utxos", millis: 50 }));
    assert!(err.is_retryable());

    // The abandoned fetch still completes and fills the store
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(service.balance(ADDRESS).await.unwrap().balance, 175_000);
}

#[tokio::test]
async fn test_preload_skips_failing_addresses() {
    let mut config = Config::default();
    config.service.preload_addresses = vec![ADDRESS.to_string(), BROKEN.to_string()];
    let service = service_with(config, Duration::ZERO);

    assert_eq!(service.preload().await, 1);
    let info = service.info().await.unwrap();
    assert_eq!(info.addresses, vec![ADDRESS.to_string()]);
    assert_eq!(info.store.total_value, 175_000);
}

#[tokio::test]
async fn test_refresh_with_unchanged_source() {
    let service = service();
    service.utxos(SECOND).await.unwrap();

    // The static source reports the same set again, so nothing changes
    let outcome = service.refresh(SECOND).await.unwrap();
    assert_eq!(outcome.added, 0);
    assert_eq!(outcome.vanished, 0);
    assert_eq!(service.balance(SECOND).await.unwrap().balance, 40_000);
}

#[tokio::test]
async fn test_service_from_config_reads_fixture_files() {
    let temp_dir = TempDir::new().unwrap();
    let fixtures = temp_dir.path().join("fixtures");
    fs::create_dir(&fixtures).unwrap();
    fs::write(
        fixtures.join("default.json"),
        format!(
            r#"[{{"txid": "{}", "vout": 0, "value": 12345, "status": {{"confirmed": false}}}}]"#,
            "dd".repeat(32)
        ),
    )
    .unwrap();

    let mut config = Config::default();
    config.source.default_fixture = Some("default.json".to_string());
    let service = UtxoService::from_config(config, temp_dir.path());

    let summary = service
        .multi_summary(&["bcrt1qanyone".to_string()])
        .await
        .unwrap();
    assert_eq!(summary[0].unconfirmed, 12_345);
    assert_eq!(summary[0].total_utxos, 1);
}

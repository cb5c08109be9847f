use anyhow::Result;
use sieve_common::config::{self, Config};
use sieve_common::SelectionStrategy;
use std::fs;
use tempfile::TempDir;

// Helper function to create a temporary directory and config file for testing
fn setup_test_config() -> (TempDir, String) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.toml");
    let config_path_str = config_path.to_string_lossy().to_string();

    let config_content = r#"
        [selection]
        dust_threshold = 1000
        default_fee_rate = 3
        default_strategy = "bnb"
        bnb_max_nodes = 5000
        seed = 42

        [source]
        fixture_dir = "/var/lib/sieve/fixtures"
        default_fixture = "default.json"

        [service]
        fetch_timeout_ms = 1500
        preload_addresses = ["bcrt1qtest1", "bcrt1qtest2"]

        [logging]
        level = "debug"
        json_format = true
    "#;

    fs::write(&config_path, config_content).expect("Failed to write test config");

    (temp_dir, config_path_str)
}

#[test]
fn test_load_config() -> Result<()> {
    let (_temp_dir, config_path) = setup_test_config();

    let config = Config::load(&config_path)?;
    config.validate()?;

    assert_eq!(config.selection.dust_threshold, 1000);
    assert_eq!(config.selection.default_fee_rate, 3);
    assert_eq!(config.selection.strategy()?, SelectionStrategy::BranchAndBound);
    assert_eq!(config.selection.bnb_max_nodes, 5000);
    assert_eq!(config.selection.seed, Some(42));
    assert_eq!(config.selection.knapsack_max_states, 50_000);

    assert_eq!(config.source.fixture_dir, "/var/lib/sieve/fixtures");
    assert_eq!(config.source.default_fixture.as_deref(), Some("default.json"));

    assert_eq!(config.service.fetch_timeout_ms, 1500);
    assert_eq!(config.service.preload_addresses.len(), 2);

    assert!(config.logging.json_format);

    Ok(())
}

#[test]
fn test_save_and_reload() -> Result<()> {
    let (_temp_dir, config_path) = setup_test_config();

    let mut config = Config::load(&config_path)?;
    config.selection.default_strategy = "consolidation".to_string();
    config.selection.consolidation_max_inputs = 12;
    config.save(&config_path)?;

    let reloaded = Config::load(&config_path)?;
    assert_eq!(reloaded.selection.strategy()?, SelectionStrategy::Consolidation);
    assert_eq!(reloaded.selection.consolidation_max_inputs, 12);
    assert_eq!(reloaded.selection.seed, Some(42));
    assert_eq!(reloaded.service.preload_addresses, config.service.preload_addresses);

    Ok(())
}

#[test]
fn test_ensure_config_exists_creates_default() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("fresh.toml");
    let path_str = path.to_string_lossy().to_string();

    assert!(!path.exists());
    let created = config::ensure_config_exists(&path_str)?;
    assert!(path.exists());
    assert_eq!(created.selection.dust_threshold, sieve_common::DUST_THRESHOLD);

    // Second call loads what the first one wrote
    let loaded = config::ensure_config_exists(&path_str)?;
    assert_eq!(loaded.selection, created.selection);

    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("bad.toml");
    fs::write(&path, "[selection]\ndefault_strategy = \"fastest\"\n")?;

    let path_str = path.to_string_lossy().to_string();
    assert!(Config::load(&path_str).is_ok());
    assert!(config::ensure_config_exists(&path_str).is_err());

    fs::write(&path, "[selection\n")?;
    assert!(Config::load(&path_str).is_err());

    Ok(())
}

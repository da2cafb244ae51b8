//! Configuration parsing and validation tests.

use std::collections::HashMap;
use std::sync::Arc;

use statelog::client::MemoryBroker;
use statelog::config::StoreConfig;
use statelog::constants::{
    DEFAULT_STATUS_STORAGE_TOPIC, RUNNER_ID_CONFIG, STATUS_STORAGE_PARTITIONS_CONFIG,
    STATUS_STORAGE_REPLICATION_FACTOR_CONFIG, STATUS_STORAGE_TOPIC_CONFIG,
};
use statelog::error::StoreError;
use statelog::store::StatusStore;

fn props(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// Property-Map Parsing
// ============================================================================

#[test]
fn from_map_takes_defaults_for_absent_keys() {
    let config = StoreConfig::from_map(&HashMap::new()).unwrap();
    assert_eq!(config, StoreConfig::default());
    assert_eq!(config.topic, DEFAULT_STATUS_STORAGE_TOPIC);
    assert_eq!(config.partitions, 1);
    assert_eq!(config.replication_factor, 1);
}

#[test]
fn from_map_honors_overrides() {
    let config = StoreConfig::from_map(&props(&[
        (RUNNER_ID_CONFIG, "runner-7"),
        (STATUS_STORAGE_TOPIC_CONFIG, "fleet_status"),
        (STATUS_STORAGE_PARTITIONS_CONFIG, "5"),
        (STATUS_STORAGE_REPLICATION_FACTOR_CONFIG, "3"),
    ]))
    .unwrap();
    assert_eq!(config.runner_id, "runner-7");
    assert_eq!(config.topic, "fleet_status");
    assert_eq!(config.partitions, 5);
    assert_eq!(config.replication_factor, 3);
}

#[test]
fn from_map_rejects_unparsable_numerics() {
    let err = StoreConfig::from_map(&props(&[(STATUS_STORAGE_PARTITIONS_CONFIG, "many")]))
        .unwrap_err();
    assert!(matches!(err, StoreError::Config(_)), "got {err:?}");

    let err = StoreConfig::from_map(&props(&[(
        STATUS_STORAGE_REPLICATION_FACTOR_CONFIG,
        "3.5",
    )]))
    .unwrap_err();
    assert!(matches!(err, StoreError::Config(_)), "got {err:?}");
}

#[test]
fn from_map_ignores_unknown_keys() {
    let config = StoreConfig::from_map(&props(&[("offset.storage.topic", "other")])).unwrap();
    assert_eq!(config, StoreConfig::default());
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn validate_rejects_blank_topic() {
    let config = StoreConfig {
        topic: "   ".to_string(),
        ..StoreConfig::default()
    };
    assert!(matches!(config.validate(), Err(StoreError::Config(_))));
}

#[test]
fn validate_rejects_nonpositive_partitions_and_replication() {
    let config = StoreConfig {
        partitions: 0,
        ..StoreConfig::default()
    };
    assert!(matches!(config.validate(), Err(StoreError::Config(_))));

    let config = StoreConfig {
        replication_factor: 0,
        ..StoreConfig::default()
    };
    assert!(matches!(config.validate(), Err(StoreError::Config(_))));
}

#[test]
fn configure_surfaces_invalid_config() {
    let broker = MemoryBroker::new();
    let config = StoreConfig {
        topic: String::new(),
        ..StoreConfig::default()
    };
    let result = StatusStore::configure(config, broker.clone(), Arc::new(broker.admin()));
    assert!(matches!(result, Err(StoreError::Config(_))));
}

// ============================================================================
// Environment
// ============================================================================

// Single test so the process-global environment is touched from one place.
#[test]
fn from_env_reads_overrides_rejects_garbage_then_falls_back_to_defaults() {
    std::env::set_var("RUNNER_ID", "runner-env");
    std::env::set_var("STATUS_STORAGE_TOPIC", "env_status");
    std::env::set_var("STATUS_STORAGE_PARTITIONS", "4");
    std::env::set_var("STATUS_STORAGE_REPLICATION_FACTOR", "2");

    let config = StoreConfig::from_env().unwrap();
    assert_eq!(config.runner_id, "runner-env");
    assert_eq!(config.topic, "env_status");
    assert_eq!(config.partitions, 4);
    assert_eq!(config.replication_factor, 2);

    // Present but unparsable is a hard error, same as `from_map`.
    std::env::set_var("STATUS_STORAGE_PARTITIONS", "many");
    let err = StoreConfig::from_env().unwrap_err();
    assert!(matches!(err, StoreError::Config(_)), "got {err:?}");

    std::env::remove_var("RUNNER_ID");
    std::env::remove_var("STATUS_STORAGE_TOPIC");
    std::env::remove_var("STATUS_STORAGE_PARTITIONS");
    std::env::remove_var("STATUS_STORAGE_REPLICATION_FACTOR");

    let config = StoreConfig::from_env().unwrap();
    assert_eq!(config, StoreConfig {
        runner_id: String::new(),
        ..StoreConfig::default()
    });
}

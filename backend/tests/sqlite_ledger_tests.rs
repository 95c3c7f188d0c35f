//! Integration tests for the SQLite usage ledger.

#![cfg(feature = "sqlite-ledger")]

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use smarthome::db::repository::RepositoryError;
use smarthome::ledger::{LedgerFactory, LedgerType, SqliteLedger, SqliteLedgerConfig, UsageLedger};
use smarthome::models::{DeviceId, DeviceUsage, HubId, UsageBlock};

fn config_in(dir: &TempDir) -> SqliteLedgerConfig {
    let path = dir.path().join("usage.db");
    SqliteLedgerConfig::with_url(path.to_string_lossy().to_string())
}

fn block(hub: &str, minutes_after: i64, devices: &[(&str, f64, f64)]) -> UsageBlock {
    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::minutes(minutes_after);
    UsageBlock::new(
        HubId::from(hub),
        ts,
        devices
            .iter()
            .map(|(id, minutes, wh)| DeviceUsage {
                device_id: DeviceId::from(*id),
                active_minutes: *minutes,
                power_usage: *wh,
            })
            .collect(),
    )
}

async fn open(dir: &TempDir) -> std::sync::Arc<SqliteLedger> {
    LedgerFactory::create_sqlite(&config_in(dir)).await.unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let dir = TempDir::new().unwrap();
    let ledger = open(&dir).await;
    assert!(ledger.health_check().await.unwrap());
}

#[tokio::test]
async fn test_record_and_read_back() {
    let dir = TempDir::new().unwrap();
    let ledger = open(&dir).await;

    let written = block("HUB_1", 15, &[("DEV_a", 15.0, 2.5), ("DEV_b", 6.0, 100.0)]);
    ledger.record_block(&written).await.unwrap();

    let read = ledger
        .get_block(&written.hub_id, written.timestamp)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read.total_usage, 102.5);
    assert_eq!(read.timestamp, written.timestamp);
    assert_eq!(read.devices, written.devices);
}

#[tokio::test]
async fn test_same_hub_and_timestamp_is_replaced() {
    let dir = TempDir::new().unwrap();
    let ledger = open(&dir).await;

    ledger
        .record_block(&block("HUB_1", 15, &[("DEV_a", 15.0, 2.5), ("DEV_b", 1.0, 0.1)]))
        .await
        .unwrap();
    let replacement = block("HUB_1", 15, &[("DEV_a", 3.0, 0.5)]);
    ledger.record_block(&replacement).await.unwrap();

    let history = ledger.blocks_for_hub(&HubId::from("HUB_1"), 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].total_usage, 0.5);
    assert_eq!(history[0].devices.len(), 1);
}

#[tokio::test]
async fn test_blocks_for_hub_newest_first_with_limit() {
    let dir = TempDir::new().unwrap();
    let ledger = open(&dir).await;

    for minutes in [15, 30, 45] {
        ledger
            .record_block(&block("HUB_1", minutes, &[("DEV_a", 15.0, 2.5)]))
            .await
            .unwrap();
    }
    ledger
        .record_block(&block("HUB_2", 15, &[("DEV_z", 15.0, 250.0)]))
        .await
        .unwrap();

    let history = ledger.blocks_for_hub(&HubId::from("HUB_1"), 2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].timestamp > history[1].timestamp);
    assert!(history.iter().all(|b| b.hub_id.as_str() == "HUB_1"));
    assert!(history.iter().all(|b| b.devices.len() == 1));
}

#[tokio::test]
async fn test_empty_block_is_recorded() {
    let dir = TempDir::new().unwrap();
    let ledger = open(&dir).await;

    let empty = block("HUB_1", 15, &[]);
    ledger.record_block(&empty).await.unwrap();

    let read = ledger.get_block(&empty.hub_id, empty.timestamp).await.unwrap().unwrap();
    assert_eq!(read.total_usage, 0.0);
    assert!(read.devices.is_empty());
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let written = block("HUB_1", 15, &[("DEV_a", 15.0, 2.5)]);
    {
        let ledger = open(&dir).await;
        ledger.record_block(&written).await.unwrap();
    }

    let reopened = open(&dir).await;
    let history = reopened.blocks_for_hub(&written.hub_id, 10).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_stats_count_queries() {
    let dir = TempDir::new().unwrap();
    let ledger = open(&dir).await;
    ledger.record_block(&block("HUB_1", 15, &[])).await.unwrap();
    ledger.blocks_for_hub(&HubId::from("HUB_1"), 1).await.unwrap();

    let stats = ledger.stats();
    assert!(stats.total_queries >= 2);
    assert_eq!(stats.failed_queries, 0);
    assert_eq!(stats.max_size, SqliteLedgerConfig::default().max_pool_size);
}

#[tokio::test]
async fn test_factory_builds_sqlite_from_type() {
    let dir = TempDir::new().unwrap();
    let ledger = LedgerFactory::create(LedgerType::Sqlite, Some(&config_in(&dir)))
        .await
        .unwrap();
    assert!(ledger.health_check().await.unwrap());
}

#[test]
fn test_zero_pool_size_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir);
    config.max_pool_size = 0;
    let err = SqliteLedger::new(config).unwrap_err();
    assert!(matches!(err, RepositoryError::ConfigurationError { .. }));
}

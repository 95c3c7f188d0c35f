//! Integration tests for hub workers and usage accounting.

mod support;

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use smarthome::db::repositories::LocalRepository;
use smarthome::db::repository::{DeviceRepository, UsageSnapshotRepository};
use smarthome::ledger::{LocalLedger, UsageLedger};
use smarthome::models::DeviceType;
use smarthome::services::{hub_power_usage, HubWorker, Manipulator};
use smarthome::telemetry::{hub_aggregate_topic, RecordingPublisher};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

struct Fixture {
    repo: Arc<LocalRepository>,
    ledger: Arc<LocalLedger>,
    publisher: Arc<RecordingPublisher>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            repo: Arc::new(LocalRepository::new()),
            ledger: Arc::new(LocalLedger::new()),
            publisher: Arc::new(RecordingPublisher::new()),
        }
    }
}

#[tokio::test]
async fn test_block_accounts_on_time_per_device() {
    let fx = Fixture::new();
    let (hub, devices) =
        support::seed_hub(&fx.repo, &[DeviceType::Light, DeviceType::Thermostat]).await;
    let light = &devices[0];
    let thermostat = &devices[1];

    // Both start off.
    let worker = HubWorker::load(
        &hub,
        fx.repo.clone(),
        fx.ledger.clone(),
        fx.publisher.clone(),
        t0(),
    )
    .await;
    assert_eq!(worker.tracked_devices().len(), 2);

    worker.update_device_state(&light.id, true, t0());
    worker.update_device_state(&thermostat.id, true, t0() + Duration::minutes(9));

    let block = worker.process_block(t0() + Duration::minutes(15)).await.unwrap();

    let light_usage = block.devices.iter().find(|d| d.device_id == light.id).unwrap();
    assert_eq!(light_usage.active_minutes, 15.0);
    assert_eq!(light_usage.power_usage, 2.5);

    let thermo_usage = block
        .devices
        .iter()
        .find(|d| d.device_id == thermostat.id)
        .unwrap();
    assert_eq!(thermo_usage.active_minutes, 6.0);
    assert_eq!(thermo_usage.power_usage, 100.0);
    assert_eq!(block.total_usage, 102.5);
}

#[tokio::test]
async fn test_block_is_written_everywhere() {
    let fx = Fixture::new();
    let (hub, devices) = support::seed_hub(&fx.repo, &[DeviceType::Light]).await;

    let worker = HubWorker::load(
        &hub,
        fx.repo.clone(),
        fx.ledger.clone(),
        fx.publisher.clone(),
        t0(),
    )
    .await;
    worker.update_device_state(&devices[0].id, true, t0());
    let end = t0() + Duration::minutes(15);
    worker.process_block(end).await.unwrap();

    let stored = fx.ledger.get_block(&hub.id, end).await.unwrap().unwrap();
    assert_eq!(stored.total_usage, 2.5);

    let (key, snapshot) = fx.repo.latest_usage_snapshot(&hub.id).await.unwrap().unwrap();
    assert_eq!(key, "2024_03_01_10_15_00");
    assert_eq!(snapshot.total_usage, 2.5);

    let aggregates = fx.publisher.messages_for(&hub_aggregate_topic(&hub.id));
    assert_eq!(aggregates.len(), 1);
    assert_eq!(aggregates[0]["hub_id"], hub.id.as_str());
    assert_eq!(aggregates[0]["total_usage"], 2.5);

    let usage = hub_power_usage(fx.repo.as_ref(), &hub.id).await.unwrap();
    assert_eq!(usage.total_usage, 2.5);
    assert_eq!(usage.devices.len(), 1);
}

#[tokio::test]
async fn test_state_carries_over_between_blocks() {
    let fx = Fixture::new();
    let (hub, devices) = support::seed_hub(&fx.repo, &[DeviceType::Light]).await;
    let worker = HubWorker::load(
        &hub,
        fx.repo.clone(),
        fx.ledger.clone(),
        fx.publisher.clone(),
        t0(),
    )
    .await;
    worker.update_device_state(&devices[0].id, true, t0() + Duration::minutes(10));

    let first = worker.process_block(t0() + Duration::minutes(15)).await.unwrap();
    assert_eq!(first.devices[0].active_minutes, 5.0);

    let second = worker.process_block(t0() + Duration::minutes(30)).await.unwrap();
    assert_eq!(second.devices[0].active_minutes, 15.0);

    let history = fx.ledger.blocks_for_hub(&hub.id, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].timestamp, t0() + Duration::minutes(30));
}

#[tokio::test]
async fn test_deleted_device_stops_being_tracked() {
    let fx = Fixture::new();
    let (hub, devices) =
        support::seed_hub(&fx.repo, &[DeviceType::Light, DeviceType::Light]).await;
    let worker = HubWorker::load(
        &hub,
        fx.repo.clone(),
        fx.ledger.clone(),
        fx.publisher.clone(),
        t0(),
    )
    .await;

    fx.repo.delete_device(&devices[1].id).await.unwrap();
    let block = worker.process_block(t0() + Duration::minutes(15)).await.unwrap();

    assert_eq!(block.devices.len(), 1);
    assert_eq!(worker.tracked_devices(), vec![devices[0].id.clone()]);
}

#[tokio::test]
async fn test_manipulator_starts_one_worker_per_hub() {
    let fx = Fixture::new();
    let (first, _) = support::seed_hub(&fx.repo, &[DeviceType::Light]).await;
    let (second, _) = support::seed_hub(&fx.repo, &[DeviceType::Thermostat]).await;

    let manipulator = Manipulator::new(fx.repo.clone(), fx.ledger.clone(), fx.publisher.clone());
    assert_eq!(manipulator.initialize_hubs().await.unwrap(), 2);
    assert_eq!(manipulator.initialize_hubs().await.unwrap(), 0);

    let mut expected = vec![first.id.clone(), second.id.clone()];
    expected.sort();
    assert_eq!(manipulator.hub_ids(), expected);

    manipulator.stop_all().await;
    assert!(manipulator.hub_ids().is_empty());
    assert!(manipulator.worker(&first.id).is_none());
}

#[tokio::test]
async fn test_manipulator_forwards_state_changes() {
    let fx = Fixture::new();
    let (hub, devices) = support::seed_hub(&fx.repo, &[DeviceType::Light]).await;
    let manipulator = Manipulator::new(fx.repo.clone(), fx.ledger.clone(), fx.publisher.clone());

    assert!(!manipulator.update_device_state(&hub.id, &devices[0].id, true));
    assert!(manipulator.add_hub_by_id(&hub.id).await.unwrap());
    assert!(manipulator.update_device_state(&hub.id, &devices[0].id, true));

    let worker = manipulator.worker(&hub.id).unwrap();
    assert_eq!(worker.tracked_devices(), vec![devices[0].id.clone()]);
    manipulator.stop_all().await;
}

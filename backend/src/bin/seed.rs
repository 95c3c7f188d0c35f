//! Demo data seeder.
//!
//! Creates a residential hub with three bulbs and a thermostat in a fresh
//! in-memory store, runs one accounting block against the configured
//! ledger, and prints the ids.
//!
//! ```bash
//! LEDGER_TYPE=local cargo run --bin smarthome-seed
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use smarthome::db::repositories::LocalRepository;
use smarthome::db::services as db_services;
use smarthome::ledger::LedgerFactory;
use smarthome::models::{DeviceType, HubVariant};
use smarthome::services::{set_device_state, CommissioningService, Manipulator};
use smarthome::telemetry::NoopPublisher;
use smarthome::AppConfig;

const BULBS: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder().with_max_level(Level::INFO).init();

    let config = AppConfig::from_env()?;
    let repository = Arc::new(LocalRepository::new());
    let ledger = LedgerFactory::create(config.ledger_type, Some(&config.ledger)).await?;
    let commissioning = CommissioningService::new(repository.clone());
    let manipulator = Manipulator::new(repository.clone(), ledger, Arc::new(NoopPublisher));

    let hub_id = commissioning
        .create_hub(HubVariant::Residential, Some("Demo Hub".to_string()))
        .await?;
    println!("hub        {}", hub_id);

    let mut device_types = vec![DeviceType::Light; BULBS];
    device_types.push(DeviceType::Thermostat);

    let mut device_ids = Vec::with_capacity(device_types.len());
    for device_type in device_types {
        let device_id = commissioning.spawn_device(device_type).await?;
        db_services::assign_device_to_hub(repository.as_ref(), &device_id, &hub_id).await?;
        println!("{:<10} {}", device_type.as_str().to_lowercase(), device_id);
        device_ids.push(device_id);
    }

    manipulator.add_hub_by_id(&hub_id).await?;
    if let Some(first) = device_ids.first() {
        set_device_state(repository.as_ref(), &manipulator, first, Some(&hub_id), true).await?;
    }

    if let Some(worker) = manipulator.worker(&hub_id) {
        let block = worker.process_block(Utc::now()).await?;
        info!(
            "Recorded block {} for {} ({:.3} Wh)",
            block.timestamp, hub_id, block.total_usage
        );
    }
    manipulator.stop_all().await;

    Ok(())
}

//! Power usage queries answered from the latest hub snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::repository::FullRepository;
use crate::error::DomainResult;
use crate::models::{DeviceId, DeviceUsage, HubId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePowerUsage {
    pub device_id: DeviceId,
    pub power_usage: f64,
    pub active_minutes: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubPowerUsage {
    pub hub_id: HubId,
    pub total_usage: f64,
    pub timestamp: DateTime<Utc>,
    pub devices: Vec<DeviceUsage>,
}

/// Usage of a device in its hub's latest block.
///
/// An explicit hub is read as-is, so unknown ids give zeros. Without one the
/// device must exist to resolve its hub. Without a hub or a snapshot the
/// figures are zero and the timestamp is the current time.
pub async fn device_power_usage(
    repo: &dyn FullRepository,
    device_id: &DeviceId,
    hub_id: Option<&HubId>,
) -> DomainResult<DevicePowerUsage> {
    let hub_id = match hub_id {
        Some(hub_id) => Some(hub_id.clone()),
        None => repo.get_device(device_id).await?.hub_id,
    };

    let latest = match &hub_id {
        Some(hub_id) => repo.latest_usage_snapshot(hub_id).await?,
        None => None,
    };

    let usage = latest.and_then(|(_, snapshot)| {
        snapshot
            .devices
            .get(device_id)
            .map(|entry| (*entry, snapshot.timestamp))
    });

    Ok(match usage {
        Some((entry, timestamp)) => DevicePowerUsage {
            device_id: device_id.clone(),
            power_usage: entry.power_usage,
            active_minutes: entry.active_minutes,
            timestamp,
        },
        None => DevicePowerUsage {
            device_id: device_id.clone(),
            power_usage: 0.0,
            active_minutes: 0.0,
            timestamp: Utc::now(),
        },
    })
}

/// Usage of a hub in its latest block. Unknown hubs read as zeros.
pub async fn hub_power_usage(repo: &dyn FullRepository, hub_id: &HubId) -> DomainResult<HubPowerUsage> {
    Ok(match repo.latest_usage_snapshot(hub_id).await? {
        Some((_, snapshot)) => HubPowerUsage {
            hub_id: hub_id.clone(),
            total_usage: snapshot.total_usage,
            timestamp: snapshot.timestamp,
            devices: snapshot
                .devices
                .into_iter()
                .map(|(device_id, entry)| DeviceUsage {
                    device_id,
                    active_minutes: entry.active_minutes,
                    power_usage: entry.power_usage,
                })
                .collect(),
        },
        None => HubPowerUsage {
            hub_id: hub_id.clone(),
            total_usage: 0.0,
            timestamp: Utc::now(),
            devices: Vec::new(),
        },
    })
}

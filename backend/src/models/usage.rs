//! Fifteen-minute power usage accounting.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::device::DeviceId;
use super::hub::HubId;

/// Length of one accounting block.
pub const BLOCK_MINUTES: f64 = 15.0;

/// Key format for snapshots in the document store.
pub const SNAPSHOT_KEY_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceUsage {
    pub device_id: DeviceId,
    pub active_minutes: f64,
    /// Energy in watt-hours over the block.
    pub power_usage: f64,
}

/// One hub's consumption over a single block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageBlock {
    pub hub_id: HubId,
    pub timestamp: DateTime<Utc>,
    pub total_usage: f64,
    pub devices: Vec<DeviceUsage>,
}

impl UsageBlock {
    /// Build a block, truncating the timestamp to whole seconds and summing
    /// the device totals.
    pub fn new(hub_id: HubId, timestamp: DateTime<Utc>, devices: Vec<DeviceUsage>) -> Self {
        let total_usage = devices.iter().map(|d| d.power_usage).sum();
        Self {
            hub_id,
            timestamp: timestamp.trunc_subsecs(0),
            total_usage,
            devices,
        }
    }

    pub fn snapshot_key(&self) -> String {
        snapshot_key(&self.timestamp)
    }

    pub fn to_snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            total_usage: self.total_usage,
            timestamp: self.timestamp,
            devices: self
                .devices
                .iter()
                .map(|d| {
                    (
                        d.device_id.clone(),
                        DeviceUsageEntry {
                            active_minutes: d.active_minutes,
                            power_usage: d.power_usage,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceUsageEntry {
    pub active_minutes: f64,
    pub power_usage: f64,
}

/// Document-store form of a [`UsageBlock`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub total_usage: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub devices: BTreeMap<DeviceId, DeviceUsageEntry>,
}

pub fn snapshot_key(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(SNAPSHOT_KEY_FORMAT).to_string()
}

/// Energy in watt-hours drawn by `power_rating` watts over `active_minutes`.
pub fn energy_wh(power_rating: f64, active_minutes: f64) -> f64 {
    power_rating * active_minutes / 60.0
}

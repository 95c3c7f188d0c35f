//! In-memory document repository.
//!
//! All collections live behind one `RwLock`, so each trait method is atomic
//! with respect to the others. Clones share the same underlying data.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::repository::{
    DeviceRepository, ErrorContext, HubRepository, PoolRepository, RepositoryError,
    RepositoryResult, UsageSnapshotRepository, UserRepository,
};
use crate::models::{Device, DeviceId, DeviceStatus, Hub, HubId, UsageSnapshot, User, UserId};

#[derive(Debug, Default)]
struct LocalData {
    devices: HashMap<DeviceId, Device>,
    device_status: HashMap<DeviceId, Vec<DeviceStatus>>,
    hubs: HashMap<HubId, Hub>,
    pool: BTreeSet<String>,
    users: HashMap<UserId, User>,
    snapshots: HashMap<HubId, BTreeMap<String, UsageSnapshot>>,
}

#[derive(Debug, Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
    healthy: Arc<AtomicBool>,
}

impl LocalRepository {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Test hook: make `health_check` report the given state.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn device_not_found(id: &DeviceId, operation: &str) -> RepositoryError {
        RepositoryError::not_found_with_context(
            format!("Device {} not found", id),
            ErrorContext::new(operation)
                .with_entity("device")
                .with_entity_id(id),
        )
    }

    fn hub_not_found(id: &HubId, operation: &str) -> RepositoryError {
        RepositoryError::not_found_with_context(
            format!("Hub {} not found", id),
            ErrorContext::new(operation).with_entity("hub").with_entity_id(id),
        )
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.healthy.load(Ordering::SeqCst))
    }

    async fn put_device(&self, device: &Device) -> RepositoryResult<()> {
        self.data
            .write()
            .devices
            .insert(device.id.clone(), device.clone());
        Ok(())
    }

    async fn get_device(&self, id: &DeviceId) -> RepositoryResult<Device> {
        self.data
            .read()
            .devices
            .get(id)
            .cloned()
            .ok_or_else(|| Self::device_not_found(id, "get_device"))
    }

    async fn update_device_state(
        &self,
        id: &DeviceId,
        state: bool,
        power_usage: f64,
    ) -> RepositoryResult<()> {
        let mut data = self.data.write();
        let device = data
            .devices
            .get_mut(id)
            .ok_or_else(|| Self::device_not_found(id, "update_device_state"))?;
        device.state = state;
        device.power_usage = power_usage;
        Ok(())
    }

    async fn save_device(&self, device: &Device) -> RepositoryResult<()> {
        let mut data = self.data.write();
        match data.devices.get_mut(&device.id) {
            Some(existing) => {
                *existing = device.clone();
                Ok(())
            }
            None => Err(Self::device_not_found(&device.id, "save_device")),
        }
    }

    async fn delete_device(&self, id: &DeviceId) -> RepositoryResult<bool> {
        let mut data = self.data.write();
        data.device_status.remove(id);
        Ok(data.devices.remove(id).is_some())
    }

    async fn list_devices(&self) -> RepositoryResult<Vec<Device>> {
        let mut devices: Vec<Device> = self.data.read().devices.values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(devices)
    }

    async fn add_device_status(
        &self,
        id: &DeviceId,
        data: Map<String, Value>,
    ) -> RepositoryResult<DeviceStatus> {
        let mut store = self.data.write();
        if !store.devices.contains_key(id) {
            return Err(Self::device_not_found(id, "add_device_status"));
        }
        let status = DeviceStatus {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            data,
        };
        store
            .device_status
            .entry(id.clone())
            .or_default()
            .push(status.clone());
        Ok(status)
    }

    async fn device_status_history(
        &self,
        id: &DeviceId,
        limit: usize,
    ) -> RepositoryResult<Vec<DeviceStatus>> {
        let data = self.data.read();
        let mut history = data.device_status.get(id).cloned().unwrap_or_default();
        history.sort_by_key(|s| s.timestamp);
        let skip = history.len().saturating_sub(limit);
        Ok(history.into_iter().skip(skip).collect())
    }
}

#[async_trait]
impl HubRepository for LocalRepository {
    async fn put_hub(&self, hub: &Hub) -> RepositoryResult<()> {
        self.data.write().hubs.insert(hub.id.clone(), hub.clone());
        Ok(())
    }

    async fn get_hub(&self, id: &HubId) -> RepositoryResult<Hub> {
        self.data
            .read()
            .hubs
            .get(id)
            .cloned()
            .ok_or_else(|| Self::hub_not_found(id, "get_hub"))
    }

    async fn list_hubs(&self) -> RepositoryResult<Vec<Hub>> {
        let mut hubs: Vec<Hub> = self.data.read().hubs.values().cloned().collect();
        hubs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(hubs)
    }

    async fn update_hub(&self, hub: &Hub) -> RepositoryResult<()> {
        let mut data = self.data.write();
        match data.hubs.get_mut(&hub.id) {
            Some(existing) => {
                *existing = hub.clone();
                Ok(())
            }
            None => Err(Self::hub_not_found(&hub.id, "update_hub")),
        }
    }

    async fn delete_hub(&self, id: &HubId) -> RepositoryResult<bool> {
        let mut data = self.data.write();
        data.snapshots.remove(id);
        Ok(data.hubs.remove(id).is_some())
    }
}

#[async_trait]
impl PoolRepository for LocalRepository {
    async fn add_to_pool(&self, id: &str) -> RepositoryResult<()> {
        self.data.write().pool.insert(id.to_string());
        Ok(())
    }

    async fn is_in_pool(&self, id: &str) -> RepositoryResult<bool> {
        Ok(self.data.read().pool.contains(id))
    }

    async fn remove_from_pool(&self, id: &str) -> RepositoryResult<bool> {
        Ok(self.data.write().pool.remove(id))
    }

    async fn list_pool(&self) -> RepositoryResult<Vec<String>> {
        Ok(self.data.read().pool.iter().cloned().collect())
    }
}

#[async_trait]
impl UserRepository for LocalRepository {
    async fn get_user(&self, id: &UserId) -> RepositoryResult<Option<User>> {
        Ok(self.data.read().users.get(id).cloned())
    }

    async fn put_user(&self, user: &User) -> RepositoryResult<()> {
        self.data.write().users.insert(user.id.clone(), user.clone());
        Ok(())
    }
}

#[async_trait]
impl UsageSnapshotRepository for LocalRepository {
    async fn put_usage_snapshot(
        &self,
        hub_id: &HubId,
        key: &str,
        snapshot: &UsageSnapshot,
    ) -> RepositoryResult<()> {
        self.data
            .write()
            .snapshots
            .entry(hub_id.clone())
            .or_default()
            .insert(key.to_string(), snapshot.clone());
        Ok(())
    }

    async fn usage_snapshots(
        &self,
        hub_id: &HubId,
    ) -> RepositoryResult<Vec<(String, UsageSnapshot)>> {
        Ok(self
            .data
            .read()
            .snapshots
            .get(hub_id)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn latest_usage_snapshot(
        &self,
        hub_id: &HubId,
    ) -> RepositoryResult<Option<(String, UsageSnapshot)>> {
        Ok(self
            .data
            .read()
            .snapshots
            .get(hub_id)
            .and_then(|entries| entries.iter().next_back())
            .map(|(k, v)| (k.clone(), v.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceType;

    #[tokio::test]
    async fn test_health_toggle() {
        let repo = LocalRepository::new();
        assert!(repo.health_check().await.unwrap());
        repo.set_healthy(false);
        assert!(!repo.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_device_is_not_found() {
        let repo = LocalRepository::new();
        let err = repo.get_device(&DeviceId::from("DEV_x")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
        assert_eq!(err.context().entity.as_deref(), Some("device"));
    }

    #[tokio::test]
    async fn test_update_device_state_keeps_other_fields() {
        let repo = LocalRepository::new();
        let device = Device::new(DeviceType::Light).unwrap();
        repo.put_device(&device).await.unwrap();

        repo.update_device_state(&device.id, true, 10.0).await.unwrap();
        let stored = repo.get_device(&device.id).await.unwrap();
        assert!(stored.state);
        assert_eq!(stored.power_usage, 10.0);
        assert_eq!(stored.name, device.name);
    }

    #[tokio::test]
    async fn test_latest_snapshot_uses_highest_key() {
        let repo = LocalRepository::new();
        let hub = HubId::from("HUB_1");
        let snapshot = |total: f64| UsageSnapshot {
            total_usage: total,
            timestamp: Utc::now(),
            devices: Default::default(),
        };
        repo.put_usage_snapshot(&hub, "2024_03_01_10_30_00", &snapshot(2.0))
            .await
            .unwrap();
        repo.put_usage_snapshot(&hub, "2024_03_01_10_15_00", &snapshot(1.0))
            .await
            .unwrap();

        let (key, latest) = repo.latest_usage_snapshot(&hub).await.unwrap().unwrap();
        assert_eq!(key, "2024_03_01_10_30_00");
        assert_eq!(latest.total_usage, 2.0);
        assert!(repo
            .latest_usage_snapshot(&HubId::from("HUB_2"))
            .await
            .unwrap()
            .is_none());
    }
}

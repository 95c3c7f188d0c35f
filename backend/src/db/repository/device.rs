//! Device records and their status history.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::error::RepositoryResult;
use crate::models::{Device, DeviceId, DeviceStatus};

/// Number of status records returned when no limit is given.
pub const DEFAULT_STATUS_HISTORY_LIMIT: usize = 100;

/// Repository trait for device records.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Check that the store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Create or replace a device record.
    async fn put_device(&self, device: &Device) -> RepositoryResult<()>;

    /// Fetch a device.
    ///
    /// # Returns
    /// * `Ok(Device)` - The stored record
    /// * `Err(RepositoryError::NotFound)` - If no device has this id
    async fn get_device(&self, id: &DeviceId) -> RepositoryResult<Device>;

    /// Set the power state and the instantaneous draw of a device.
    ///
    /// Other fields are left untouched.
    async fn update_device_state(
        &self,
        id: &DeviceId,
        state: bool,
        power_usage: f64,
    ) -> RepositoryResult<()>;

    /// Persist a device after a local control operation. Fails with
    /// `NotFound` when the device was deleted in the meantime.
    async fn save_device(&self, device: &Device) -> RepositoryResult<()>;

    /// Delete a device. Returns whether a record existed.
    async fn delete_device(&self, id: &DeviceId) -> RepositoryResult<bool>;

    async fn list_devices(&self) -> RepositoryResult<Vec<Device>>;

    /// Append a status record stamped with the server time.
    async fn add_device_status(
        &self,
        id: &DeviceId,
        data: Map<String, Value>,
    ) -> RepositoryResult<DeviceStatus>;

    /// The last `limit` status records, oldest first.
    async fn device_status_history(
        &self,
        id: &DeviceId,
        limit: usize,
    ) -> RepositoryResult<Vec<DeviceStatus>>;
}

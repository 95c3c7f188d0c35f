//! Repository-agnostic business rules for devices, hubs and users.
//!
//! These functions accept any [`FullRepository`] so the same rules run
//! against the in-memory store in tests and in the server.

use log::{info, warn};
use serde_json::{Map, Value};

use super::repository::{ErrorContext, FullRepository, RepositoryError, RepositoryResult};
use crate::models::{is_hub_id, Device, DeviceId, Hub, HubId, HubType, PoolItem, User, UserId};

/// Check that the document store is reachable.
pub async fn health_check(repo: &dyn FullRepository) -> RepositoryResult<bool> {
    repo.health_check().await
}

/// Store a freshly commissioned record and put its id in the free pool.
///
/// Hub ids (`HUB_` prefix) are stored as unclaimed hubs regardless of the
/// record passed in; everything else is stored as a device.
pub async fn add_to_device_pool(
    repo: &dyn FullRepository,
    id: &str,
    item: PoolItem,
) -> RepositoryResult<()> {
    match item {
        PoolItem::Hub(hub) => store_unclaimed_hub(repo, id, hub).await?,
        PoolItem::Device(device) if is_hub_id(id) => {
            let hub = Hub::new(HubId::from(id), Some(device.name));
            store_unclaimed_hub(repo, id, hub).await?
        }
        PoolItem::Device(mut device) => {
            device.id = DeviceId::from(id);
            repo.put_device(&device).await?;
        }
    }

    repo.add_to_pool(id).await?;
    info!("Added {} to the device pool", id);
    Ok(())
}

async fn store_unclaimed_hub(repo: &dyn FullRepository, id: &str, hub: Hub) -> RepositoryResult<()> {
    let hub = Hub {
        id: HubId::from(id),
        hub_type: HubType::Residential,
        owner: None,
        shared_with: Vec::new(),
        devices: Vec::new(),
        ..hub
    };
    repo.put_hub(&hub).await
}

/// Attach a device to a hub and take it out of the free pool.
///
/// Assigning a device that is already in the hub's list is a no-op for the
/// list, so retries are safe.
pub async fn assign_device_to_hub(
    repo: &dyn FullRepository,
    device_id: &DeviceId,
    hub_id: &HubId,
) -> RepositoryResult<()> {
    let mut device = repo
        .get_device(device_id)
        .await
        .map_err(|e| e.with_operation("assign_device_to_hub"))?;
    let mut hub = repo
        .get_hub(hub_id)
        .await
        .map_err(|e| e.with_operation("assign_device_to_hub"))?;

    device.hub_id = Some(hub_id.clone());
    repo.save_device(&device).await?;
    repo.remove_from_pool(device_id.as_str()).await?;

    if !hub.contains_device(device_id) {
        hub.devices.push(device_id.clone());
        repo.update_hub(&hub).await?;
    }

    info!("Assigned device {} to hub {}", device_id, hub_id);
    Ok(())
}

/// Detach a device from a hub and delete its record.
pub async fn remove_device_from_hub(
    repo: &dyn FullRepository,
    hub_id: &HubId,
    device_id: &DeviceId,
) -> RepositoryResult<()> {
    let mut hub = repo.get_hub(hub_id).await?;
    let position = hub
        .devices
        .iter()
        .position(|d| d == device_id)
        .ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("Device {} is not part of hub {}", device_id, hub_id),
                ErrorContext::new("remove_device_from_hub")
                    .with_entity("device")
                    .with_entity_id(device_id),
            )
        })?;

    hub.devices.remove(position);
    repo.update_hub(&hub).await?;
    if !repo.delete_device(device_id).await? {
        warn!(
            "Device {} was listed in hub {} but had no record",
            device_id, hub_id
        );
    }

    info!("Removed device {} from hub {}", device_id, hub_id);
    Ok(())
}

/// Store a hub as owned by `owner`, with no shares and no devices.
pub async fn create_hub(
    repo: &dyn FullRepository,
    hub_id: &HubId,
    owner: &UserId,
    hub: Hub,
) -> RepositoryResult<Hub> {
    let hub = Hub {
        id: hub_id.clone(),
        owner: Some(owner.clone()),
        shared_with: Vec::new(),
        devices: Vec::new(),
        ..hub
    };
    repo.put_hub(&hub).await?;
    info!("Created hub {} for user {}", hub_id, owner);
    Ok(hub)
}

/// Grant `user` access to a hub. Returns `false` if they already had it.
pub async fn share_hub_access(
    repo: &dyn FullRepository,
    hub_id: &HubId,
    user: &UserId,
) -> RepositoryResult<bool> {
    let mut hub = repo.get_hub(hub_id).await?;
    if hub.shared_with.contains(user) {
        return Ok(false);
    }
    hub.shared_with.push(user.clone());
    repo.update_hub(&hub).await?;
    info!("Shared hub {} with user {}", hub_id, user);
    Ok(true)
}

/// True when `user` owns the hub or it has been shared with them.
///
/// A missing hub grants no access.
pub async fn check_hub_access(
    repo: &dyn FullRepository,
    hub_id: &HubId,
    user: &UserId,
) -> RepositoryResult<bool> {
    match repo.get_hub(hub_id).await {
        Ok(hub) => Ok(hub.has_access(user)),
        Err(RepositoryError::NotFound { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Create a user record unless one already exists.
///
/// Returns the stored user either way.
pub async fn setup_new_user(
    repo: &dyn FullRepository,
    user_id: &UserId,
    profile: Map<String, Value>,
) -> RepositoryResult<User> {
    if let Some(existing) = repo.get_user(user_id).await? {
        return Ok(existing);
    }

    let user = User::new(user_id.clone(), profile);
    repo.put_user(&user).await?;
    info!("Set up new user {}", user_id);
    Ok(user)
}

/// Device records of a hub in list order. Ids without a record are skipped.
pub async fn hub_devices(repo: &dyn FullRepository, hub_id: &HubId) -> RepositoryResult<Vec<Device>> {
    let hub = repo.get_hub(hub_id).await?;
    let mut devices = Vec::with_capacity(hub.devices.len());
    for device_id in &hub.devices {
        match repo.get_device(device_id).await {
            Ok(device) => devices.push(device),
            Err(RepositoryError::NotFound { .. }) => {
                warn!("Hub {} lists missing device {}", hub_id, device_id);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(devices)
}

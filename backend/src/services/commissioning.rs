//! Factory-floor commissioning: new devices and hubs enter the free pool.

use log::info;
use std::sync::Arc;

use crate::db::repository::FullRepository;
use crate::db::services;
use crate::error::{DomainError, DomainResult};
use crate::models::{Device, DeviceId, DeviceType, Hub, HubId, HubVariant, PoolItem};

#[derive(Clone)]
pub struct CommissioningService {
    repository: Arc<dyn FullRepository>,
}

impl CommissioningService {
    pub fn new(repository: Arc<dyn FullRepository>) -> Self {
        Self { repository }
    }

    /// Build a default device of `device_type` and pool it.
    pub async fn spawn_device(&self, device_type: DeviceType) -> DomainResult<DeviceId> {
        let device = Device::new(device_type)?;
        let id = device.id.clone();
        services::add_to_device_pool(self.repository.as_ref(), id.as_str(), PoolItem::Device(device))
            .await?;
        info!("Spawned {} device {}", device_type, id);
        Ok(id)
    }

    /// Build an unclaimed hub and pool it. Only residential hubs exist.
    pub async fn create_hub(&self, variant: HubVariant, name: Option<String>) -> DomainResult<HubId> {
        if variant != HubVariant::Residential {
            return Err(DomainError::unsupported(format!(
                "Hub variant {} is not supported",
                variant.type_code()
            )));
        }

        let hub = Hub::new(HubId::generate(), name);
        let id = hub.id.clone();
        services::add_to_device_pool(self.repository.as_ref(), id.as_str(), PoolItem::Hub(hub)).await?;
        info!("Created residential hub {}", id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::db::repository::{DeviceRepository, HubRepository, PoolRepository};

    #[tokio::test]
    async fn test_spawn_device_pools_it() {
        let repo = Arc::new(LocalRepository::new());
        let service = CommissioningService::new(repo.clone());

        let id = service.spawn_device(DeviceType::Thermostat).await.unwrap();
        assert!(repo.is_in_pool(id.as_str()).await.unwrap());
        let device = repo.get_device(&id).await.unwrap();
        assert_eq!(device.device_type(), DeviceType::Thermostat);
        assert_eq!(device.power_rating, 1000.0);
    }

    #[tokio::test]
    async fn test_plug_and_manager_are_unsupported() {
        let repo = Arc::new(LocalRepository::new());
        let service = CommissioningService::new(repo.clone());

        assert!(matches!(
            service.spawn_device(DeviceType::Plug).await,
            Err(DomainError::Unsupported(_))
        ));
        assert!(matches!(
            service.create_hub(HubVariant::Manager, None).await,
            Err(DomainError::Unsupported(_))
        ));
        assert!(repo.list_pool().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_hub_uses_name() {
        let repo = Arc::new(LocalRepository::new());
        let service = CommissioningService::new(repo.clone());

        let id = service
            .create_hub(HubVariant::Residential, Some("Cabin".into()))
            .await
            .unwrap();
        assert!(id.as_str().starts_with("HUB_"));
        assert_eq!(repo.get_hub(&id).await.unwrap().name, "Cabin");
        assert!(repo.is_in_pool(id.as_str()).await.unwrap());
    }
}

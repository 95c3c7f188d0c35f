//! Device control: apply a command, persist it, keep hub workers in sync.

use log::info;

use super::manipulator::Manipulator;
use crate::db::repository::FullRepository;
use crate::error::DomainResult;
use crate::models::{Device, DeviceId, HubId, ThermostatMode};

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    SetState(bool),
    Brightness(i64),
    Color(String),
    TargetTemp(f64),
    Mode(ThermostatMode),
    CurrentTemp(f64),
}

/// Set a device's power state and notify the worker of its hub.
///
/// `hub_id` overrides the hub stored on the device.
pub async fn set_device_state(
    repo: &dyn FullRepository,
    manipulator: &Manipulator,
    device_id: &DeviceId,
    hub_id: Option<&HubId>,
    state: bool,
) -> DomainResult<Device> {
    let mut device = repo.get_device(device_id).await?;
    device.set_state(state);
    repo.update_device_state(device_id, device.state, device.power_usage)
        .await?;

    if let Some(hub_id) = hub_id.or(device.hub_id.as_ref()) {
        manipulator.update_device_state(hub_id, device_id, state);
    }
    info!("Device {} switched {}", device_id, if state { "on" } else { "off" });
    Ok(device)
}

/// Apply a control command and store the result.
pub async fn apply_command(
    repo: &dyn FullRepository,
    manipulator: &Manipulator,
    device_id: &DeviceId,
    command: DeviceCommand,
) -> DomainResult<Device> {
    let mut device = repo.get_device(device_id).await?;
    let was_on = device.state;
    match command {
        DeviceCommand::SetState(state) => device.set_state(state),
        DeviceCommand::Brightness(value) => device.set_brightness(value)?,
        DeviceCommand::Color(value) => device.set_color(&value)?,
        DeviceCommand::TargetTemp(value) => device.set_target_temp(value)?,
        DeviceCommand::Mode(mode) => device.set_mode(mode)?,
        DeviceCommand::CurrentTemp(value) => device.update_current_temp(value)?,
    }
    repo.save_device(&device).await?;

    if device.state != was_on {
        if let Some(hub_id) = &device.hub_id {
            manipulator.update_device_state(hub_id, device_id, device.state);
        }
    }
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::db::repository::DeviceRepository;
    use crate::error::DomainError;
    use crate::ledger::LocalLedger;
    use crate::models::{DeviceKind, DeviceType};
    use crate::telemetry::NoopPublisher;
    use std::sync::Arc;

    fn manipulator(repo: Arc<LocalRepository>) -> Manipulator {
        Manipulator::new(repo, Arc::new(LocalLedger::new()), Arc::new(NoopPublisher))
    }

    #[tokio::test]
    async fn test_set_state_updates_energy() {
        let repo = Arc::new(LocalRepository::new());
        let device = Device::new(DeviceType::Light).unwrap();
        repo.put_device(&device).await.unwrap();
        let manipulator = manipulator(repo.clone());

        let updated = set_device_state(repo.as_ref(), &manipulator, &device.id, None, true)
            .await
            .unwrap();
        assert_eq!(updated.power_usage, 10.0);
        assert!(repo.get_device(&device.id).await.unwrap().state);
    }

    #[tokio::test]
    async fn test_apply_command_persists() {
        let repo = Arc::new(LocalRepository::new());
        let device = Device::new(DeviceType::Light).unwrap();
        repo.put_device(&device).await.unwrap();
        let manipulator = manipulator(repo.clone());

        apply_command(repo.as_ref(), &manipulator, &device.id, DeviceCommand::Color("#00ff00".into()))
            .await
            .unwrap();
        let stored = repo.get_device(&device.id).await.unwrap();
        assert!(matches!(stored.kind, DeviceKind::Light { ref color, .. } if color == "#00FF00"));

        let err = apply_command(
            repo.as_ref(),
            &manipulator,
            &device.id,
            DeviceCommand::Mode(ThermostatMode::Cool),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_device_is_not_found() {
        let repo = Arc::new(LocalRepository::new());
        let manipulator = manipulator(repo.clone());
        let err = apply_command(
            repo.as_ref(),
            &manipulator,
            &DeviceId::from("DEV_missing"),
            DeviceCommand::Brightness(10),
        )
        .await
        .unwrap_err();
        assert!(err.is_not_found());
    }
}

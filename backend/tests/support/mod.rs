#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use smarthome::db::repositories::LocalRepository;
use smarthome::db::repository::{DeviceRepository, HubRepository};
use smarthome::models::{Device, DeviceType, Hub, HubId};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Every variable `AppConfig::from_env` reads, cleared by default in config
/// tests so the host environment cannot leak in.
pub const CONFIG_VARS: &[&str] = &[
    "HOST",
    "PORT",
    "API_KEY",
    "LINKING_SECRET",
    "LEDGER_TYPE",
    "LEDGER_DATABASE_URL",
    "LEDGER_POOL_MAX",
    "LEDGER_MAX_RETRIES",
    "LEDGER_RETRY_DELAY_MS",
    "MQTT_ENABLED",
    "MQTT_HOST",
    "MQTT_PORT",
    "MQTT_KEEP_ALIVE_SEC",
    "MQTT_CLIENT_ID",
    "STREAM_INTERVAL_MS",
];

/// Runs `f` with environment variables temporarily modified.
///
/// Variables are restored on unwind, and access is serialized because the
/// environment is process-global while tests run in parallel.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

/// Like [`with_scoped_env`], starting from a config environment where every
/// variable in [`CONFIG_VARS`] is unset.
pub fn with_config_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let mut all: Vec<(&str, Option<&str>)> = CONFIG_VARS
        .iter()
        .filter(|k| !changes.iter().any(|(c, _)| c == *k))
        .map(|k| (*k, None))
        .collect();
    all.extend_from_slice(changes);
    with_scoped_env(&all, f)
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

/// Store a hub holding one device of each given type; returns the hub and
/// the stored devices.
pub async fn seed_hub(repo: &Arc<LocalRepository>, types: &[DeviceType]) -> (Hub, Vec<Device>) {
    let mut hub = Hub::new(HubId::generate(), Some("Test Hub".to_string()));
    let mut devices = Vec::new();
    for device_type in types {
        let mut device = Device::new(*device_type).unwrap();
        device.hub_id = Some(hub.id.clone());
        repo.put_device(&device).await.unwrap();
        hub.devices.push(device.id.clone());
        devices.push(device);
    }
    repo.put_hub(&hub).await.unwrap();
    (hub, devices)
}

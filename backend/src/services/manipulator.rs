//! Hub workers: periodic usage accounting for every active hub.
//!
//! Each hub gets a [`HubWorker`] holding one [`DeviceStateTracker`] per
//! device. A background task wakes at every quarter-hour boundary and runs
//! [`HubWorker::process_block`], which writes the block to the ledger,
//! mirrors it to the document store and publishes the hub aggregate.

use chrono::{DateTime, Duration, DurationRound, Utc};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::tracker::DeviceStateTracker;
use crate::db::repository::{FullRepository, RepositoryError, RepositoryResult};
use crate::ledger::UsageLedger;
use crate::models::{energy_wh, DeviceId, DeviceUsage, Hub, HubId, UsageBlock};
use crate::telemetry::{publish_aggregate, TelemetryPublisher};

const BLOCK_LENGTH_MINUTES: i64 = 15;

/// The next quarter-hour boundary strictly after `now`.
pub fn next_block_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let block = Duration::minutes(BLOCK_LENGTH_MINUTES);
    let floor = now.duration_trunc(block).unwrap_or(now);
    floor + block
}

/// Usage accounting for a single hub.
pub struct HubWorker {
    hub_id: HubId,
    trackers: Mutex<HashMap<DeviceId, DeviceStateTracker>>,
    repository: Arc<dyn FullRepository>,
    ledger: Arc<dyn UsageLedger>,
    publisher: Arc<dyn TelemetryPublisher>,
}

impl HubWorker {
    /// Build trackers for every device listed in `hub`, seeded with the
    /// device's stored state.
    pub async fn load(
        hub: &Hub,
        repository: Arc<dyn FullRepository>,
        ledger: Arc<dyn UsageLedger>,
        publisher: Arc<dyn TelemetryPublisher>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut trackers = HashMap::new();
        for device_id in &hub.devices {
            match repository.get_device(device_id).await {
                Ok(device) => {
                    trackers.insert(
                        device_id.clone(),
                        DeviceStateTracker::new(device_id.clone(), device.state, now),
                    );
                }
                Err(e) => warn!("Hub {} skips device {}: {}", hub.id, device_id, e),
            }
        }

        Self {
            hub_id: hub.id.clone(),
            trackers: Mutex::new(trackers),
            repository,
            ledger,
            publisher,
        }
    }

    pub fn hub_id(&self) -> &HubId {
        &self.hub_id
    }

    pub fn tracked_devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.trackers.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Record a state change. Unknown devices start being tracked.
    pub fn update_device_state(&self, device_id: &DeviceId, state: bool, now: DateTime<Utc>) {
        let mut trackers = self.trackers.lock();
        match trackers.get_mut(device_id) {
            Some(tracker) => tracker.update_state(state, now),
            None => {
                debug!("Hub {} now tracks device {}", self.hub_id, device_id);
                trackers.insert(
                    device_id.clone(),
                    DeviceStateTracker::new(device_id.clone(), state, now),
                );
            }
        }
    }

    /// Close the block ending at `now`.
    ///
    /// Devices whose record has been deleted stop being tracked. A ledger
    /// failure is returned; snapshot and telemetry failures are only logged.
    pub async fn process_block(&self, now: DateTime<Utc>) -> RepositoryResult<UsageBlock> {
        let finalized: Vec<(DeviceId, f64)> = self
            .trackers
            .lock()
            .values_mut()
            .map(|t| (t.device_id.clone(), t.finalize_block(now)))
            .collect();

        let mut usages = Vec::with_capacity(finalized.len());
        for (device_id, active_minutes) in finalized {
            match self.repository.get_device(&device_id).await {
                Ok(device) => usages.push(DeviceUsage {
                    power_usage: energy_wh(device.power_rating, active_minutes),
                    device_id,
                    active_minutes,
                }),
                Err(RepositoryError::NotFound { .. }) => {
                    info!("Device {} is gone; hub {} stops tracking it", device_id, self.hub_id);
                    self.trackers.lock().remove(&device_id);
                }
                Err(e) => warn!("Skipping device {} in this block: {}", device_id, e),
            }
        }
        usages.sort_by(|a, b| a.device_id.cmp(&b.device_id));

        let block = UsageBlock::new(self.hub_id.clone(), now, usages);
        self.ledger.record_block(&block).await?;

        let key = block.snapshot_key();
        if let Err(e) = self
            .repository
            .put_usage_snapshot(&self.hub_id, &key, &block.to_snapshot())
            .await
        {
            error!("Failed to store usage snapshot {} for hub {}: {}", key, self.hub_id, e);
        }

        if let Err(e) =
            publish_aggregate(self.publisher.as_ref(), &self.hub_id, aggregate_payload(&block)).await
        {
            warn!("Failed to publish aggregate for hub {}: {}", self.hub_id, e);
        }

        info!(
            "Hub {} block {}: {:.3} Wh across {} devices",
            self.hub_id,
            key,
            block.total_usage,
            block.devices.len()
        );
        Ok(block)
    }
}

fn aggregate_payload(block: &UsageBlock) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("total_usage".to_string(), Value::from(block.total_usage));
    data.insert("block_timestamp".to_string(), Value::from(block.timestamp.to_rfc3339()));
    if let Ok(devices) = serde_json::to_value(&block.to_snapshot().devices) {
        data.insert("devices".to_string(), devices);
    }
    data
}

async fn run_worker(worker: Arc<HubWorker>, mut stop: oneshot::Receiver<()>) {
    loop {
        let now = Utc::now();
        let boundary = next_block_boundary(now);
        let wait = (boundary - now).to_std().unwrap_or_default();
        debug!("Hub {} sleeps until {}", worker.hub_id, boundary);

        tokio::select! {
            _ = &mut stop => break,
            _ = tokio::time::sleep(wait) => {
                if let Err(e) = worker.process_block(Utc::now()).await {
                    error!("Hub {} failed to record usage block: {}", worker.hub_id, e);
                }
            }
        }
    }
    info!("Hub worker {} stopped", worker.hub_id);
}

struct WorkerHandle {
    worker: Arc<HubWorker>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns one [`HubWorker`] per active hub.
pub struct Manipulator {
    repository: Arc<dyn FullRepository>,
    ledger: Arc<dyn UsageLedger>,
    publisher: Arc<dyn TelemetryPublisher>,
    workers: Mutex<HashMap<HubId, WorkerHandle>>,
}

impl Manipulator {
    pub fn new(
        repository: Arc<dyn FullRepository>,
        ledger: Arc<dyn UsageLedger>,
        publisher: Arc<dyn TelemetryPublisher>,
    ) -> Self {
        Self {
            repository,
            ledger,
            publisher,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Start a worker for every stored hub. Returns how many were started.
    pub async fn initialize_hubs(&self) -> RepositoryResult<usize> {
        let hubs = self.repository.list_hubs().await?;
        let mut started = 0;
        for hub in &hubs {
            if self.add_hub(hub).await {
                started += 1;
            }
        }
        info!("Initialized {} hub workers", started);
        Ok(started)
    }

    /// Start a worker for `hub` unless one is already running.
    pub async fn add_hub(&self, hub: &Hub) -> bool {
        if self.workers.lock().contains_key(&hub.id) {
            return false;
        }

        let worker = Arc::new(
            HubWorker::load(
                hub,
                self.repository.clone(),
                self.ledger.clone(),
                self.publisher.clone(),
                Utc::now(),
            )
            .await,
        );

        let mut workers = self.workers.lock();
        if workers.contains_key(&hub.id) {
            return false;
        }
        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_worker(worker.clone(), stop_rx));
        workers.insert(hub.id.clone(), WorkerHandle { worker, stop, task });
        info!("Started worker for hub {}", hub.id);
        true
    }

    /// Look the hub up and start its worker.
    pub async fn add_hub_by_id(&self, hub_id: &HubId) -> RepositoryResult<bool> {
        let hub = self.repository.get_hub(hub_id).await?;
        Ok(self.add_hub(&hub).await)
    }

    /// Forward a state change to the hub's worker. Returns `false` when the
    /// hub has no worker.
    pub fn update_device_state(&self, hub_id: &HubId, device_id: &DeviceId, state: bool) -> bool {
        match self.worker(hub_id) {
            Some(worker) => {
                worker.update_device_state(device_id, state, Utc::now());
                true
            }
            None => {
                debug!("Ignoring state change for {} on unknown hub {}", device_id, hub_id);
                false
            }
        }
    }

    pub fn worker(&self, hub_id: &HubId) -> Option<Arc<HubWorker>> {
        self.workers.lock().get(hub_id).map(|h| h.worker.clone())
    }

    pub fn hub_ids(&self) -> Vec<HubId> {
        let mut ids: Vec<HubId> = self.workers.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Signal every worker and wait for it to exit.
    pub async fn stop_all(&self) {
        let handles: Vec<(HubId, WorkerHandle)> = self.workers.lock().drain().collect();
        for (hub_id, handle) in handles {
            let _ = handle.stop.send(());
            if let Err(e) = handle.task.await {
                error!("Hub worker {} ended abnormally: {}", hub_id, e);
            }
        }
    }
}

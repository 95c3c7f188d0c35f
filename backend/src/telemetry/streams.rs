//! Periodic per-device telemetry streams.

use chrono::Utc;
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{device_topic, TelemetryError, TelemetryPublisher, TelemetryResult};
use crate::db::repository::FullRepository;
use crate::models::DeviceId;

/// Pause after a failed read or publish before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);
/// How long `stop_device_stream` waits for the task to finish.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

struct StreamHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the background tasks that publish device snapshots.
pub struct StreamManager {
    repository: Arc<dyn FullRepository>,
    publisher: Arc<dyn TelemetryPublisher>,
    streams: Mutex<HashMap<DeviceId, StreamHandle>>,
}

impl StreamManager {
    pub fn new(
        repository: Arc<dyn FullRepository>,
        publisher: Arc<dyn TelemetryPublisher>,
    ) -> Self {
        Self {
            repository,
            publisher,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Start publishing `device_id` every `interval`.
    ///
    /// Fails with [`TelemetryError::AlreadyStreaming`] while a stream for the
    /// device is running.
    pub fn start_device_stream(&self, device_id: &DeviceId, interval: Duration) -> TelemetryResult<()> {
        let mut streams = self.streams.lock();
        if let Some(existing) = streams.get(device_id) {
            if !existing.task.is_finished() {
                return Err(TelemetryError::AlreadyStreaming(device_id.clone()));
            }
        }

        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(stream_device(
            self.repository.clone(),
            self.publisher.clone(),
            device_id.clone(),
            interval,
            stop_rx,
        ));
        streams.insert(device_id.clone(), StreamHandle { stop, task });
        info!("Started telemetry stream for {} every {:?}", device_id, interval);
        Ok(())
    }

    /// Stop a stream. Returns whether one existed.
    pub async fn stop_device_stream(&self, device_id: &DeviceId) -> bool {
        let handle = self.streams.lock().remove(device_id);
        match handle {
            Some(handle) => {
                shutdown(device_id, handle).await;
                true
            }
            None => false,
        }
    }

    pub fn active_streams(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self
            .streams
            .lock()
            .iter()
            .filter(|(_, handle)| !handle.task.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn stop_all(&self) {
        let handles: Vec<(DeviceId, StreamHandle)> = self.streams.lock().drain().collect();
        for (device_id, handle) in handles {
            shutdown(&device_id, handle).await;
        }
    }
}

async fn shutdown(device_id: &DeviceId, handle: StreamHandle) {
    let StreamHandle { stop, mut task } = handle;
    let _ = stop.send(());
    if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
        warn!("Stream for {} did not stop in time; aborting", device_id);
        task.abort();
    }
    info!("Stopped telemetry stream for {}", device_id);
}

async fn stream_device(
    repository: Arc<dyn FullRepository>,
    publisher: Arc<dyn TelemetryPublisher>,
    device_id: DeviceId,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let topic = device_topic(&device_id);
    loop {
        let wait = match repository.get_device(&device_id).await {
            Ok(device) => {
                let message = device.telemetry_message(Utc::now());
                let published = match serde_json::to_value(&message) {
                    Ok(payload) => publisher.publish(&topic, &payload).await,
                    Err(e) => Err(e.into()),
                };
                match published {
                    Ok(()) => interval,
                    Err(e) => {
                        warn!("Telemetry publish for {} failed: {}", device_id, e);
                        ERROR_BACKOFF
                    }
                }
            }
            Err(e) => {
                warn!("Telemetry stream could not read {}: {}", device_id, e);
                ERROR_BACKOFF
            }
        };

        tokio::select! {
            _ = &mut stop => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::db::repository::DeviceRepository;
    use crate::models::{Device, DeviceType};
    use crate::telemetry::RecordingPublisher;

    #[tokio::test]
    async fn test_stream_lifecycle() {
        let repo = Arc::new(LocalRepository::new());
        let device = Device::new(DeviceType::Light).unwrap();
        repo.put_device(&device).await.unwrap();
        let publisher = Arc::new(RecordingPublisher::new());
        let manager = StreamManager::new(repo.clone(), publisher.clone());

        manager
            .start_device_stream(&device.id, Duration::from_millis(20))
            .unwrap();
        assert!(matches!(
            manager.start_device_stream(&device.id, Duration::from_millis(20)),
            Err(TelemetryError::AlreadyStreaming(_))
        ));
        assert_eq!(manager.active_streams(), vec![device.id.clone()]);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(manager.stop_device_stream(&device.id).await);
        assert!(!manager.stop_device_stream(&device.id).await);
        assert!(manager.active_streams().is_empty());

        let messages = publisher.messages_for(&device_topic(&device.id));
        assert!(!messages.is_empty());
        assert_eq!(messages[0]["device_id"], device.id.as_str());
        assert_eq!(messages[0]["type"], "LIGHT");
    }

    #[tokio::test]
    async fn test_stop_all() {
        let repo = Arc::new(LocalRepository::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let manager = StreamManager::new(repo, publisher);

        manager
            .start_device_stream(&DeviceId::from("DEV_a"), Duration::from_millis(50))
            .unwrap();
        manager
            .start_device_stream(&DeviceId::from("DEV_b"), Duration::from_millis(50))
            .unwrap();
        manager.stop_all().await;
        assert!(manager.active_streams().is_empty());
    }
}

//! Telemetry publishing.
//!
//! Device snapshots and hub aggregates are published as JSON on MQTT
//! topics. The [`TelemetryPublisher`] trait lets tests record messages and
//! lets the server run without a broker.

#[cfg(feature = "mqtt")]
pub mod mqtt;
pub mod streams;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::{DeviceId, HubId};

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttConfig, MqttPublisher};
pub use streams::StreamManager;

pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to encode telemetry payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    #[error("A stream is already active for device {0}")]
    AlreadyStreaming(DeviceId),
}

pub fn device_topic(device_id: &DeviceId) -> String {
    format!("smart_home/devices/{}/power_usage", device_id)
}

pub fn hub_aggregate_topic(hub_id: &HubId) -> String {
    format!("smart_home/hubs/{}/aggregate", hub_id)
}

#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &Value) -> TelemetryResult<()>;

    /// Release the connection. Called once at shutdown.
    async fn close(&self) {}
}

/// Publish a hub aggregate, stamping it with the hub id and current time.
pub async fn publish_aggregate(
    publisher: &dyn TelemetryPublisher,
    hub_id: &HubId,
    mut data: Map<String, Value>,
) -> TelemetryResult<()> {
    data.insert("hub_id".to_string(), Value::from(hub_id.as_str()));
    data.insert("timestamp".to_string(), Value::from(Utc::now().to_rfc3339()));
    publisher
        .publish(&hub_aggregate_topic(hub_id), &Value::Object(data))
        .await
}

/// Publisher used when MQTT is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl TelemetryPublisher for NoopPublisher {
    async fn publish(&self, topic: &str, _payload: &Value) -> TelemetryResult<()> {
        log::trace!("Dropping telemetry for {}", topic);
        Ok(())
    }
}

/// Keeps every published message in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(String, Value)>>,
    closed: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<(String, Value)> {
        self.messages.lock().clone()
    }

    pub fn messages_for(&self, topic: &str) -> Vec<Value> {
        self.messages
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl TelemetryPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &Value) -> TelemetryResult<()> {
        self.messages
            .lock()
            .push((topic.to_string(), payload.clone()));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_topics() {
        assert_eq!(
            device_topic(&DeviceId::from("DEV_1")),
            "smart_home/devices/DEV_1/power_usage"
        );
        assert_eq!(
            hub_aggregate_topic(&HubId::from("HUB_1")),
            "smart_home/hubs/HUB_1/aggregate"
        );
    }

    #[tokio::test]
    async fn test_publish_aggregate_stamps_hub() {
        let publisher = RecordingPublisher::new();
        let mut data = Map::new();
        data.insert("total_usage".into(), json!(12.5));

        publish_aggregate(&publisher, &HubId::from("HUB_1"), data)
            .await
            .unwrap();

        let messages = publisher.messages_for("smart_home/hubs/HUB_1/aggregate");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["hub_id"], "HUB_1");
        assert_eq!(messages[0]["total_usage"], 12.5);
        assert!(messages[0]["timestamp"].is_string());
    }
}

//! MQTT publisher backed by `rumqttc`.

use async_trait::async_trait;
use log::{info, warn};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{TelemetryError, TelemetryPublisher, TelemetryResult};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_sec: u64,
    pub client_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "test.mosquitto.org".to_string(),
            port: 1883,
            keep_alive_sec: 60,
            client_id: format!("smart_home_{}", &Uuid::new_v4().simple().to_string()[..8]),
        }
    }
}

/// Publishes JSON payloads with QoS 1.
///
/// The event loop runs on its own task and keeps reconnecting after
/// connection errors. Publishing never waits on the broker: when the
/// outgoing queue is full the message is rejected.
pub struct MqttPublisher {
    client: AsyncClient,
    event_loop: JoinHandle<()>,
}

impl MqttPublisher {
    /// Start the client. Must be called inside a Tokio runtime.
    pub fn connect(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_sec));

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let broker = format!("{}:{}", config.host, config.port);

        let handle = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker {}", broker);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            "MQTT connection to {} failed: {}; retrying in {:?}",
                            broker, e, RECONNECT_DELAY
                        );
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        Self {
            client,
            event_loop: handle,
        }
    }

    /// Send a disconnect and stop the event loop.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("MQTT disconnect failed: {}", e);
        }
        self.event_loop.abort();
    }
}

#[async_trait]
impl TelemetryPublisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: &Value) -> TelemetryResult<()> {
        let bytes = serde_json::to_vec(payload)?;
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, bytes)
            .map_err(|e| TelemetryError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn close(&self) {
        self.disconnect().await;
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

//! Application state for the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, DEFAULT_API_KEY, DEFAULT_STREAM_INTERVAL_MS};
use crate::db::repository::FullRepository;
use crate::ledger::UsageLedger;
use crate::services::{CommissioningService, LinkingService, Manipulator};
use crate::telemetry::{StreamManager, TelemetryPublisher};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn FullRepository>,
    pub ledger: Arc<dyn UsageLedger>,
    pub manipulator: Arc<Manipulator>,
    pub streams: Arc<StreamManager>,
    pub publisher: Arc<dyn TelemetryPublisher>,
    pub commissioning: CommissioningService,
    pub linking: LinkingService,
    /// Expected `X-API-Key` value
    pub api_key: Arc<str>,
    pub stream_interval: Duration,
}

impl AppState {
    /// Wire the services around the given stores with default settings.
    pub fn new(
        repository: Arc<dyn FullRepository>,
        ledger: Arc<dyn UsageLedger>,
        publisher: Arc<dyn TelemetryPublisher>,
    ) -> Self {
        let manipulator = Arc::new(Manipulator::new(
            repository.clone(),
            ledger.clone(),
            publisher.clone(),
        ));
        Self {
            streams: Arc::new(StreamManager::new(repository.clone(), publisher.clone())),
            publisher,
            commissioning: CommissioningService::new(repository.clone()),
            linking: LinkingService::new(repository.clone(), None),
            repository,
            ledger,
            manipulator,
            api_key: Arc::from(DEFAULT_API_KEY),
            stream_interval: Duration::from_millis(DEFAULT_STREAM_INTERVAL_MS),
        }
    }

    pub fn from_config(
        repository: Arc<dyn FullRepository>,
        ledger: Arc<dyn UsageLedger>,
        publisher: Arc<dyn TelemetryPublisher>,
        config: &AppConfig,
    ) -> Self {
        let state = Self::new(repository, ledger, publisher)
            .with_api_key(&config.api_key)
            .with_stream_interval(config.stream_interval);
        match &config.linking_secret {
            Some(secret) => state.with_linking_secret(secret),
            None => state,
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Arc::from(api_key);
        self
    }

    pub fn with_linking_secret(mut self, secret: &str) -> Self {
        self.linking = LinkingService::new(self.repository.clone(), Some(secret));
        self
    }

    pub fn with_stream_interval(mut self, interval: Duration) -> Self {
        self.stream_interval = interval;
        self
    }

    /// Stop streams and hub workers, then close the telemetry connection.
    pub async fn shutdown(&self) {
        self.streams.stop_all().await;
        self.manipulator.stop_all().await;
        self.publisher.close().await;
    }
}

#[cfg(all(test, feature = "local-ledger"))]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::ledger::LocalLedger;
    use crate::telemetry::RecordingPublisher;

    #[tokio::test]
    async fn test_shutdown_closes_publisher() {
        let publisher = Arc::new(RecordingPublisher::new());
        let state = AppState::new(
            Arc::new(LocalRepository::new()),
            Arc::new(LocalLedger::new()),
            publisher.clone(),
        );
        state.manipulator.initialize_hubs().await.unwrap();

        state.shutdown().await;
        assert!(publisher.is_closed());
        assert!(state.manipulator.hub_ids().is_empty());
        assert!(state.streams.active_streams().is_empty());
    }
}

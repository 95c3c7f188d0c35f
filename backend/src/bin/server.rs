//! Smart Home HTTP Server Binary
//!
//! Main entry point for the smart home REST API. It builds the document
//! repository, the usage ledger and the telemetry publisher, starts the hub
//! workers and serves the router.
//!
//! # Usage
//!
//! ```bash
//! # SQLite ledger in ./smart_home.db (default)
//! cargo run --bin smarthome-server
//!
//! # In-memory ledger, no MQTT broker
//! LEDGER_TYPE=local MQTT_ENABLED=false cargo run --bin smarthome-server
//! ```
//!
//! # Environment Variables
//!
//! - `HOST`: Server host (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8000)
//! - `API_KEY`: Value expected in the `X-API-Key` header
//! - `LEDGER_TYPE`, `LEDGER_DATABASE_URL`: Usage ledger backend
//! - `MQTT_ENABLED`, `MQTT_HOST`, `MQTT_PORT`: Telemetry broker
//! - `RUST_LOG`: Log level (default: info)

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use smarthome::db::repositories::LocalRepository;
use smarthome::http::{create_router, AppState};
use smarthome::ledger::LedgerFactory;
use smarthome::telemetry::{NoopPublisher, TelemetryPublisher};
use smarthome::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting Smart Home server");

    let config = AppConfig::from_env()?;

    let repository = Arc::new(LocalRepository::new());
    let ledger = LedgerFactory::create(config.ledger_type, Some(&config.ledger)).await?;
    info!("Usage ledger initialized ({:?})", config.ledger_type);

    let publisher = telemetry_publisher(&config);

    let state = AppState::from_config(repository, ledger, publisher, &config);
    let hubs = state.manipulator.initialize_hubs().await?;
    info!("Started {} hub workers", hubs);

    let app = create_router(state.clone());

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping hub workers and telemetry streams");
    state.shutdown().await;

    Ok(())
}

#[cfg(feature = "mqtt")]
fn telemetry_publisher(config: &AppConfig) -> Arc<dyn TelemetryPublisher> {
    if config.mqtt_enabled {
        info!("Publishing telemetry to {}:{}", config.mqtt.host, config.mqtt.port);
        Arc::new(smarthome::telemetry::MqttPublisher::connect(&config.mqtt))
    } else {
        info!("MQTT disabled; telemetry is discarded");
        Arc::new(NoopPublisher)
    }
}

#[cfg(not(feature = "mqtt"))]
fn telemetry_publisher(config: &AppConfig) -> Arc<dyn TelemetryPublisher> {
    if config.mqtt_enabled {
        warn!("MQTT_ENABLED is set but the mqtt feature is not compiled in");
    }
    Arc::new(NoopPublisher)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

//! Process configuration from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::ledger::{LedgerFileConfig, LedgerType, SqliteLedgerConfig};
#[cfg(feature = "mqtt")]
use crate::telemetry::MqttConfig;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_API_KEY: &str = "test_api_key_123";
pub const DEFAULT_STREAM_INTERVAL_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Expected value of the `X-API-Key` header
    pub api_key: String,
    /// HMAC secret for linking tokens; `None` falls back to a built-in value
    pub linking_secret: Option<String>,
    pub ledger_type: LedgerType,
    pub ledger: SqliteLedgerConfig,
    pub mqtt_enabled: bool,
    #[cfg(feature = "mqtt")]
    pub mqtt: MqttConfig,
    /// Default interval for device telemetry streams
    pub stream_interval: Duration,
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Like [`parse_var`] but rejects zero.
fn parse_nonzero(name: &str, default: u64) -> Result<u64> {
    let value = parse_var(name, default)?;
    if value == 0 {
        anyhow::bail!("{} must be greater than zero", name);
    }
    Ok(value)
}

fn parse_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl AppConfig {
    /// Read the configuration.
    ///
    /// # Environment Variables
    /// - `HOST` (default `0.0.0.0`), `PORT` (default 8000)
    /// - `API_KEY` (default `test_api_key_123`)
    /// - `LINKING_SECRET`
    /// - `LEDGER_TYPE`, `LEDGER_DATABASE_URL`, `LEDGER_POOL_MAX`,
    ///   `LEDGER_MAX_RETRIES`, `LEDGER_RETRY_DELAY_MS`
    /// - `MQTT_ENABLED`, `MQTT_HOST`, `MQTT_PORT`, `MQTT_KEEP_ALIVE_SEC`,
    ///   `MQTT_CLIENT_ID`
    /// - `STREAM_INTERVAL_MS`
    ///
    /// Without `LEDGER_TYPE`, a `smarthome.toml` in the standard locations
    /// selects the ledger backend.
    pub fn from_env() -> Result<Self> {
        let (ledger_type, ledger) = Self::ledger_settings()?;

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: parse_var("PORT", DEFAULT_PORT)?,
            api_key: env::var("API_KEY").unwrap_or_else(|_| DEFAULT_API_KEY.to_string()),
            linking_secret: env::var("LINKING_SECRET").ok().filter(|s| !s.is_empty()),
            ledger_type,
            ledger,
            mqtt_enabled: parse_flag("MQTT_ENABLED", true),
            #[cfg(feature = "mqtt")]
            mqtt: Self::mqtt_settings()?,
            stream_interval: Duration::from_millis(parse_nonzero(
                "STREAM_INTERVAL_MS",
                DEFAULT_STREAM_INTERVAL_MS,
            )?),
        })
    }

    fn ledger_settings() -> Result<(LedgerType, SqliteLedgerConfig)> {
        if env::var("LEDGER_TYPE").is_err() {
            if let Ok(file) = LedgerFileConfig::from_default_location() {
                let ledger_type = file.ledger_type()?;
                return Ok((ledger_type, file.to_sqlite_config()));
            }
        }
        Ok((LedgerType::from_env(), SqliteLedgerConfig::from_env()))
    }

    #[cfg(feature = "mqtt")]
    fn mqtt_settings() -> Result<MqttConfig> {
        let defaults = MqttConfig::default();
        Ok(MqttConfig {
            host: env::var("MQTT_HOST").unwrap_or(defaults.host),
            port: parse_var("MQTT_PORT", defaults.port)?,
            keep_alive_sec: parse_var("MQTT_KEEP_ALIVE_SEC", defaults.keep_alive_sec)?,
            client_id: env::var("MQTT_CLIENT_ID").unwrap_or(defaults.client_id),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

//! Ledger configuration from the environment or a TOML file.
//!
//! ```toml
//! [ledger]
//! type = "sqlite"
//!
//! [sqlite]
//! database_url = "smart_home.db"
//! max_connections = 4
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::factory::LedgerType;
use crate::db::repository::RepositoryError;

pub const DEFAULT_DATABASE_URL: &str = "smart_home.db";

/// Connection settings for the SQLite ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteLedgerConfig {
    /// Path of the database file
    pub database_url: String,
    pub max_pool_size: u32,
    pub connection_timeout_sec: u64,
    /// Milliseconds SQLite waits on a locked database before failing
    pub busy_timeout_ms: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for SqliteLedgerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_pool_size: 4,
            connection_timeout_sec: 30,
            busy_timeout_ms: 5000,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl SqliteLedgerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `LEDGER_DATABASE_URL`: database file (default: `smart_home.db`)
    /// - `LEDGER_POOL_MAX`: maximum pool size (default: 4, at least 1)
    /// - `LEDGER_MAX_RETRIES`: maximum retry attempts (default: 3)
    /// - `LEDGER_RETRY_DELAY_MS`: initial retry delay (default: 100)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("LEDGER_DATABASE_URL")
                .unwrap_or(defaults.database_url),
            max_pool_size: env_or("LEDGER_POOL_MAX", defaults.max_pool_size).max(1),
            connection_timeout_sec: defaults.connection_timeout_sec,
            busy_timeout_ms: defaults.busy_timeout_ms,
            max_retries: env_or("LEDGER_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("LEDGER_RETRY_DELAY_MS", defaults.retry_delay_ms),
        }
    }

    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Contents of `smarthome.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerFileConfig {
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub sqlite: SqliteSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(rename = "type")]
    pub ledger_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteSettings {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            connect_timeout: default_connect_timeout(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

impl LedgerFileConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RepositoryError::configuration(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            RepositoryError::configuration(format!("Failed to parse config file: {}", e))
        })
    }

    /// Search for `smarthome.toml` in the current directory, `backend/`
    /// and the parent directory.
    pub fn from_default_location() -> Result<Self, RepositoryError> {
        let search_paths = [
            PathBuf::from("smarthome.toml"),
            PathBuf::from("backend/smarthome.toml"),
            PathBuf::from("../smarthome.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(RepositoryError::configuration(
            "No smarthome.toml found in standard locations",
        ))
    }

    pub fn ledger_type(&self) -> Result<LedgerType, RepositoryError> {
        LedgerType::from_str(&self.ledger.ledger_type).map_err(|e| {
            RepositoryError::configuration(format!("Invalid ledger type: {}", e))
        })
    }

    pub fn to_sqlite_config(&self) -> SqliteLedgerConfig {
        SqliteLedgerConfig {
            database_url: self.sqlite.database_url.clone(),
            max_pool_size: self.sqlite.max_connections.max(1),
            connection_timeout_sec: self.sqlite.connect_timeout,
            busy_timeout_ms: self.sqlite.busy_timeout_ms,
            max_retries: self.sqlite.max_retries,
            retry_delay_ms: self.sqlite.retry_delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_config() {
        let toml = r#"
[ledger]
type = "local"
"#;

        let config: LedgerFileConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.ledger_type().unwrap(), LedgerType::Local);
        assert_eq!(config.to_sqlite_config(), SqliteLedgerConfig::default());
    }

    #[test]
    fn test_parse_sqlite_config() {
        let toml = r#"
[ledger]
type = "sqlite"

[sqlite]
database_url = "/var/lib/smarthome/usage.db"
max_connections = 8
max_retries = 5
retry_delay_ms = 250
"#;

        let config: LedgerFileConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.ledger_type().unwrap(), LedgerType::Sqlite);

        let sqlite = config.to_sqlite_config();
        assert_eq!(sqlite.database_url, "/var/lib/smarthome/usage.db");
        assert_eq!(sqlite.max_pool_size, 8);
        assert_eq!(sqlite.connection_timeout_sec, 30);
        assert_eq!(sqlite.max_retries, 5);
        assert_eq!(sqlite.retry_delay_ms, 250);
    }

    #[test]
    fn test_zero_max_connections_is_raised_to_one() {
        let toml = "[ledger]\ntype = \"sqlite\"\n\n[sqlite]\nmax_connections = 0\n";
        let config: LedgerFileConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.to_sqlite_config().max_pool_size, 1);
    }

    #[test]
    fn test_unknown_ledger_type_rejected() {
        let config: LedgerFileConfig = toml::from_str("[ledger]\ntype = \"firebase\"\n").unwrap();
        assert!(matches!(
            config.ledger_type(),
            Err(RepositoryError::ConfigurationError { .. })
        ));
    }
}

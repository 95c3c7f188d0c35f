//! Ledger factory.
//!
//! Picks a [`UsageLedger`] backend from runtime configuration.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use super::config::{LedgerFileConfig, SqliteLedgerConfig};
#[cfg(feature = "local-ledger")]
use super::local::LocalLedger;
#[cfg(feature = "sqlite-ledger")]
use super::sqlite::SqliteLedger;
use super::UsageLedger;
use crate::db::repository::{RepositoryError, RepositoryResult};

/// Ledger backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerType {
    /// SQLite + Diesel implementation
    Sqlite,
    /// In-memory ledger
    Local,
}

impl FromStr for LedgerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "local" | "memory" => Ok(Self::Local),
            _ => Err(format!("Unknown ledger type: {}", s)),
        }
    }
}

impl LedgerType {
    /// Read `LEDGER_TYPE`, falling back to the durable backend when it is
    /// compiled in.
    pub fn from_env() -> Self {
        if let Ok(val) = std::env::var("LEDGER_TYPE") {
            if let Ok(parsed) = val.parse() {
                return parsed;
            }
            log::warn!("Ignoring unknown LEDGER_TYPE '{}'", val);
        }
        Self::default_for_build()
    }

    fn default_for_build() -> Self {
        if cfg!(feature = "sqlite-ledger") {
            Self::Sqlite
        } else {
            Self::Local
        }
    }
}

pub struct LedgerFactory;

impl LedgerFactory {
    /// Create a ledger of the given type.
    ///
    /// `sqlite_config` is only read for [`LedgerType::Sqlite`]; when absent
    /// the defaults apply.
    pub async fn create(
        ledger_type: LedgerType,
        sqlite_config: Option<&SqliteLedgerConfig>,
    ) -> RepositoryResult<Arc<dyn UsageLedger>> {
        match ledger_type {
            LedgerType::Sqlite => {
                #[cfg(feature = "sqlite-ledger")]
                {
                    let config = sqlite_config.cloned().unwrap_or_default();
                    let ledger = Self::create_sqlite(&config).await?;
                    Ok(ledger as Arc<dyn UsageLedger>)
                }
                #[cfg(not(feature = "sqlite-ledger"))]
                {
                    let _ = sqlite_config;
                    Err(RepositoryError::configuration(
                        "SQLite ledger feature not enabled",
                    ))
                }
            }
            LedgerType::Local => Self::create_local(),
        }
    }

    /// Open (and migrate) a SQLite ledger.
    #[cfg(feature = "sqlite-ledger")]
    pub async fn create_sqlite(config: &SqliteLedgerConfig) -> RepositoryResult<Arc<SqliteLedger>> {
        let config = config.clone();
        let ledger = tokio::task::spawn_blocking(move || SqliteLedger::new(config))
            .await
            .map_err(|e| RepositoryError::internal(format!("Task join error: {}", e)))??;
        Ok(Arc::new(ledger))
    }

    pub fn create_local() -> RepositoryResult<Arc<dyn UsageLedger>> {
        #[cfg(feature = "local-ledger")]
        {
            Ok(Arc::new(LocalLedger::new()))
        }
        #[cfg(not(feature = "local-ledger"))]
        {
            Err(RepositoryError::configuration(
                "Local ledger feature not enabled",
            ))
        }
    }

    /// Create a ledger from `LEDGER_*` environment variables.
    pub async fn from_env() -> RepositoryResult<Arc<dyn UsageLedger>> {
        Self::create(LedgerType::from_env(), Some(&SqliteLedgerConfig::from_env())).await
    }

    pub async fn from_config_file<P: AsRef<Path>>(
        config_path: P,
    ) -> RepositoryResult<Arc<dyn UsageLedger>> {
        let config = LedgerFileConfig::from_file(config_path)?;
        Self::from_ledger_config(&config).await
    }

    /// Create a ledger from `smarthome.toml` in the standard locations.
    pub async fn from_default_config() -> RepositoryResult<Arc<dyn UsageLedger>> {
        let config = LedgerFileConfig::from_default_location()?;
        Self::from_ledger_config(&config).await
    }

    async fn from_ledger_config(
        config: &LedgerFileConfig,
    ) -> RepositoryResult<Arc<dyn UsageLedger>> {
        let ledger_type = config.ledger_type()?;
        Self::create(ledger_type, Some(&config.to_sqlite_config())).await
    }
}

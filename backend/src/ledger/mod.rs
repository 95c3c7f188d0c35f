//! Relational usage ledger.
//!
//! Hub workers append one [`UsageBlock`] per hub every fifteen minutes.
//! The ledger is the durable record of consumption; the document store only
//! mirrors the latest snapshots.
//!
//! Backends:
//! - `sqlite`: Diesel on SQLite with an r2d2 pool and embedded migrations
//! - `local`: in-memory, for tests and development

#[cfg(not(any(feature = "sqlite-ledger", feature = "local-ledger")))]
compile_error!("Enable at least one ledger backend feature.");

pub mod config;
pub mod factory;
#[cfg(feature = "local-ledger")]
pub mod local;
#[cfg(feature = "sqlite-ledger")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::repository::RepositoryResult;
use crate::models::{HubId, UsageBlock};

pub use config::{LedgerFileConfig, SqliteLedgerConfig};
pub use factory::{LedgerFactory, LedgerType};
#[cfg(feature = "local-ledger")]
pub use local::LocalLedger;
#[cfg(feature = "sqlite-ledger")]
pub use sqlite::{LedgerStats, SqliteLedger};

/// Storage for fifteen-minute usage blocks.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Insert or replace the block identified by `(hub_id, timestamp)`.
    ///
    /// When the block already exists its total is overwritten and its device
    /// rows are replaced wholesale. The write is atomic.
    async fn record_block(&self, block: &UsageBlock) -> RepositoryResult<()>;

    /// The most recent `limit` blocks of a hub, newest first.
    async fn blocks_for_hub(&self, hub_id: &HubId, limit: usize)
        -> RepositoryResult<Vec<UsageBlock>>;

    async fn get_block(
        &self,
        hub_id: &HubId,
        timestamp: DateTime<Utc>,
    ) -> RepositoryResult<Option<UsageBlock>>;
}

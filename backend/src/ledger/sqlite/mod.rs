//! SQLite usage ledger using Diesel.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures (lock contention, pool timeouts)
//! - Embedded migrations, run once when the ledger is opened
//!
//! Every pooled connection enables foreign keys and a busy timeout so that
//! concurrent hub workers wait on each other instead of failing.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sql_query;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

use super::config::SqliteLedgerConfig;
use super::UsageLedger;
use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::{DeviceId, DeviceUsage, HubId, UsageBlock};

mod models;
mod schema;

use models::*;
use schema::*;

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/ledger/sqlite/migrations");

#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pool and query statistics.
#[derive(Debug, Clone, Default)]
pub struct LedgerStats {
    pub connections_in_use: u32,
    pub idle_connections: u32,
    pub max_size: u32,
    pub total_queries: u64,
    pub failed_queries: u64,
    pub retried_operations: u64,
}

#[derive(Clone, Debug)]
pub struct SqliteLedger {
    pool: SqlitePool,
    config: SqliteLedgerConfig,
    total_queries: Arc<AtomicU64>,
    failed_queries: Arc<AtomicU64>,
    retried_operations: Arc<AtomicU64>,
}

impl SqliteLedger {
    /// Open the database and run pending migrations.
    ///
    /// This blocks; call it from `spawn_blocking` inside a runtime.
    pub fn new(config: SqliteLedgerConfig) -> RepositoryResult<Self> {
        if config.max_pool_size == 0 {
            return Err(RepositoryError::configuration(
                "max_pool_size must be at least 1",
            ));
        }

        let manager = ConnectionManager::<SqliteConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .connection_customizer(Box::new(ConnectionPragmas {
                busy_timeout_ms: config.busy_timeout_ms,
            }))
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("database_url={}", config.database_url)),
                )
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        log::info!("Usage ledger ready at {}", config.database_url);

        Ok(Self {
            pool,
            config,
            total_queries: Arc::new(AtomicU64::new(0)),
            failed_queries: Arc::new(AtomicU64::new(0)),
            retried_operations: Arc::new(AtomicU64::new(0)),
        })
    }

    fn run_migrations(conn: &mut SqliteConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;

        Ok(())
    }

    /// Run a blocking database operation, retrying retryable failures with
    /// exponential backoff.
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;
        let total_queries = self.total_queries.clone();
        let failed_queries = self.failed_queries.clone();
        let retried_operations = self.retried_operations.clone();

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    retried_operations.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2;
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        let err = RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1)),
                        );
                        if attempt < max_retries {
                            last_error = Some(err);
                            continue;
                        }
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(err);
                    }
                };

                total_queries.fetch_add(1, Ordering::Relaxed);
                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        log::warn!("Retrying ledger operation after error: {}", e);
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => {
                        failed_queries.fetch_add(1, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }

            failed_queries.fetch_add(1, Ordering::Relaxed);
            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }

    pub fn stats(&self) -> LedgerStats {
        let state = self.pool.state();
        LedgerStats {
            connections_in_use: state.connections - state.idle_connections,
            idle_connections: state.idle_connections,
            max_size: self.config.max_pool_size,
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            retried_operations: self.retried_operations.load(Ordering::Relaxed),
        }
    }
}

fn to_utc(ts: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(ts, Utc)
}

/// Attach device rows to their hub rows, keeping the hub order.
fn assemble_blocks(hubs: Vec<HubLogRow>, devices: Vec<DeviceLogRow>) -> Vec<UsageBlock> {
    let mut by_hub_log: HashMap<i32, Vec<DeviceUsage>> = HashMap::new();
    for row in devices {
        by_hub_log.entry(row.hub_log_id).or_default().push(DeviceUsage {
            device_id: DeviceId::from(row.device_id),
            active_minutes: row.active_minutes,
            power_usage: row.power_usage,
        });
    }

    hubs.into_iter()
        .map(|hub| UsageBlock {
            hub_id: HubId::from(hub.hub_id),
            timestamp: to_utc(hub.timestamp),
            total_usage: hub.total_usage,
            devices: by_hub_log.remove(&hub.id).unwrap_or_default(),
        })
        .collect()
}

fn load_device_rows(
    conn: &mut SqliteConnection,
    hub_log_ids: &[i32],
) -> RepositoryResult<Vec<DeviceLogRow>> {
    Ok(device_logs::table
        .filter(device_logs::hub_log_id.eq_any(hub_log_ids.to_vec()))
        .order(device_logs::id.asc())
        .select(DeviceLogRow::as_select())
        .load(conn)?)
}

#[async_trait]
impl UsageLedger for SqliteLedger {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| Ok(sql_query("SELECT 1").execute(conn).map(|_| true)?))
            .await
    }

    async fn record_block(&self, block: &UsageBlock) -> RepositoryResult<()> {
        let block = block.clone();
        let hub_id = block.hub_id.clone();
        self.with_conn(move |conn| {
            conn.transaction::<_, RepositoryError, _>(|tx| {
                let timestamp = block.timestamp.trunc_subsecs(0).naive_utc();

                let existing: Option<i32> = hub_logs::table
                    .filter(hub_logs::hub_id.eq(block.hub_id.as_str()))
                    .filter(hub_logs::timestamp.eq(timestamp))
                    .select(hub_logs::id)
                    .first::<i32>(tx)
                    .optional()?;

                let hub_log_id = match existing {
                    Some(id) => {
                        diesel::update(hub_logs::table.find(id))
                            .set(hub_logs::total_usage.eq(block.total_usage))
                            .execute(tx)?;
                        diesel::delete(device_logs::table.filter(device_logs::hub_log_id.eq(id)))
                            .execute(tx)?;
                        id
                    }
                    None => diesel::insert_into(hub_logs::table)
                        .values(&NewHubLogRow {
                            hub_id: block.hub_id.as_str(),
                            timestamp,
                            total_usage: block.total_usage,
                        })
                        .returning(hub_logs::id)
                        .get_result::<i32>(tx)?,
                };

                let rows: Vec<NewDeviceLogRow> = block
                    .devices
                    .iter()
                    .map(|d| NewDeviceLogRow {
                        hub_log_id,
                        device_id: d.device_id.as_str(),
                        active_minutes: d.active_minutes,
                        power_usage: d.power_usage,
                    })
                    .collect();
                if !rows.is_empty() {
                    diesel::insert_into(device_logs::table)
                        .values(&rows)
                        .execute(tx)?;
                }

                Ok(())
            })
        })
        .await
        .map_err(|e| {
            log::error!("Failed to record usage block for hub {}: {}", hub_id, e);
            e.with_operation("record_block")
        })
    }

    async fn blocks_for_hub(
        &self,
        hub_id: &HubId,
        limit: usize,
    ) -> RepositoryResult<Vec<UsageBlock>> {
        let hub_id = hub_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let hubs: Vec<HubLogRow> = hub_logs::table
                .filter(hub_logs::hub_id.eq(&hub_id))
                .order(hub_logs::timestamp.desc())
                .limit(limit)
                .select(HubLogRow::as_select())
                .load(conn)?;
            let ids: Vec<i32> = hubs.iter().map(|h| h.id).collect();
            let devices = load_device_rows(conn, &ids)?;
            Ok(assemble_blocks(hubs, devices))
        })
        .await
    }

    async fn get_block(
        &self,
        hub_id: &HubId,
        timestamp: DateTime<Utc>,
    ) -> RepositoryResult<Option<UsageBlock>> {
        let hub_id = hub_id.to_string();
        let timestamp = timestamp.trunc_subsecs(0).naive_utc();
        self.with_conn(move |conn| {
            let hub: Option<HubLogRow> = hub_logs::table
                .filter(hub_logs::hub_id.eq(&hub_id))
                .filter(hub_logs::timestamp.eq(timestamp))
                .select(HubLogRow::as_select())
                .first(conn)
                .optional()?;
            match hub {
                Some(hub) => {
                    let devices = load_device_rows(conn, &[hub.id])?;
                    Ok(assemble_blocks(vec![hub], devices).pop())
                }
                None => Ok(None),
            }
        })
        .await
    }
}

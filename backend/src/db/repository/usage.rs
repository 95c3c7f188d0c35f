//! Per-hub usage snapshots mirrored from the ledger.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{HubId, UsageSnapshot};

/// Snapshots are keyed by their `YYYY_MM_DD_HH_MM_SS` timestamp, so the
/// lexicographic order of keys is chronological.
#[async_trait]
pub trait UsageSnapshotRepository: Send + Sync {
    /// Store a snapshot, replacing any previous one under the same key.
    async fn put_usage_snapshot(
        &self,
        hub_id: &HubId,
        key: &str,
        snapshot: &UsageSnapshot,
    ) -> RepositoryResult<()>;

    /// All snapshots of a hub ordered by key.
    async fn usage_snapshots(&self, hub_id: &HubId)
        -> RepositoryResult<Vec<(String, UsageSnapshot)>>;

    /// The snapshot with the highest key, if any.
    async fn latest_usage_snapshot(
        &self,
        hub_id: &HubId,
    ) -> RepositoryResult<Option<(String, UsageSnapshot)>>;
}

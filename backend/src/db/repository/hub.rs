//! Hub records.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{Hub, HubId};

#[async_trait]
pub trait HubRepository: Send + Sync {
    /// Create or replace a hub record.
    async fn put_hub(&self, hub: &Hub) -> RepositoryResult<()>;

    /// Fetch a hub, failing with `NotFound` when it is missing.
    async fn get_hub(&self, id: &HubId) -> RepositoryResult<Hub>;

    async fn list_hubs(&self) -> RepositoryResult<Vec<Hub>>;

    /// Replace an existing hub. Fails with `NotFound` when it is missing.
    async fn update_hub(&self, hub: &Hub) -> RepositoryResult<()>;

    /// Delete a hub. Returns whether a record existed.
    async fn delete_hub(&self, id: &HubId) -> RepositoryResult<bool>;
}

//! Free pool of commissioned but unclaimed devices and hubs.

use async_trait::async_trait;

use super::error::RepositoryResult;

/// Pool membership is tracked by raw id so devices and hubs share one set.
#[async_trait]
pub trait PoolRepository: Send + Sync {
    async fn add_to_pool(&self, id: &str) -> RepositoryResult<()>;

    async fn is_in_pool(&self, id: &str) -> RepositoryResult<bool>;

    /// Remove an id. Returns whether it was pooled.
    async fn remove_from_pool(&self, id: &str) -> RepositoryResult<bool>;

    /// Every pooled id, sorted.
    async fn list_pool(&self) -> RepositoryResult<Vec<String>>;
}

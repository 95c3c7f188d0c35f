//! User records.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{User, UserId};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fetch a user. Missing users are `Ok(None)`, not an error.
    async fn get_user(&self, id: &UserId) -> RepositoryResult<Option<User>>;

    /// Create or replace a user.
    async fn put_user(&self, user: &User) -> RepositoryResult<()>;
}

//! Repository traits for the document store.
//!
//! Each concern gets its own focused trait; [`FullRepository`] bundles them
//! so services and handlers can hold a single `Arc<dyn FullRepository>`.

pub mod device;
pub mod error;
pub mod hub;
pub mod pool;
pub mod usage;
pub mod user;

pub use device::{DeviceRepository, DEFAULT_STATUS_HISTORY_LIMIT};
pub use error::{ErrorContext, RepositoryError, RepositoryResult};
pub use hub::HubRepository;
pub use pool::PoolRepository;
pub use usage::UsageSnapshotRepository;
pub use user::UserRepository;

/// Every repository concern in one object-safe trait.
pub trait FullRepository:
    DeviceRepository + HubRepository + PoolRepository + UserRepository + UsageSnapshotRepository
{
}

impl<T> FullRepository for T where
    T: DeviceRepository + HubRepository + PoolRepository + UserRepository + UsageSnapshotRepository
{
}

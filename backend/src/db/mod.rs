//! Document store for devices, hubs, users and usage snapshots.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  HTTP handlers / hub workers                            │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Service Layer (services.rs) - Business Rules           │
//! │  - Pooling and hub assignment                           │
//! │  - Sharing and access checks                            │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Traits (repository/) - Abstract Interface   │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────▼──────────────────────────────┐
//!     │             Local Repository                  │
//!     │               (in-memory)                     │
//!     └──────────────────────────────────────────────┘
//! ```
//!
//! The durable usage record lives in [`crate::ledger`].

pub mod repositories;
pub mod repository;
pub mod services;

pub use repositories::LocalRepository;
pub use repository::{
    DeviceRepository, ErrorContext, FullRepository, HubRepository, PoolRepository,
    RepositoryError, RepositoryResult, UsageSnapshotRepository, UserRepository,
};
pub use services::{
    add_to_device_pool, assign_device_to_hub, check_hub_access, create_hub, health_check,
    hub_devices, remove_device_from_hub, setup_new_user, share_hub_access,
};

//! Service layer.
//!
//! Services sit between the HTTP handlers and the repositories: they apply
//! the device rules, run the hub workers and handle commissioning and
//! linking.

pub mod commissioning;
pub mod control;
pub mod linking;
pub mod manipulator;
pub mod tracker;
pub mod usage;

pub use commissioning::CommissioningService;
pub use control::{apply_command, set_device_state, DeviceCommand};
pub use linking::{LinkOutcome, LinkingClaims, LinkingService, DEFAULT_TOKEN_EXPIRY_MINUTES};
pub use manipulator::{next_block_boundary, HubWorker, Manipulator};
pub use tracker::DeviceStateTracker;
pub use usage::{device_power_usage, hub_power_usage, DevicePowerUsage, HubPowerUsage};

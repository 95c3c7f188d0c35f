//! # Smart Home Power Service
//!
//! Backend for a smart-home system: devices and hubs, power usage
//! accounting in 15-minute blocks, device linking, and MQTT telemetry.
//!
//! ## Architecture
//!
//! - [`models`]: devices, hubs, users and usage blocks
//! - [`db`]: document repository (devices, hubs, pool, users, snapshots)
//! - [`ledger`]: relational usage ledger (SQLite or in-memory)
//! - [`services`]: hub workers, commissioning, linking and device control
//! - [`telemetry`]: MQTT publishing and per-device streams
//! - [`http`]: axum REST API

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod services;
pub mod telemetry;

#[cfg(feature = "http-server")]
pub mod http;

pub use config::AppConfig;
pub use error::{DomainError, DomainResult};

//! Request and response bodies for the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DeviceId, DeviceType, HubId, HubVariant, UserId};

/// Default number of ledger blocks returned by `usage_history` (one day).
pub const DEFAULT_HISTORY_BLOCKS: usize = 96;

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Document store status
    pub database: String,
    /// Usage ledger status
    pub ledger: String,
}

// =============================================================================
// Device state
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleQuery {
    /// Hub to notify; defaults to the device's own hub
    pub hub_id: Option<HubId>,
    pub new_state: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleResponse {
    pub success: bool,
    pub device_id: DeviceId,
    pub new_state: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubQuery {
    pub hub_id: Option<HubId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

// =============================================================================
// Commissioning
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SpawnDeviceRequest {
    #[serde(rename = "type")]
    pub device_type: DeviceType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateHubRequest {
    #[serde(default)]
    pub variant: HubVariant,
    #[serde(default)]
    pub name: Option<String>,
}

/// Identifier of a newly commissioned item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub success: bool,
    pub hub_id: HubId,
    pub device_id: DeviceId,
}

// =============================================================================
// Sharing
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ShareRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareResponse {
    /// False when the user already had access
    pub shared: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessResponse {
    pub has_access: bool,
}

// =============================================================================
// Linking
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LinkTokenRequest {
    /// Pooled device or hub id
    pub device_id: String,
    pub expiry_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkTokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkRequest {
    pub token: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkResponse {
    pub success: bool,
    pub hub_id: HubId,
}

// =============================================================================
// Device control
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BrightnessRequest {
    pub brightness: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColorRequest {
    pub color: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetTempRequest {
    pub target_temp: f64,
}

/// Thermostat mode, parsed case-insensitively.
#[derive(Debug, Clone, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentTempRequest {
    pub current_temp: f64,
}

// =============================================================================
// Telemetry streams
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamQuery {
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamResponse {
    pub device_id: DeviceId,
    pub streaming: bool,
}

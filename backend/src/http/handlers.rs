//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the
//! service layer for business logic.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::Utc;
use futures::stream::Stream;
use log::warn;
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::time::Duration;

use super::dto::{
    AccessResponse, AssignmentResponse, BrightnessRequest, ColorRequest, CreateHubRequest,
    CreatedResponse, CurrentTempRequest, HealthResponse, HubQuery, LimitQuery, LinkRequest,
    LinkResponse, LinkTokenRequest, LinkTokenResponse, ModeRequest, ShareRequest, ShareResponse,
    SpawnDeviceRequest, StreamQuery, StreamResponse, TargetTempRequest, ToggleQuery,
    ToggleResponse, DEFAULT_HISTORY_BLOCKS,
};
use super::error::AppError;
use super::extract::{ApiJson, ApiQuery};
use super::state::AppState;
use crate::db::repository::{RepositoryError, DEFAULT_STATUS_HISTORY_LIMIT};
use crate::db::services as db_services;
use crate::models::{Device, DeviceId, DeviceStatus, HubId, ThermostatMode, UsageBlock, User, UserId};
use crate::services::{
    self, DeviceCommand, DevicePowerUsage, HubPowerUsage, LinkOutcome,
    DEFAULT_TOKEN_EXPIRY_MINUTES,
};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// Interval between server-sent telemetry events.
const EVENT_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Health Check
// =============================================================================

fn status_label(result: Result<bool, RepositoryError>) -> String {
    match result {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    }
}

/// GET /health
///
/// Reports whether the document store and the usage ledger are reachable.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let database = status_label(db_services::health_check(state.repository.as_ref()).await);
    let ledger = status_label(state.ledger.health_check().await);

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        database,
        ledger,
    }))
}

// =============================================================================
// Devices
// =============================================================================

/// POST /device/{device_id}/toggle?hub_id&new_state
pub async fn toggle_device(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    ApiQuery(query): ApiQuery<ToggleQuery>,
) -> HandlerResult<ToggleResponse> {
    let device = services::set_device_state(
        state.repository.as_ref(),
        &state.manipulator,
        &device_id,
        query.hub_id.as_ref(),
        query.new_state,
    )
    .await?;

    Ok(Json(ToggleResponse {
        success: true,
        device_id: device.id,
        new_state: device.state,
    }))
}

/// GET /device/{device_id}
pub async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
) -> HandlerResult<Device> {
    Ok(Json(state.repository.get_device(&device_id).await?))
}

/// GET /device/{device_id}/power_usage?hub_id
///
/// Usage of the device in its hub's latest 15-minute block.
pub async fn get_device_power_usage(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    ApiQuery(query): ApiQuery<HubQuery>,
) -> HandlerResult<DevicePowerUsage> {
    let usage = services::device_power_usage(
        state.repository.as_ref(),
        &device_id,
        query.hub_id.as_ref(),
    )
    .await?;
    Ok(Json(usage))
}

/// POST /devices
///
/// Commission a device into the free pool.
pub async fn spawn_device(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SpawnDeviceRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let id = state.commissioning.spawn_device(request.device_type).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse { id: id.to_string() }),
    ))
}

// =============================================================================
// Hubs
// =============================================================================

/// POST /hubs
pub async fn create_hub(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateHubRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let id = state
        .commissioning
        .create_hub(request.variant, request.name)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse { id: id.to_string() }),
    ))
}

/// GET /hub/{hub_id}/devices
pub async fn get_hub_devices(
    State(state): State<AppState>,
    Path(hub_id): Path<HubId>,
) -> HandlerResult<Vec<Device>> {
    Ok(Json(
        db_services::hub_devices(state.repository.as_ref(), &hub_id).await?,
    ))
}

/// GET /hub/{hub_id}/power_usage
pub async fn get_hub_power_usage(
    State(state): State<AppState>,
    Path(hub_id): Path<HubId>,
) -> HandlerResult<HubPowerUsage> {
    Ok(Json(
        services::hub_power_usage(state.repository.as_ref(), &hub_id).await?,
    ))
}

/// Make sure the hub has a worker and the device is tracked by it.
async fn track_device(state: &AppState, hub_id: &HubId, device: &Device) -> Result<(), AppError> {
    if state.manipulator.worker(hub_id).is_none() {
        state.manipulator.add_hub_by_id(hub_id).await?;
    }
    if !state
        .manipulator
        .update_device_state(hub_id, &device.id, device.state)
    {
        warn!("Hub {} has no worker; device {} is not tracked", hub_id, device.id);
    }
    Ok(())
}

/// POST /hub/{hub_id}/devices/{device_id}
///
/// Attach a device to a hub and start tracking its usage.
pub async fn assign_device(
    State(state): State<AppState>,
    Path((hub_id, device_id)): Path<(HubId, DeviceId)>,
) -> HandlerResult<AssignmentResponse> {
    db_services::assign_device_to_hub(state.repository.as_ref(), &device_id, &hub_id).await?;
    let device = state.repository.get_device(&device_id).await?;
    track_device(&state, &hub_id, &device).await?;

    Ok(Json(AssignmentResponse {
        success: true,
        hub_id,
        device_id,
    }))
}

/// DELETE /hub/{hub_id}/devices/{device_id}
///
/// Detach a device from its hub and delete it.
pub async fn remove_device(
    State(state): State<AppState>,
    Path((hub_id, device_id)): Path<(HubId, DeviceId)>,
) -> HandlerResult<AssignmentResponse> {
    db_services::remove_device_from_hub(state.repository.as_ref(), &hub_id, &device_id).await?;
    state.streams.stop_device_stream(&device_id).await;

    Ok(Json(AssignmentResponse {
        success: true,
        hub_id,
        device_id,
    }))
}

/// POST /hub/{hub_id}/share
pub async fn share_hub(
    State(state): State<AppState>,
    Path(hub_id): Path<HubId>,
    ApiJson(request): ApiJson<ShareRequest>,
) -> HandlerResult<ShareResponse> {
    let shared =
        db_services::share_hub_access(state.repository.as_ref(), &hub_id, &request.user_id)
            .await?;
    Ok(Json(ShareResponse { shared }))
}

/// GET /hub/{hub_id}/access/{user_id}
pub async fn check_hub_access(
    State(state): State<AppState>,
    Path((hub_id, user_id)): Path<(HubId, UserId)>,
) -> HandlerResult<AccessResponse> {
    let has_access =
        db_services::check_hub_access(state.repository.as_ref(), &hub_id, &user_id).await?;
    Ok(Json(AccessResponse { has_access }))
}

/// GET /hub/{hub_id}/usage_history?limit
///
/// Ledger blocks for the hub, newest first.
pub async fn get_usage_history(
    State(state): State<AppState>,
    Path(hub_id): Path<HubId>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> HandlerResult<Vec<UsageBlock>> {
    state.repository.get_hub(&hub_id).await?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_BLOCKS);
    Ok(Json(state.ledger.blocks_for_hub(&hub_id, limit).await?))
}

// =============================================================================
// Users and linking
// =============================================================================

/// POST /users/{user_id}
///
/// Create a user record. An existing user is returned unchanged.
pub async fn setup_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    ApiJson(profile): ApiJson<Map<String, Value>>,
) -> HandlerResult<User> {
    Ok(Json(
        db_services::setup_new_user(state.repository.as_ref(), &user_id, profile).await?,
    ))
}

/// POST /link/token
pub async fn create_linking_token(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LinkTokenRequest>,
) -> HandlerResult<LinkTokenResponse> {
    let expiry = request.expiry_minutes.unwrap_or(DEFAULT_TOKEN_EXPIRY_MINUTES);
    let token = state
        .linking
        .generate_linking_token(&request.device_id, expiry)
        .await?;
    Ok(Json(LinkTokenResponse { token }))
}

/// POST /link
///
/// Claim a pooled hub or device for a user.
pub async fn link(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LinkRequest>,
) -> HandlerResult<LinkResponse> {
    let outcome = state
        .linking
        .process_linking(&request.token, &request.user_id)
        .await?;

    match &outcome {
        LinkOutcome::Hub(hub_id) => {
            state.manipulator.add_hub_by_id(hub_id).await?;
        }
        LinkOutcome::Device { device_id, hub_id } => {
            let device = state.repository.get_device(device_id).await?;
            track_device(&state, hub_id, &device).await?;
        }
    }

    Ok(Json(LinkResponse {
        success: true,
        hub_id: outcome.hub_id().clone(),
    }))
}

// =============================================================================
// Device control
// =============================================================================

async fn control(
    state: &AppState,
    device_id: &DeviceId,
    command: DeviceCommand,
) -> HandlerResult<Device> {
    let device = services::apply_command(
        state.repository.as_ref(),
        &state.manipulator,
        device_id,
        command,
    )
    .await?;
    Ok(Json(device))
}

/// PUT /device/{device_id}/brightness
pub async fn set_brightness(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    ApiJson(request): ApiJson<BrightnessRequest>,
) -> HandlerResult<Device> {
    control(&state, &device_id, DeviceCommand::Brightness(request.brightness)).await
}

/// PUT /device/{device_id}/color
pub async fn set_color(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    ApiJson(request): ApiJson<ColorRequest>,
) -> HandlerResult<Device> {
    control(&state, &device_id, DeviceCommand::Color(request.color)).await
}

/// PUT /device/{device_id}/target_temp
pub async fn set_target_temp(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    ApiJson(request): ApiJson<TargetTempRequest>,
) -> HandlerResult<Device> {
    control(&state, &device_id, DeviceCommand::TargetTemp(request.target_temp)).await
}

/// PUT /device/{device_id}/mode
pub async fn set_mode(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    ApiJson(request): ApiJson<ModeRequest>,
) -> HandlerResult<Device> {
    let mode: ThermostatMode = request.mode.parse()?;
    control(&state, &device_id, DeviceCommand::Mode(mode)).await
}

/// PUT /device/{device_id}/current_temp
///
/// Sensor reading; recomputes the thermostat's draw.
pub async fn set_current_temp(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    ApiJson(request): ApiJson<CurrentTempRequest>,
) -> HandlerResult<Device> {
    control(&state, &device_id, DeviceCommand::CurrentTemp(request.current_temp)).await
}

// =============================================================================
// Status history
// =============================================================================

/// POST /device/{device_id}/status
pub async fn add_device_status(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    ApiJson(data): ApiJson<Map<String, Value>>,
) -> Result<(StatusCode, Json<DeviceStatus>), AppError> {
    let status = state.repository.add_device_status(&device_id, data).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

/// GET /device/{device_id}/status_history?limit
pub async fn get_status_history(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> HandlerResult<Vec<DeviceStatus>> {
    let limit = query.limit.unwrap_or(DEFAULT_STATUS_HISTORY_LIMIT);
    Ok(Json(
        state
            .repository
            .device_status_history(&device_id, limit)
            .await?,
    ))
}

// =============================================================================
// Telemetry
// =============================================================================

/// POST /device/{device_id}/stream?interval_ms
///
/// Start publishing the device over MQTT.
pub async fn start_stream(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
    ApiQuery(query): ApiQuery<StreamQuery>,
) -> Result<(StatusCode, Json<StreamResponse>), AppError> {
    state.repository.get_device(&device_id).await?;
    let interval = query
        .interval_ms
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(state.stream_interval);
    state.streams.start_device_stream(&device_id, interval)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StreamResponse {
            device_id,
            streaming: true,
        }),
    ))
}

/// DELETE /device/{device_id}/stream
pub async fn stop_stream(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
) -> HandlerResult<StreamResponse> {
    if !state.streams.stop_device_stream(&device_id).await {
        return Err(AppError::NotFound(format!(
            "No active stream for device {}",
            device_id
        )));
    }
    Ok(Json(StreamResponse {
        device_id,
        streaming: false,
    }))
}

/// GET /device/{device_id}/events
///
/// Server-Sent Events carrying the device's telemetry message once per
/// second.
pub async fn stream_device_events(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    state.repository.get_device(&device_id).await?;

    let repository = state.repository.clone();
    let stream = async_stream::stream! {
        loop {
            match repository.get_device(&device_id).await {
                Ok(device) => {
                    let message = device.telemetry_message(Utc::now());
                    let data = serde_json::to_string(&message).unwrap_or_default();
                    yield Ok(Event::default().event("telemetry").data(data));
                }
                Err(RepositoryError::NotFound { .. }) => {
                    yield Ok(Event::default()
                        .event("error")
                        .data(format!("Device {} was removed", device_id)));
                    break;
                }
                Err(e) => {
                    yield Ok(Event::default().event("error").data(e.to_string()));
                }
            }

            tokio::time::sleep(EVENT_INTERVAL).await;
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(1))
            .text("keep-alive"),
    ))
}

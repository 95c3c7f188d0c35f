//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (API key, CORS, compression,
//! tracing) and creates the axum router ready for serving.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::auth::require_api_key;
use super::handlers;
use super::state::AppState;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        // Devices
        .route("/devices", post(handlers::spawn_device))
        .route("/device/{device_id}", get(handlers::get_device))
        .route("/device/{device_id}/toggle", post(handlers::toggle_device))
        .route("/device/{device_id}/power_usage", get(handlers::get_device_power_usage))
        .route("/device/{device_id}/brightness", put(handlers::set_brightness))
        .route("/device/{device_id}/color", put(handlers::set_color))
        .route("/device/{device_id}/target_temp", put(handlers::set_target_temp))
        .route("/device/{device_id}/mode", put(handlers::set_mode))
        .route("/device/{device_id}/current_temp", put(handlers::set_current_temp))
        .route("/device/{device_id}/status", post(handlers::add_device_status))
        .route("/device/{device_id}/status_history", get(handlers::get_status_history))
        // Telemetry
        .route(
            "/device/{device_id}/stream",
            post(handlers::start_stream).delete(handlers::stop_stream),
        )
        .route("/device/{device_id}/events", get(handlers::stream_device_events))
        // Hubs
        .route("/hubs", post(handlers::create_hub))
        .route("/hub/{hub_id}/devices", get(handlers::get_hub_devices))
        .route(
            "/hub/{hub_id}/devices/{device_id}",
            post(handlers::assign_device).delete(handlers::remove_device),
        )
        .route("/hub/{hub_id}/power_usage", get(handlers::get_hub_power_usage))
        .route("/hub/{hub_id}/usage_history", get(handlers::get_usage_history))
        .route("/hub/{hub_id}/share", post(handlers::share_hub))
        .route("/hub/{hub_id}/access/{user_id}", get(handlers::check_hub_access))
        // Users and linking
        .route("/users/{user_id}", post(handlers::setup_user))
        .route("/link/token", post(handlers::create_linking_token))
        .route("/link", post(handlers::link))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(protected)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

//! API key check for protected routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::error::AppError;
use super::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject requests whose `X-API-Key` header does not match the configured
/// key.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key == state.api_key.as_ref() => Ok(next.run(request).await),
        Some(_) => Err(AppError::Unauthorized("Invalid API key".to_string())),
        None => Err(AppError::Unauthorized(
            "Missing X-API-Key header".to_string(),
        )),
    }
}

//! Authentication middleware for API key validation
//!
//! Trainer/admin identity is established upstream; this only guards the
//! deployment with an optional shared key.

use super::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

/// Authentication middleware
///
/// If `api_key` is configured in AppState, validates the Authorization header.
/// Expected format: `Authorization: Bearer <api_key>`
///
/// If no `api_key` is configured, all requests are allowed.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_key) = &state.api_key else {
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let message = match auth_header.map(bearer_token) {
        Some(Some(provided_key)) if provided_key == expected_key => {
            return next.run(request).await;
        }
        Some(Some(_)) => "Invalid API key",
        Some(None) => "Invalid Authorization header format. Expected: Bearer <api_key>",
        None => "API key required. Set Authorization: Bearer <api_key>",
    };

    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn bearer_token(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ")
}

use crate::models::user::ErrorResponse;
use crate::AppState;
use axum::{
    extract::{Extension, Request},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

/// Shared-secret gate for the admin API: the X-Admin-Key header must match
/// ADMIN_SECRET. With no secret configured every request is rejected.
pub async fn admin_key_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, impl IntoResponse> {
    let expected = match state.admin_secret.as_deref() {
        Some(secret) => secret,
        None => {
            tracing::warn!("Admin request rejected: ADMIN_SECRET is not configured");
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    success: false,
                    message: "Unauthorized Admin Access".to_string(),
                }),
            ));
        }
    };

    let provided = headers
        .get("x-admin-key")
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key == expected => Ok(next.run(request).await),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                success: false,
                message: "Unauthorized Admin Access".to_string(),
            }),
        )),
    }
}

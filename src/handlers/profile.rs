// src/handlers/profile.rs
use crate::handlers::chat::internal_error;
use crate::models::user::{AvailabilityRequest, ErrorResponse, Profile, UserProfileRequest};
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn profile_routes() -> Router {
    Router::new()
        .route("/auth/check-availability", post(check_availability))
        .route("/user/profile", post(update_user_profile))
        .route("/user/:user_id", get(get_user_profile))
}

async fn check_availability(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<AvailabilityRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let mobile_taken = sqlx::query_scalar::<_, String>(
        "SELECT user_id FROM profiles WHERE mobile = $1 LIMIT 1",
    )
    .bind(&payload.mobile)
    .fetch_optional(&state.db_pool)
    .await
    .map_err(|e| {
        tracing::error!("Availability check failed: {}", e);
        internal_error()
    })?;

    if mobile_taken.is_some() {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                success: false,
                message: "Mobile used".to_string(),
            }),
        ));
    }

    let email_taken = sqlx::query_scalar::<_, String>(
        "SELECT user_id FROM profiles WHERE email = $1 LIMIT 1",
    )
    .bind(&payload.email)
    .fetch_optional(&state.db_pool)
    .await
    .map_err(|e| {
        tracing::error!("Availability check failed: {}", e);
        internal_error()
    })?;

    if email_taken.is_some() {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                success: false,
                message: "Email used".to_string(),
            }),
        ));
    }

    Ok(Json(serde_json::json!({ "available": true })))
}

async fn update_user_profile(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<UserProfileRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    if payload.user_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                success: false,
                message: "user_id is required".to_string(),
            }),
        ));
    }

    let name = payload.display_name();

    // Merge semantics: absent fields never overwrite stored values
    sqlx::query(
        r#"
        INSERT INTO profiles (
            user_id, first_name, middle_name, last_name, name,
            email, mobile, class_level, group_name, medium, language, last_active
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW())
        ON CONFLICT (user_id) DO UPDATE SET
            first_name  = COALESCE(EXCLUDED.first_name, profiles.first_name),
            middle_name = COALESCE(EXCLUDED.middle_name, profiles.middle_name),
            last_name   = COALESCE(EXCLUDED.last_name, profiles.last_name),
            name        = COALESCE(EXCLUDED.name, profiles.name),
            email       = COALESCE(EXCLUDED.email, profiles.email),
            mobile      = COALESCE(EXCLUDED.mobile, profiles.mobile),
            class_level = COALESCE(EXCLUDED.class_level, profiles.class_level),
            group_name  = COALESCE(EXCLUDED.group_name, profiles.group_name),
            medium      = COALESCE(EXCLUDED.medium, profiles.medium),
            language    = COALESCE(EXCLUDED.language, profiles.language),
            last_active = NOW()
        "#,
    )
    .bind(&payload.user_id)
    .bind(&payload.first_name)
    .bind(&payload.middle_name)
    .bind(&payload.last_name)
    .bind(&name)
    .bind(&payload.email)
    .bind(&payload.mobile)
    .bind(&payload.class_level)
    .bind(&payload.group_name)
    .bind(&payload.medium)
    .bind(&payload.language)
    .execute(&state.db_pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to upsert profile {}: {}", payload.user_id, e);
        internal_error()
    })?;

    Ok(Json(serde_json::json!({ "status": "success" })))
}

async fn get_user_profile(
    Path(user_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Profile>, (StatusCode, Json<ErrorResponse>)> {
    let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = $1")
        .bind(&user_id)
        .fetch_optional(&state.db_pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch profile {}: {}", user_id, e);
            internal_error()
        })?;

    match profile {
        Some(profile) => Ok(Json(profile)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                success: false,
                message: "Not found".to_string(),
            }),
        )),
    }
}

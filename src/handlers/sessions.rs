// src/handlers/sessions.rs
use crate::handlers::chat::internal_error;
use crate::models::chat::{ChatSession, DeleteSessionQuery, RenameSessionRequest, SessionsQuery};
use crate::models::user::ErrorResponse;
use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
    routing::{delete, get, patch},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

pub fn session_routes() -> Router {
    Router::new()
        .route("/sessions", get(get_sessions))
        .route("/session/:session_id/rename", patch(rename_session))
        .route("/session/:session_id", delete(delete_session))
}

async fn get_sessions(
    Query(params): Query<SessionsQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let sessions = sqlx::query_as::<_, ChatSession>(
        "SELECT * FROM chat_sessions
         WHERE user_id = $1
         ORDER BY updated_at DESC",
    )
    .bind(&params.user_id)
    .fetch_all(&state.db_pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list sessions for {}: {}", params.user_id, e);
        internal_error()
    })?;

    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

async fn rename_session(
    Path(session_id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<RenameSessionRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let result = sqlx::query(
        "UPDATE chat_sessions SET custom_title = $1 WHERE id = $2 AND user_id = $3",
    )
    .bind(&payload.new_title)
    .bind(session_id)
    .bind(&payload.user_id)
    .execute(&state.db_pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to rename session {}: {}", session_id, e);
        internal_error()
    })?;

    if result.rows_affected() == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                success: false,
                message: "Session not found".to_string(),
            }),
        ));
    }

    Ok(Json(serde_json::json!({ "status": "success" })))
}

async fn delete_session(
    Path(session_id): Path<Uuid>,
    Query(params): Query<DeleteSessionQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    // Messages go with the session via ON DELETE CASCADE
    let result = sqlx::query("DELETE FROM chat_sessions WHERE id = $1 AND user_id = $2")
        .bind(session_id)
        .bind(&params.user_id)
        .execute(&state.db_pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete session {}: {}", session_id, e);
            internal_error()
        })?;

    if result.rows_affected() == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                success: false,
                message: "Session not found".to_string(),
            }),
        ));
    }

    tracing::info!("Deleted session {} for user {}", session_id, params.user_id);
    Ok(Json(serde_json::json!({ "status": "success" })))
}

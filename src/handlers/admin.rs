// src/handlers/admin.rs
use crate::handlers::chat::internal_error;
use crate::middleware::admin::admin_key_middleware;
use crate::models::curriculum::{BookContentUpload, CurriculumUpdate};
use crate::models::user::ErrorResponse;
use crate::services::{retrieval, usage, TokenUsageService};
use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub fn admin_routes() -> Router {
    // Read-only login-status check: authorization is the allow-listed phone
    // lookup itself, so this route sits outside the shared-secret gate.
    let public_admin = Router::new().route("/admin/status", get(admin_status));

    let protected_admin = Router::new()
        .route("/admin/book/upload", post(upload_book_content))
        .route("/admin/curriculum/update", post(update_curriculum))
        .route("/admin/stats", get(admin_stats))
        .route("/admin/users", get(list_users))
        .route("/admin/users/:user_id/history", get(user_full_history))
        .layer(axum::middleware::from_fn(admin_key_middleware));

    public_admin.merge(protected_admin)
}

#[derive(Deserialize)]
struct AdminStatusQuery {
    user_id: String,
}

#[derive(Deserialize)]
struct ListUsersQuery {
    limit: Option<i64>,
}

/// Upload or replace the raw textbook text for one chapter. When the vector
/// store is configured the text is also chunked, embedded, and upserted so
/// similarity retrieval stays in sync with the canonical row.
async fn upload_book_content(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<BookContentUpload>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    if payload.text_content.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                success: false,
                message: "text_content must not be empty".to_string(),
            }),
        ));
    }

    let key = retrieval::ContentKey::new(
        &payload.class_level,
        &payload.subject,
        &payload.chapter_id,
    );
    let content_key = key.encode();

    sqlx::query(
        r#"
        INSERT INTO textbook_content
            (content_key, class_level, subject, chapter_id, text_content, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        ON CONFLICT (content_key) DO UPDATE SET
            text_content = EXCLUDED.text_content,
            updated_at = NOW()
        "#,
    )
    .bind(&content_key)
    .bind(&payload.class_level)
    .bind(&payload.subject)
    .bind(&payload.chapter_id)
    .bind(&payload.text_content)
    .execute(&state.db_pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to upsert textbook content {}: {}", content_key, e);
        internal_error()
    })?;

    // The canonical row is the source of truth; a failed vector sync is
    // logged and the upload still succeeds.
    let mut chunks_written = 0usize;
    if let (Some(qdrant), Some(gemini)) = (&state.qdrant_client, &state.gemini_client) {
        let chunks = retrieval::chunk_text(&payload.text_content);
        match qdrant.replace_chapter_chunks(&key, &chunks, gemini).await {
            Ok(written) => {
                chunks_written = written;
                tracing::info!("Vectorized {} chunks for {}", written, content_key);
            }
            Err(e) => {
                tracing::warn!("Failed to vectorize chunks for {}: {}", content_key, e);
            }
        }
    }

    Ok(Json(json!({
        "status": "success",
        "message": format!("Uploaded content to {}", content_key),
        "chunks_vectorized": chunks_written,
    })))
}

/// Append or replace chapters inside a subject's ordered list. Each chapter
/// is an atomic upsert keyed by chapter id, and the batch is committed in
/// one transaction so concurrent admin edits cannot interleave.
async fn update_curriculum(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CurriculumUpdate>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    if payload.chapters.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                success: false,
                message: "chapters must not be empty".to_string(),
            }),
        ));
    }

    let mut tx = state.db_pool.begin().await.map_err(|e| {
        tracing::error!("Failed to begin curriculum transaction: {}", e);
        internal_error()
    })?;

    for (position, chapter) in payload.chapters.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO curriculum_chapters
                (class_level, group_name, subject, chapter_id, title, title_bn, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (class_level, group_name, subject, chapter_id) DO UPDATE SET
                title = EXCLUDED.title,
                title_bn = EXCLUDED.title_bn,
                position = EXCLUDED.position
            "#,
        )
        .bind(&payload.class_level)
        .bind(&payload.group_name)
        .bind(&payload.subject)
        .bind(&chapter.id)
        .bind(&chapter.title)
        .bind(&chapter.title_bn)
        .bind(position as i32)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to upsert chapter {}: {}", chapter.id, e);
            internal_error()
        })?;
    }

    tx.commit().await.map_err(|e| {
        tracing::error!("Failed to commit curriculum update: {}", e);
        internal_error()
    })?;

    Ok(Json(json!({
        "status": "success",
        "message": format!(
            "Updated {} for {} {}",
            payload.subject, payload.class_level, payload.group_name
        ),
    })))
}

async fn admin_stats(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let total_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles")
        .fetch_one(&state.db_pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to count users: {}", e);
            internal_error()
        })?;

    let total_sessions = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_sessions")
        .fetch_one(&state.db_pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to count sessions: {}", e);
            internal_error()
        })?;

    let total_messages = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
        .fetch_one(&state.db_pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to count messages: {}", e);
            internal_error()
        })?;

    Ok(Json(json!({
        "total_users": total_users,
        "total_sessions": total_sessions,
        "total_messages": total_messages,
        "status": "Healthy",
        "database": "Connected",
    })))
}

async fn list_users(
    Query(params): Query<ListUsersQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);

    let rows = sqlx::query_as::<_, (
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        chrono::DateTime<chrono::Utc>,
    )>(
        "SELECT user_id, name, mobile, email, class_level, group_name, last_active
         FROM profiles
         ORDER BY last_active DESC
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(&state.db_pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {}", e);
        internal_error()
    })?;

    let users: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(user_id, name, mobile, email, class_level, group_name, last_active)| {
            json!({
                "id": user_id,
                "name": name.unwrap_or_else(|| "Unknown".to_string()),
                "mobile": mobile.unwrap_or_else(|| "N/A".to_string()),
                "email": email.unwrap_or_else(|| "N/A".to_string()),
                "class_group": format!(
                    "{} {}",
                    class_level.unwrap_or_default(),
                    group_name.unwrap_or_default()
                ),
                "last_active": last_active.timestamp_millis(),
            })
        })
        .collect();

    Ok(Json(json!(users)))
}

/// Every session with its full message list, plus the word-count token
/// estimate alongside the true recorded provider totals.
async fn user_full_history(
    Path(user_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let sessions = sqlx::query_as::<_, (Uuid, String, String)>(
        "SELECT id, subject, chapter_id FROM chat_sessions WHERE user_id = $1",
    )
    .bind(&user_id)
    .fetch_all(&state.db_pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch sessions for {}: {}", user_id, e);
        internal_error()
    })?;

    let mut full_history = Vec::with_capacity(sessions.len());
    let mut total_messages = 0i64;
    let mut estimated_tokens = 0i64;

    for (session_id, subject, chapter_id) in sessions {
        let messages = sqlx::query_as::<_, (String, String, chrono::DateTime<chrono::Utc>)>(
            "SELECT sender, text, created_at
             FROM messages
             WHERE session_id = $1
             ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&state.db_pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch messages for {}: {}", session_id, e);
            internal_error()
        })?;

        let mut message_list = Vec::with_capacity(messages.len());
        for (sender, text, created_at) in messages {
            total_messages += 1;
            estimated_tokens += usage::estimate_tokens(&text);
            message_list.push(json!({
                "role": sender,
                "text": text,
                "time": created_at.timestamp_millis(),
            }));
        }

        full_history.push(json!({
            "session_id": session_id,
            "subject": subject,
            "chapter_id": chapter_id,
            "messages": message_list,
        }));
    }

    let recorded = TokenUsageService::get_user_total_usage(&state.db_pool, &user_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch recorded usage for {}: {}", user_id, e);
            internal_error()
        })?;

    Ok(Json(json!({
        "user_id": user_id,
        "total_sessions": full_history.len(),
        "total_messages": total_messages,
        "estimated_tokens_used": estimated_tokens,
        "recorded_usage": {
            "input_tokens": recorded.total_input_tokens,
            "output_tokens": recorded.total_output_tokens,
            "cost_cents": recorded.total_cost_cents,
            "requests": recorded.total_requests,
        },
        "sessions": full_history,
    })))
}

/// Login-status check backed by the allow-listed phone lookup. Lookup
/// failures read as "not an admin" rather than an error.
async fn admin_status(
    Query(params): Query<AdminStatusQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let is_admin = check_admin_access(&state, &params.user_id).await;
    Json(json!({ "is_admin": is_admin }))
}

async fn check_admin_access(state: &Arc<AppState>, user_id: &str) -> bool {
    let mobile = match sqlx::query_scalar::<_, Option<String>>(
        "SELECT mobile FROM profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.db_pool)
    .await
    {
        Ok(Some(Some(mobile))) => mobile,
        Ok(_) => return false,
        Err(e) => {
            tracing::warn!("Admin verification failed for {}: {}", user_id, e);
            return false;
        }
    };

    match sqlx::query_scalar::<_, String>("SELECT mobile FROM admin_access WHERE mobile = $1")
        .bind(&mobile)
        .fetch_optional(&state.db_pool)
        .await
    {
        Ok(found) => found.is_some(),
        Err(e) => {
            tracing::warn!("Admin allow-list lookup failed: {}", e);
            false
        }
    }
}

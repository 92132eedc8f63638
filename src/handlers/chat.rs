// src/handlers/chat.rs
//
// The retrieval-augmented chat turn: persist the student's message, ground
// the prompt in textbook content, call the model, persist the reply.
use crate::models::chat::{ChatRequest, ChatResponse, HistoryQuery};
use crate::models::user::ErrorResponse;
use crate::services::{prompt, retrieval, TokenUsageService};
use crate::AppState;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Returned to the student whenever the model call fails; the turn still
/// completes and the apology is persisted as the AI message.
pub const APOLOGY_REPLY: &str = "Thinking error. Please try again.";

/// How many prior messages are replayed into the prompt as short-term memory.
const MEMORY_MESSAGES: i64 = 10;

/// Page size for the history endpoint.
const HISTORY_LIMIT: i64 = 50;

pub fn chat_routes() -> Router {
    Router::new()
        .route("/chat", post(chat_tutor))
        .route("/history", get(get_history))
}

async fn chat_tutor(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    if payload.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                success: false,
                message: "Message must not be empty".to_string(),
            }),
        ));
    }

    let preview = prompt::message_preview(&payload.message);

    // Resolve the session: an explicit id must exist and belong to the
    // caller; without one a new session is created and its id returned.
    let session_id = match payload.session_id {
        Some(sid) => {
            let owner = sqlx::query_scalar::<_, String>(
                "SELECT user_id FROM chat_sessions WHERE id = $1",
            )
            .bind(sid)
            .fetch_optional(&state.db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to look up session {}: {}", sid, e);
                internal_error()
            })?;

            match owner {
                Some(user_id) if user_id == payload.user_id => {}
                _ => {
                    return Err((
                        StatusCode::NOT_FOUND,
                        Json(ErrorResponse {
                            success: false,
                            message: "Session not found".to_string(),
                        }),
                    ));
                }
            }

            sqlx::query(
                "UPDATE chat_sessions
                 SET subject = $1, chapter_id = $2, class_level = $3, group_name = $4,
                     last_message = $5, updated_at = NOW()
                 WHERE id = $6",
            )
            .bind(&payload.subject)
            .bind(&payload.chapter_id)
            .bind(&payload.class_level)
            .bind(&payload.group_name)
            .bind(&preview)
            .bind(sid)
            .execute(&state.db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update session {}: {}", sid, e);
                internal_error()
            })?;

            sid
        }
        None => {
            let sid = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO chat_sessions
                 (id, user_id, subject, chapter_id, class_level, group_name, last_message)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(sid)
            .bind(&payload.user_id)
            .bind(&payload.subject)
            .bind(&payload.chapter_id)
            .bind(&payload.class_level)
            .bind(&payload.group_name)
            .bind(&preview)
            .execute(&state.db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create session: {}", e);
                internal_error()
            })?;

            tracing::info!("Started new chat session {} for user {}", sid, payload.user_id);
            sid
        }
    };

    // Persist the student's message with a server-assigned sequence number
    let user_seq = insert_message(&state.db_pool, session_id, "user", &payload.message)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save user message: {}", e);
            internal_error()
        })?;

    // Retrieval context: vector search over chunks when Qdrant is up,
    // otherwise the single-key textbook lookup. Retrieval problems degrade
    // to the fallback string and never fail the turn.
    let key = retrieval::ContentKey::new(
        &payload.class_level,
        &payload.subject,
        &payload.chapter_id,
    );
    let context = match (&state.qdrant_client, &state.gemini_client) {
        (Some(qdrant), Some(gemini)) => {
            match qdrant.build_context_for_query(&payload.message, &key, gemini).await {
                Ok(ctx) if !ctx.is_empty() => {
                    retrieval::truncate_chars(&ctx, state.context_char_budget)
                }
                Ok(_) => retrieval::FALLBACK_CONTEXT.to_string(),
                Err(e) => {
                    tracing::warn!("Vector retrieval failed, falling back to textbook row: {}", e);
                    retrieval::fetch_context(&state.db_pool, &key, state.context_char_budget).await
                }
            }
        }
        _ => retrieval::fetch_context(&state.db_pool, &key, state.context_char_budget).await,
    };

    // Short-term memory: the last few exchanges before this message
    let history = fetch_recent_history(&state.db_pool, session_id, user_seq)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to load history for {}: {}", session_id, e);
            Vec::new()
        });

    let system_instruction =
        prompt::build_system_instruction(&payload.class_level, payload.medium.as_deref());
    let user_prompt = prompt::build_prompt(&context, &history, &payload.message);

    let (reply_text, usage) = match &state.gemini_client {
        Some(client) => match client.generate_reply(&system_instruction, &user_prompt).await {
            Ok(reply) => (reply.text, reply.usage),
            Err(e) => {
                tracing::warn!("Gemini call failed for session {}: {}", session_id, e);
                (APOLOGY_REPLY.to_string(), None)
            }
        },
        None => (APOLOGY_REPLY.to_string(), None),
    };

    insert_message(&state.db_pool, session_id, "ai", &reply_text)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save AI message: {}", e);
            internal_error()
        })?;

    // Usage accounting is best-effort; a failed write never fails the turn
    if let Some(usage) = usage {
        if let Err(e) = TokenUsageService::record_gemini_usage(
            &state.db_pool,
            session_id,
            &payload.user_id,
            crate::gemini_client::GENERATION_MODEL,
            usage.prompt_token_count,
            usage.candidates_token_count,
        )
        .await
        {
            tracing::warn!("Failed to record token usage: {}", e);
        }
    }
    if let Err(e) = TokenUsageService::bump_user_activity(&state.db_pool, &payload.user_id).await {
        tracing::warn!("Failed to bump activity for {}: {}", payload.user_id, e);
    }

    Ok(Json(ChatResponse {
        reply: reply_text,
        session_id,
    }))
}

/// Insert a message with the next per-session sequence number. Concurrent
/// writers can race on MAX(seq)+1; the unique constraint catches the loser
/// and a single retry resolves it.
async fn insert_message(
    pool: &PgPool,
    session_id: Uuid,
    sender: &str,
    text: &str,
) -> Result<i64, sqlx::Error> {
    match insert_message_once(pool, session_id, sender, text).await {
        Err(e) if is_unique_violation(&e) => {
            tracing::debug!("Sequence collision on session {}, retrying", session_id);
            insert_message_once(pool, session_id, sender, text).await
        }
        other => other,
    }
}

async fn insert_message_once(
    pool: &PgPool,
    session_id: Uuid,
    sender: &str,
    text: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO messages (session_id, seq, sender, text)
         VALUES ($1, (SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE session_id = $1), $2, $3)
         RETURNING seq",
    )
    .bind(session_id)
    .bind(sender)
    .bind(text)
    .fetch_one(pool)
    .await
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Last MEMORY_MESSAGES messages strictly before `before_seq`, oldest first.
async fn fetch_recent_history(
    pool: &PgPool,
    session_id: Uuid,
    before_seq: i64,
) -> Result<Vec<prompt::HistoryLine>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT sender, text FROM (
             SELECT sender, text, seq FROM messages
             WHERE session_id = $1 AND seq < $2
             ORDER BY seq DESC
             LIMIT $3
         ) recent
         ORDER BY seq ASC",
    )
    .bind(session_id)
    .bind(before_seq)
    .bind(MEMORY_MESSAGES)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(sender, text)| prompt::HistoryLine { sender, text })
        .collect())
}

async fn get_history(
    Query(params): Query<HistoryQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    // The session must belong to the requesting user
    let owner = sqlx::query_scalar::<_, String>(
        "SELECT user_id FROM chat_sessions WHERE id = $1",
    )
    .bind(params.session_id)
    .fetch_optional(&state.db_pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to verify session ownership: {}", e);
        internal_error()
    })?;

    match owner {
        Some(user_id) if user_id == params.user_id => {}
        _ => {
            return Err((
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    success: false,
                    message: "Session not found".to_string(),
                }),
            ));
        }
    }

    let rows = sqlx::query_as::<_, crate::models::chat::Message>(
        "SELECT * FROM messages
         WHERE session_id = $1
         ORDER BY seq ASC
         LIMIT $2",
    )
    .bind(params.session_id)
    .bind(HISTORY_LIMIT)
    .fetch_all(&state.db_pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch history for {}: {}", params.session_id, e);
        internal_error()
    })?;

    let messages: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "text": m.text,
                "is_user": m.sender == "user",
                "time": m.created_at.timestamp_millis(),
                "seq": m.seq,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({ "messages": messages })))
}

pub(crate) fn internal_error() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            success: false,
            message: "Internal server error".to_string(),
        }),
    )
}

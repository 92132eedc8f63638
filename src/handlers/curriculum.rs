// src/handlers/curriculum.rs
use crate::handlers::chat::internal_error;
use crate::models::curriculum::{ChapterItem, CurriculumQuery};
use crate::models::user::ErrorResponse;
use crate::AppState;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use std::sync::Arc;

pub fn curriculum_routes() -> Router {
    Router::new().route("/curriculum", get(get_curriculum))
}

/// Subject -> ordered chapter list for one class/group. An empty object
/// when nothing is stored, matching what clients already expect.
async fn get_curriculum(
    Query(params): Query<CurriculumQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<ErrorResponse>)> {
    let rows = sqlx::query_as::<_, (String, String, String, String)>(
        "SELECT subject, chapter_id, title, title_bn
         FROM curriculum_chapters
         WHERE class_level = $1 AND group_name = $2
         ORDER BY subject ASC, position ASC",
    )
    .bind(&params.class_level)
    .bind(&params.group_name)
    .fetch_all(&state.db_pool)
    .await
    .map_err(|e| {
        tracing::error!(
            "Failed to fetch curriculum for {} {}: {}",
            params.class_level,
            params.group_name,
            e
        );
        internal_error()
    })?;

    let mut curriculum = serde_json::Map::new();
    for (subject, chapter_id, title, title_bn) in rows {
        let chapter = ChapterItem {
            id: chapter_id,
            title,
            title_bn,
        };
        if let Ok(value) = serde_json::to_value(chapter) {
            if let Some(chapters) = curriculum
                .entry(subject)
                .or_insert_with(|| serde_json::Value::Array(Vec::new()))
                .as_array_mut()
            {
                chapters.push(value);
            }
        }
    }

    Ok(Json(serde_json::Value::Object(curriculum)))
}

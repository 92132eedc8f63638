// src/models/chat.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    pub class_level: String,
    pub group_name: String,
    pub subject: String,
    pub chapter_id: String,
    pub session_id: Option<Uuid>,
    pub medium: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: String,
    pub subject: String,
    pub chapter_id: String,
    pub class_level: String,
    pub group_name: String,
    pub custom_title: Option<String>,
    pub last_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub session_id: Uuid,
    pub seq: i64,
    pub sender: String,
    pub text: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: String,
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    pub user_id: String,
    pub new_title: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSessionQuery {
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_minimal() {
        let json = r#"{
            "user_id": "u1",
            "message": "what is gravity",
            "class_level": "Class 10",
            "group_name": "Science",
            "subject": "Physics",
            "chapter_id": "ch1"
        }"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.chapter_id, "ch1");
        assert!(req.session_id.is_none());
        assert!(req.medium.is_none());
    }

    #[test]
    fn test_chat_request_requires_chapter_id() {
        // "chapter" is not accepted as an alias
        let json = r#"{
            "user_id": "u1",
            "message": "hi",
            "class_level": "Class 10",
            "group_name": "Science",
            "subject": "Physics",
            "chapter": "ch1"
        }"#;
        assert!(serde_json::from_str::<ChatRequest>(json).is_err());
    }

    #[test]
    fn test_chat_request_with_session() {
        let sid = Uuid::new_v4();
        let json = format!(
            r#"{{
                "user_id": "u1",
                "message": "hi",
                "class_level": "Class 10",
                "group_name": "Science",
                "subject": "Physics",
                "chapter_id": "ch1",
                "session_id": "{}",
                "medium": "English Medium"
            }}"#,
            sid
        );
        let req: ChatRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.session_id, Some(sid));
        assert_eq!(req.medium.as_deref(), Some("English Medium"));
    }
}

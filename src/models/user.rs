use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub user_id: String,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub class_level: Option<String>,
    pub group_name: Option<String>,
    pub medium: Option<String>,
    pub language: Option<String>,
    pub last_active: chrono::DateTime<chrono::Utc>,
    pub message_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct UserProfileRequest {
    pub user_id: String,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub class_level: Option<String>,
    pub group_name: Option<String>,
    pub medium: Option<String>,
    pub language: Option<String>,
}

impl UserProfileRequest {
    /// Display name assembled from the name parts, double spaces collapsed.
    /// None when the request carries no first name.
    pub fn display_name(&self) -> Option<String> {
        let first = self.first_name.as_deref()?;
        let full = format!(
            "{} {} {}",
            first,
            self.middle_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or(""),
        );
        Some(full.replace("  ", " ").trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub email: String,
    pub mobile: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_names(first: Option<&str>, middle: Option<&str>, last: Option<&str>) -> UserProfileRequest {
        UserProfileRequest {
            user_id: "u1".to_string(),
            first_name: first.map(String::from),
            middle_name: middle.map(String::from),
            last_name: last.map(String::from),
            email: None,
            mobile: None,
            class_level: None,
            group_name: None,
            medium: None,
            language: None,
        }
    }

    #[test]
    fn test_display_name_full() {
        let req = request_with_names(Some("Abdul"), Some("Karim"), Some("Rahman"));
        assert_eq!(req.display_name(), Some("Abdul Karim Rahman".to_string()));
    }

    #[test]
    fn test_display_name_missing_middle() {
        let req = request_with_names(Some("Abdul"), None, Some("Rahman"));
        assert_eq!(req.display_name(), Some("Abdul Rahman".to_string()));
    }

    #[test]
    fn test_display_name_requires_first() {
        let req = request_with_names(None, None, Some("Rahman"));
        assert_eq!(req.display_name(), None);
    }
}

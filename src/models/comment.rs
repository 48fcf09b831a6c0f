//! Comment and like models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A comment as listed by the backend, top-level or reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentTreeItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub like_count: i64,
}

impl CommentTreeItem {
    /// Avatar initials: first two characters of the author id, uppercased
    pub fn initials(&self) -> String {
        self.user_id.to_string().chars().take(2).collect::<String>().to_uppercase()
    }

    /// Whether the comment was edited after creation
    pub fn is_edited(&self) -> bool {
        matches!(self.updated_at, Some(updated) if updated > self.created_at)
    }
}

/// Body for creating or editing a comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_comment_id: Option<Uuid>,
}

/// Like state of a comment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentLikeResponse {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub is_liked: bool,
}

/// Like state of a blog post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub is_liked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(user_id: &str) -> CommentTreeItem {
        CommentTreeItem {
            id: Uuid::new_v4(),
            user_id: user_id.parse().unwrap(),
            content: "hi".to_string(),
            created_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            updated_at: None,
            reply_count: 0,
            like_count: 0,
        }
    }

    #[test]
    fn test_initials() {
        let c = comment("ab12cd34-0000-0000-0000-000000000000");
        assert_eq!(c.initials(), "AB");
    }

    #[test]
    fn test_is_edited() {
        let mut c = comment("ab12cd34-0000-0000-0000-000000000000");
        assert!(!c.is_edited());
        c.updated_at = Some(c.created_at);
        assert!(!c.is_edited());
        c.updated_at = Some("2024-01-02T00:00:00Z".parse().unwrap());
        assert!(c.is_edited());
    }

    #[test]
    fn test_request_omits_missing_parent() {
        let body = serde_json::to_value(CommentRequest {
            content: "x".to_string(),
            parent_comment_id: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "content": "x" }));
    }

    #[test]
    fn test_like_payloads() {
        let like: LikeResponse = serde_json::from_str(r#"{"likeCount": 4, "isLiked": true}"#).unwrap();
        assert_eq!(like, LikeResponse { like_count: 4, is_liked: true });

        let like: CommentLikeResponse = serde_json::from_str(r#"{"count": 2}"#).unwrap();
        assert_eq!(like, CommentLikeResponse { count: 2, is_liked: false });
    }
}

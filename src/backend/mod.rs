//! Remote backend API
//!
//! Everything this site shows comes from the backend service: posts,
//! comments, likes, the signed-in user and the AI chat. `BackendApi` is the
//! seam services and handlers talk to; `HttpBackend` implements it over
//! reqwest.

mod http;
#[cfg(test)]
pub mod stub;

pub use http::HttpBackend;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    BlogPost, ChatMessage, CommentLikeResponse, CommentRequest, CommentTreeItem, LikeResponse,
    Page, PageRequest, UserProfile,
};

/// Errors from talking to the backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("resource not found")]
    NotFound,
    #[error("not authorized")]
    Unauthorized,
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("invalid backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Transport failures and server errors may succeed on another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Typed access to the backend endpoints.
///
/// Calls that act on behalf of a user take the user's bearer token; public
/// reads take none.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// `GET /v1/blog`
    async fn list_posts(&self, page: &PageRequest) -> BackendResult<Page<BlogPost>>;

    /// `GET /v1/blog/{slug}`
    async fn get_post(&self, slug: &str) -> BackendResult<BlogPost>;

    /// `GET /v1/blog/tag/{tag}`
    async fn posts_by_tag(&self, tag: &str, page: &PageRequest) -> BackendResult<Page<BlogPost>>;

    /// `GET /v1/blog/{postId}/comments`
    async fn top_level_comments(
        &self,
        post_id: Uuid,
        page: &PageRequest,
    ) -> BackendResult<Page<CommentTreeItem>>;

    /// `GET /v1/blog/{postId}/comments/count`
    async fn comment_count(&self, post_id: Uuid) -> BackendResult<i64>;

    /// `GET /v1/comments/{id}/replies`
    async fn replies(&self, comment_id: Uuid, page: &PageRequest) -> BackendResult<Page<CommentTreeItem>>;

    /// `POST /v1/blog/{postId}/comments`
    async fn create_comment(
        &self,
        token: &str,
        post_id: Uuid,
        request: &CommentRequest,
    ) -> BackendResult<CommentTreeItem>;

    /// `PATCH /v1/comments/{id}`
    async fn update_comment(&self, token: &str, comment_id: Uuid, content: &str) -> BackendResult<CommentTreeItem>;

    /// `DELETE /v1/comments/{id}`
    async fn delete_comment(&self, token: &str, comment_id: Uuid) -> BackendResult<()>;

    /// `GET /v1/comments/{id}/like`
    async fn comment_like_info(&self, token: Option<&str>, comment_id: Uuid) -> BackendResult<CommentLikeResponse>;

    /// `POST /v1/comments/{id}/like`
    async fn toggle_comment_like(&self, token: &str, comment_id: Uuid) -> BackendResult<CommentLikeResponse>;

    /// `GET /v1/blog/{postId}/like`
    async fn post_like_info(&self, token: Option<&str>, post_id: Uuid) -> BackendResult<LikeResponse>;

    /// `POST /v1/blog/{postId}/like`
    async fn toggle_post_like(&self, token: &str, post_id: Uuid) -> BackendResult<LikeResponse>;

    /// `GET /v1/users/me`
    async fn current_user(&self, token: &str) -> BackendResult<UserProfile>;

    /// `GET /v1/ai/chat/chat`, plain-text reply
    async fn chat(&self, token: Option<&str>, conversation_id: &str, message: &str) -> BackendResult<String>;

    /// `GET /v1/ai/chat/history`
    async fn chat_history(&self, token: Option<&str>, conversation_id: &str) -> BackendResult<Vec<ChatMessage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(BackendError::Transport("reset".into()).is_retryable());
        assert!(BackendError::Status { status: 503, message: String::new() }.is_retryable());
        assert!(!BackendError::Status { status: 400, message: String::new() }.is_retryable());
        assert!(!BackendError::NotFound.is_retryable());
        assert!(!BackendError::Unauthorized.is_retryable());
        assert!(!BackendError::Decode("bad".into()).is_retryable());
    }
}

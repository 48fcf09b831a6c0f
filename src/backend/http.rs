//! reqwest implementation of `BackendApi`

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

use super::{BackendApi, BackendError, BackendResult};
use crate::config::BackendConfig;
use crate::models::{
    BlogPost, ChatMessage, CommentLikeResponse, CommentRequest, CommentTreeItem, LikeResponse,
    Page, PageRequest, UserProfile,
};

/// Base delay between retries, doubled per attempt
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Upper bound for a single retry delay
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Longest error body kept in `BackendError::Status`
const MAX_ERROR_MESSAGE_LEN: usize = 300;

/// HTTP client for the backend API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    chat_client: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            chat_client: config.chat_client.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build a request; the bearer token is only attached when given
    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder) -> BackendResult<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status.as_u16() {
            404 => Err(BackendError::NotFound),
            401 | 403 => Err(BackendError::Unauthorized),
            code => {
                let body = response.text().await.unwrap_or_default();
                Err(BackendError::Status {
                    status: code,
                    message: error_message(&body),
                })
            }
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    /// GET with retries on transport failures and 5xx responses
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> BackendResult<T> {
        let mut attempt = 0;
        loop {
            let builder = self.request(Method::GET, path, token).query(query);
            match Self::send(builder).await {
                Ok(response) => return Self::decode(response).await,
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = retry_delay(attempt);
                    tracing::debug!(path, attempt, ?delay, "Retrying backend read after error: {}", e);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> BackendResult<T> {
        let response = Self::send(builder).await?;
        Self::decode(response).await
    }
}

/// Exponential backoff for the given 1-based attempt, capped
fn retry_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    RETRY_BASE_DELAY.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

/// Prefer the `message` field of a JSON error body
fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn list_posts(&self, page: &PageRequest) -> BackendResult<Page<BlogPost>> {
        self.get_json("/v1/blog", &page.query_pairs(), None).await
    }

    async fn get_post(&self, slug: &str) -> BackendResult<BlogPost> {
        self.get_json(&format!("/v1/blog/{}", segment(slug)), &[], None).await
    }

    async fn posts_by_tag(&self, tag: &str, page: &PageRequest) -> BackendResult<Page<BlogPost>> {
        self.get_json(&format!("/v1/blog/tag/{}", segment(tag)), &page.query_pairs(), None)
            .await
    }

    async fn top_level_comments(
        &self,
        post_id: Uuid,
        page: &PageRequest,
    ) -> BackendResult<Page<CommentTreeItem>> {
        self.get_json(&format!("/v1/blog/{}/comments", post_id), &page.query_pairs(), None)
            .await
    }

    async fn comment_count(&self, post_id: Uuid) -> BackendResult<i64> {
        self.get_json(&format!("/v1/blog/{}/comments/count", post_id), &[], None)
            .await
    }

    async fn replies(&self, comment_id: Uuid, page: &PageRequest) -> BackendResult<Page<CommentTreeItem>> {
        self.get_json(&format!("/v1/comments/{}/replies", comment_id), &page.query_pairs(), None)
            .await
    }

    async fn create_comment(
        &self,
        token: &str,
        post_id: Uuid,
        request: &CommentRequest,
    ) -> BackendResult<CommentTreeItem> {
        let builder = self
            .request(Method::POST, &format!("/v1/blog/{}/comments", post_id), Some(token))
            .json(request);
        self.send_json(builder).await
    }

    async fn update_comment(&self, token: &str, comment_id: Uuid, content: &str) -> BackendResult<CommentTreeItem> {
        let body = CommentRequest {
            content: content.to_string(),
            parent_comment_id: None,
        };
        let builder = self
            .request(Method::PATCH, &format!("/v1/comments/{}", comment_id), Some(token))
            .json(&body);
        self.send_json(builder).await
    }

    async fn delete_comment(&self, token: &str, comment_id: Uuid) -> BackendResult<()> {
        let builder = self.request(Method::DELETE, &format!("/v1/comments/{}", comment_id), Some(token));
        Self::send(builder).await?;
        Ok(())
    }

    async fn comment_like_info(&self, token: Option<&str>, comment_id: Uuid) -> BackendResult<CommentLikeResponse> {
        self.get_json(&format!("/v1/comments/{}/like", comment_id), &[], token)
            .await
    }

    async fn toggle_comment_like(&self, token: &str, comment_id: Uuid) -> BackendResult<CommentLikeResponse> {
        let builder = self.request(Method::POST, &format!("/v1/comments/{}/like", comment_id), Some(token));
        self.send_json(builder).await
    }

    async fn post_like_info(&self, token: Option<&str>, post_id: Uuid) -> BackendResult<LikeResponse> {
        self.get_json(&format!("/v1/blog/{}/like", post_id), &[], token).await
    }

    async fn toggle_post_like(&self, token: &str, post_id: Uuid) -> BackendResult<LikeResponse> {
        let builder = self.request(Method::POST, &format!("/v1/blog/{}/like", post_id), Some(token));
        self.send_json(builder).await
    }

    async fn current_user(&self, token: &str) -> BackendResult<UserProfile> {
        self.get_json("/v1/users/me", &[], Some(token)).await
    }

    async fn chat(&self, token: Option<&str>, conversation_id: &str, message: &str) -> BackendResult<String> {
        // Not retried: every call appends to the conversation memory
        let builder = self.request(Method::GET, "/v1/ai/chat/chat", token).query(&[
            ("message", message),
            ("conversationId", conversation_id),
            ("clientBean", self.chat_client.as_str()),
        ]);
        let response = Self::send(builder).await?;
        response
            .text()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn chat_history(&self, token: Option<&str>, conversation_id: &str) -> BackendResult<Vec<ChatMessage>> {
        self.get_json(
            "/v1/ai/chat/history",
            &[("conversationId", conversation_id.to_string())],
            token,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(api_url: &str) -> HttpBackend {
        HttpBackend::new(&BackendConfig {
            api_url: api_url.to_string(),
            ..BackendConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        assert_eq!(backend("http://api/api/").url("/v1/blog"), "http://api/api/v1/blog");
        assert_eq!(backend("http://api/api").url("/v1/blog"), "http://api/api/v1/blog");
    }

    #[test]
    fn test_path_segments_are_encoded() {
        assert_eq!(segment("hello world"), "hello%20world");
        assert_eq!(segment("a/b"), "a%2Fb");
        assert_eq!(segment("rust"), "rust");
    }

    #[test]
    fn test_error_message_prefers_json_message() {
        assert_eq!(
            error_message(r#"{"status": 400, "message": "Content must not be blank"}"#),
            "Content must not be blank"
        );
        assert_eq!(error_message("  plain failure \n"), "plain failure");
        assert_eq!(error_message(&"x".repeat(1000)).len(), MAX_ERROR_MESSAGE_LEN);
    }

    #[test]
    fn test_bearer_only_when_token_given() {
        let backend = backend("http://api");
        let with = backend.request(Method::GET, "/v1/users/me", Some("abc")).build().unwrap();
        assert_eq!(
            with.headers().get(reqwest::header::AUTHORIZATION).unwrap(),
            "Bearer abc"
        );

        let without = backend.request(Method::GET, "/v1/blog", None).build().unwrap();
        assert!(without.headers().get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let backend = HttpBackend::new(&BackendConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            max_retries: 0,
            ..BackendConfig::default()
        })
        .unwrap();

        let err = backend.get_post("missing").await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_)));
    }

    #[test]
    fn test_retry_delay_doubles_and_saturates() {
        assert_eq!(retry_delay(1), Duration::from_millis(200));
        assert_eq!(retry_delay(2), Duration::from_millis(400));
        assert_eq!(retry_delay(3), Duration::from_millis(800));
        assert_eq!(retry_delay(33), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(u32::MAX), MAX_RETRY_DELAY);
    }

    mod wire {
        use super::*;
        use axum::extract::State;
        use axum::http::{StatusCode, Uri};
        use axum::response::{IntoResponse, Response as AxumResponse};
        use std::collections::HashMap;
        use std::sync::{Arc, Mutex};

        type Hits = Arc<Mutex<HashMap<String, usize>>>;

        /// Canned backend answers, counting every request by method and path
        async fn canned(State(hits): State<Hits>, method: Method, uri: Uri) -> AxumResponse {
            *hits.lock().unwrap().entry(format!("{} {}", method, uri.path())).or_default() += 1;

            match (method.as_str(), uri.path()) {
                ("GET", "/v1/blog") => axum::Json(serde_json::json!({ "last": true, "totalElements": 0 })).into_response(),
                ("GET", "/v1/blog/flaky") => (StatusCode::INTERNAL_SERVER_ERROR, "upstream down").into_response(),
                ("GET", "/v1/blog/bad") => (
                    StatusCode::BAD_REQUEST,
                    axum::Json(serde_json::json!({ "status": 400, "message": "Invalid slug" })),
                )
                    .into_response(),
                ("GET", "/v1/blog/forbidden") => StatusCode::FORBIDDEN.into_response(),
                ("GET", "/v1/users/me") => StatusCode::UNAUTHORIZED.into_response(),
                ("POST", _) => (StatusCode::INTERNAL_SERVER_ERROR, "write failed").into_response(),
                _ => StatusCode::NOT_FOUND.into_response(),
            }
        }

        async fn canned_backend(max_retries: u32) -> (HttpBackend, Hits) {
            let hits = Hits::default();
            let app = axum::Router::new().fallback(canned).with_state(hits.clone());
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            let backend = HttpBackend::new(&BackendConfig {
                api_url: format!("http://{}", addr),
                timeout_secs: 5,
                max_retries,
                ..BackendConfig::default()
            })
            .unwrap();
            (backend, hits)
        }

        fn hit_count(hits: &Hits, key: &str) -> usize {
            hits.lock().unwrap().get(key).copied().unwrap_or(0)
        }

        #[tokio::test]
        async fn test_server_errors_are_retried_on_reads() {
            let (backend, hits) = canned_backend(2).await;

            let err = backend.get_post("flaky").await.unwrap_err();

            assert!(matches!(err, BackendError::Status { status: 500, .. }));
            assert_eq!(hit_count(&hits, "GET /v1/blog/flaky"), 3);
        }

        #[tokio::test]
        async fn test_client_errors_are_not_retried() {
            let (backend, hits) = canned_backend(2).await;

            let err = backend.get_post("bad").await.unwrap_err();

            assert_eq!(
                err,
                BackendError::Status {
                    status: 400,
                    message: "Invalid slug".to_string()
                }
            );
            assert_eq!(hit_count(&hits, "GET /v1/blog/bad"), 1);
        }

        #[tokio::test]
        async fn test_mutations_are_never_retried() {
            let (backend, hits) = canned_backend(2).await;
            let post_id = Uuid::new_v4();

            let err = backend.toggle_post_like("token", post_id).await.unwrap_err();

            assert!(matches!(err, BackendError::Status { status: 500, .. }));
            assert_eq!(hit_count(&hits, &format!("POST /v1/blog/{}/like", post_id)), 1);
        }

        #[tokio::test]
        async fn test_status_mapping() {
            let (backend, hits) = canned_backend(2).await;

            assert_eq!(backend.get_post("missing").await.unwrap_err(), BackendError::NotFound);
            assert_eq!(backend.get_post("forbidden").await.unwrap_err(), BackendError::Unauthorized);
            assert_eq!(backend.current_user("expired").await.unwrap_err(), BackendError::Unauthorized);

            assert_eq!(hit_count(&hits, "GET /v1/blog/missing"), 1);
            assert_eq!(hit_count(&hits, "GET /v1/users/me"), 1);
        }

        #[tokio::test]
        async fn test_page_without_content_is_empty() {
            let (backend, _hits) = canned_backend(0).await;

            let page = backend.list_posts(&PageRequest::new(0, 10)).await.unwrap();

            assert!(page.content.is_empty());
            assert!(!page.has_more());
        }
    }
}

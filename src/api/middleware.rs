//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error type
//! - Session loading and persistence
//! - Cookie and cache header helpers

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::backend::{BackendApi, BackendError};
use crate::cache::create_cache;
use crate::config::Config;
use crate::services::assistant::AssistantError;
use crate::services::auth::{safe_return_to, TokenClient};
use crate::services::comment::CommentServiceError;
use crate::services::session::{Session, SessionStore, SESSION_COOKIE};
use crate::services::theme::{Theme, THEME_COOKIE};
use crate::services::{AssistantService, AuthService, CommentService, PostService};
use crate::templates::TemplateEngine;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub backend: Arc<dyn BackendApi>,
    pub sessions: SessionStore,
    pub auth: Arc<AuthService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub assistant: Arc<AssistantService>,
    pub templates: Arc<RwLock<TemplateEngine>>,
}

/// Entries held by each in-memory cache
const CACHE_CAPACITY: u64 = 10_000;

impl AppState {
    /// Wire the services together over a backend and token endpoint
    pub fn new(config: Config, backend: Arc<dyn BackendApi>, tokens: Arc<dyn TokenClient>) -> anyhow::Result<Self> {
        let post_ttl = Duration::from_secs(config.cache.ttl_seconds);
        let session_ttl = Duration::from_secs(config.cache.session_ttl_seconds);
        // Posts expire on their own schedule; sessions and conversations
        // live in a separate cache so the post TTL never caps them.
        let post_cache = create_cache(CACHE_CAPACITY, post_ttl);
        let state_cache = create_cache(CACHE_CAPACITY, session_ttl);

        let templates = TemplateEngine::new(&config.templates.path)?;
        let auth = AuthService::new(&config.oidc, &config.server, tokens, backend.clone());
        let posts = PostService::new(backend.clone(), post_cache, post_ttl);
        let comments = CommentService::new(
            backend.clone(),
            config.blog.comments_page_size,
            config.blog.replies_page_size,
        );
        let assistant = AssistantService::new(
            backend.clone(),
            state_cache.clone(),
            session_ttl,
            config.assistant.quick_prompts.clone(),
        );

        Ok(Self {
            sessions: SessionStore::new(state_cache, session_ttl),
            auth: Arc::new(auth),
            posts: Arc::new(posts),
            comments: Arc::new(comments),
            assistant: Arc::new(assistant),
            templates: Arc::new(RwLock::new(templates)),
            backend,
            config: Arc::new(config),
        })
    }
}

/// The visitor's session, shared between a handler and the session layer
#[derive(Clone)]
pub struct CurrentSession(pub Arc<Mutex<Session>>);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(code: impl Into<String>, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new("BAD_GATEWAY", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "BAD_GATEWAY" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound => Self::not_found("Resource not found"),
            BackendError::Unauthorized => Self::unauthorized("Not authorized"),
            BackendError::Status { status, message } if (400..500).contains(&status) => {
                Self::with_details("VALIDATION_ERROR", message, serde_json::json!({ "status": status }))
            }
            other => {
                tracing::warn!("Backend request failed: {}", other);
                Self::bad_gateway("Backend unavailable")
            }
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(e: CommentServiceError) -> Self {
        match e {
            CommentServiceError::EmptyContent => Self::validation_error(e.to_string()),
            CommentServiceError::Backend(e) => e.into(),
        }
    }
}

impl From<AssistantError> for ApiError {
    fn from(e: AssistantError) -> Self {
        Self::validation_error(e.to_string())
    }
}

/// Read a cookie value from request headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|cookie| cookie.trim().strip_prefix(prefix.as_str()).map(str::to_string))
        .map(|value| urlencoding::decode(&value).map(|v| v.into_owned()).unwrap_or(value))
}

/// Lifetime of preference cookies
pub const ONE_YEAR_SECS: u64 = 31_536_000;

/// Attributes of a `Set-Cookie` header
#[derive(Debug, Clone, Copy)]
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    /// None makes a browser-session cookie
    pub max_age_secs: Option<u64>,
}

pub fn set_cookie(name: &str, value: &str, options: CookieOptions) -> String {
    let mut cookie = format!("{}={}; Path=/; SameSite=Lax", name, urlencoding::encode(value));
    if let Some(max_age) = options.max_age_secs {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    if options.http_only {
        cookie.push_str("; HttpOnly");
    }
    if options.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Append a `Set-Cookie` header to a response
pub fn append_cookie(response: &mut Response, cookie: String) {
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Invalid cookie header: {}", e),
    }
}

/// Redirect for form posts: the submitted `return_to` when it is a same-site
/// path, `fallback` otherwise
pub fn redirect_back(return_to: Option<&str>, fallback: &str) -> Redirect {
    match return_to.filter(|path| !path.is_empty()) {
        Some(path) => Redirect::to(&safe_return_to(Some(path))),
        None => Redirect::to(fallback),
    }
}

/// Theme chosen by the `theme` cookie
pub fn theme_from(headers: &HeaderMap) -> Theme {
    Theme::from_cookie(read_cookie(headers, THEME_COOKIE).as_deref())
}

/// Session middleware
///
/// Loads (or starts) the visitor's session, hands it to the handler through
/// request extensions and stores it again afterwards. A new session is only
/// persisted, and its cookie only set, once it holds something.
pub async fn session_layer(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let cookie = read_cookie(request.headers(), SESSION_COOKIE);
    let (session, created) = state.sessions.load_or_create(cookie.as_deref()).await;
    let original_id = session.id.clone();

    let shared = Arc::new(Mutex::new(session));
    request.extensions_mut().insert(CurrentSession(shared.clone()));

    let mut response = next.run(request).await;

    let session = shared.lock().await;
    if created && session.is_empty() {
        return response;
    }

    if let Err(e) = state.sessions.save(&session).await {
        tracing::error!("Failed to save session: {}", e);
        return response;
    }

    let rotated = session.id != original_id;
    if rotated && !created {
        if let Err(e) = state.sessions.destroy(&original_id).await {
            tracing::warn!("Failed to drop rotated session: {}", e);
        }
    }

    if created || rotated {
        let options = CookieOptions {
            http_only: true,
            secure: state.config.server.secure_cookies,
            max_age_secs: Some(state.config.cache.session_ttl_seconds),
        };
        append_cookie(&mut response, set_cookie(SESSION_COOKIE, &session.id, options));
    }

    response
}

/// Build Cache-Control header for static assets
pub fn cache_control_static(max_age: u64, immutable: bool) -> String {
    if immutable {
        format!("public, max-age={}, immutable", max_age)
    } else {
        format!("public, max-age={}", max_age)
    }
}

/// Build Cache-Control header for per-visitor pages
pub fn cache_control_no_cache() -> String {
    "no-cache, no-store, must-revalidate".to_string()
}

/// Middleware keeping rendered pages out of shared caches
pub async fn add_page_cache_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    if !response.headers().contains_key(header::CACHE_CONTROL) {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store, must-revalidate"));
    }
    response
}

//! HTTP layer - handlers and routing
//!
//! It includes:
//! - Rendered pages (blog list, tag list, post detail)
//! - Form actions (comments, likes, assistant, theme)
//! - Sign-in through the identity provider
//! - The JSON API under `/api`
//! - Static assets and the health check

pub mod assistant;
pub mod auth;
pub mod comments;
pub mod likes;
pub mod middleware;
pub mod pages;
pub mod preferences;
pub mod static_files;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use middleware::{cache_control_no_cache, cache_control_static, ApiError, AppState, CurrentSession};

/// JSON API, nested under `/api`
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .merge(pages::api_router())
        .merge(comments::api_router())
        .merge(likes::api_router())
        .merge(assistant::api_router())
        .merge(auth::api_router())
        .merge(preferences::api_router())
        .fallback(api_not_found)
}

async fn api_not_found() -> ApiError {
    ApiError::not_found("No such endpoint")
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::COOKIE])
        .allow_credentials(true);
    match state.config.server.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(e) => tracing::warn!(
            origin = %state.config.server.cors_origin,
            "Ignoring invalid CORS origin: {}",
            e
        ),
    }

    // Everything a visitor interacts with runs inside a session
    let site = Router::new()
        .merge(pages::router())
        .merge(comments::router())
        .merge(likes::router())
        .merge(assistant::router())
        .merge(auth::router())
        .merge(preferences::router())
        .nest("/api", build_api_router())
        .fallback(pages::fallback)
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::session_layer))
        .layer(axum_middleware::from_fn(middleware::add_page_cache_headers));

    Router::new()
        .route("/healthz", get(static_files::healthz))
        .route("/static/{*path}", get(static_files::serve_static))
        .merge(site)
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! Static file serving
//!
//! Files under `/static/*` come from the configured assets directory when it
//! has them, otherwise from the set embedded in the binary.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;
use std::path::{Component, PathBuf};
use tokio::fs;

use crate::api::middleware::{cache_control_static, AppState};

/// Embedded stylesheets and scripts
#[derive(RustEmbed)]
#[folder = "static/"]
struct EmbeddedAssets;

/// `GET /static/{*path}`
pub async fn serve_static(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let Some(relative) = sanitize(&path) else {
        tracing::debug!(path = %path, "Rejected static asset path");
        return not_found();
    };

    let cache_control = cache_control_static(state.config.assets.max_age_secs, true);

    let disk_path = state.config.assets.path.join(&relative);
    if let Ok(contents) = fs::read(&disk_path).await {
        return build_response(&path, contents, &cache_control);
    }

    let embedded_name = relative.to_string_lossy().replace('\\', "/");
    match EmbeddedAssets::get(&embedded_name) {
        Some(content) => build_response(&path, content.data.into_owned(), &cache_control),
        None => not_found(),
    }
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "OK"
}

/// Relative path inside the assets root, or None when the request tries to
/// leave it
fn sanitize(path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(path).ok()?;
    let mut relative = PathBuf::new();
    for component in std::path::Path::new(decoded.as_ref()).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}

fn build_response(path: &str, data: Vec<u8>, cache_control: &str) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, get_content_type(path).to_string()),
            (header::CACHE_CONTROL, cache_control.to_string()),
        ],
        data,
    )
        .into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Not Found",
    )
        .into_response()
}

/// Get content type from file extension
fn get_content_type(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "webp" => "image/webp",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

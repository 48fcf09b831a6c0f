//! Theme switch and toast delivery

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{
    append_cookie, redirect_back, set_cookie, theme_from, AppState, CookieOptions, CurrentSession,
    ONE_YEAR_SECS,
};
use crate::services::theme::THEME_COOKIE;
use crate::services::toast::Toast;

/// Form routes
pub fn router() -> Router<AppState> {
    Router::new().route("/theme/toggle", post(toggle_theme))
}

/// JSON routes, nested under `/api`
pub fn api_router() -> Router<AppState> {
    Router::new().route("/toasts", get(drain_toasts))
}

#[derive(Debug, Deserialize)]
pub struct ThemeForm {
    #[serde(default)]
    pub return_to: Option<String>,
}

async fn toggle_theme(State(state): State<AppState>, headers: HeaderMap, Form(form): Form<ThemeForm>) -> Response {
    let theme = theme_from(&headers).toggle();
    tracing::debug!(theme = theme.as_str(), "Theme switched");

    let mut response = redirect_back(form.return_to.as_deref(), "/").into_response();
    append_cookie(
        &mut response,
        set_cookie(
            THEME_COOKIE,
            theme.as_str(),
            CookieOptions {
                http_only: false,
                secure: state.config.server.secure_cookies,
                max_age_secs: Some(ONE_YEAR_SECS),
            },
        ),
    );
    response
}

async fn drain_toasts(Extension(current): Extension<CurrentSession>) -> Json<Vec<Toast>> {
    Json(current.0.lock().await.toasts.drain())
}

//! Authentication endpoints
//!
//! - GET /auth/login - Redirect to the identity provider
//! - GET /auth/callback - Finish the authorization code flow
//! - GET /auth/logout - Sign out locally and at the provider
//! - GET /auth/account - Provider account page
//! - GET /api/me - Current user

use axum::{
    extract::{Extension, Query, State},
    response::Redirect,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{AppState, CurrentSession};
use crate::models::ConnectedUser;
use crate::services::toast::ToastKind;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/logout", get(logout))
        .route("/auth/account", get(account))
}

/// JSON routes, nested under `/api`
pub fn api_router() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub return_to: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Query(query): Query<LoginQuery>,
) -> Redirect {
    let mut session = current.0.lock().await;
    let url = state.auth.begin_login(&mut session, query.return_to.as_deref());
    Redirect::to(&url)
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

async fn callback(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let auto_hide = state.config.toast.auto_hide_ms;
    let mut session = current.0.lock().await;

    if let Some(error) = query.error.as_deref() {
        tracing::warn!(
            error = error,
            description = query.error_description.as_deref().unwrap_or(""),
            "Identity provider returned an error"
        );
        session.pending_login = None;
        session.toast("Sign-in failed. Please try again.", ToastKind::Danger, auto_hide);
        return Redirect::to("/");
    }

    let (Some(code), Some(login_state)) = (query.code.as_deref(), query.state.as_deref()) else {
        session.toast("Sign-in failed. Please try again.", ToastKind::Danger, auto_hide);
        return Redirect::to("/");
    };

    match state.auth.complete_login(&mut session, code, login_state).await {
        Ok(return_to) => {
            session.rotate_id();
            let greeting = match session.user.value().filter(|user| user.is_connected()) {
                Some(user) => format!("Signed in as {}", user.display_name()),
                None => "Signed in".to_string(),
            };
            session.toast(greeting, ToastKind::Success, auto_hide);
            Redirect::to(&return_to)
        }
        Err(e) => {
            tracing::warn!("Login failed: {}", e);
            session.toast("Sign-in failed. Please try again.", ToastKind::Danger, auto_hide);
            Redirect::to("/")
        }
    }
}

async fn logout(State(state): State<AppState>, Extension(current): Extension<CurrentSession>) -> Redirect {
    let mut session = current.0.lock().await;
    let url = state.auth.logout_url(&mut session);
    session.toast("Signed out", ToastKind::Info, state.config.toast.auto_hide_ms);
    tracing::info!("User logged out");
    Redirect::to(&url)
}

async fn account(State(state): State<AppState>) -> Redirect {
    Redirect::to(state.auth.account_url())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub authenticated: bool,
    pub user: Option<ConnectedUser>,
}

async fn me(State(state): State<AppState>, Extension(current): Extension<CurrentSession>) -> Json<MeResponse> {
    let mut session = current.0.lock().await;
    let authenticated = state.auth.access_token(&mut session).await.is_some();
    Json(MeResponse {
        authenticated,
        user: session.user.value().cloned().filter(|_| authenticated),
    })
}

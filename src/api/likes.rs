//! Post like endpoints
//!
//! The like state of every post the visitor has seen is kept in the session,
//! so a failed refresh still shows the last known count.

use axum::{
    extract::{Extension, Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::{redirect_back, ApiError, AppState, CurrentSession};
use crate::services::like::{self, LikeState, ToggleOutcome};
use crate::services::session::Session;
use crate::services::toast::ToastKind;

/// Form routes
pub fn router() -> Router<AppState> {
    Router::new().route("/blog/{slug}/like", post(toggle_like_form))
}

/// JSON routes, nested under `/api`
pub fn api_router() -> Router<AppState> {
    Router::new().route("/blog/{post_id}/like", get(get_like).post(toggle_like))
}

/// Toggle the visitor's like on a post, updating the cached state.
///
/// A failed toggle raises a danger toast.
async fn toggle_in_session(state: &AppState, session: &mut Session, post_id: Uuid) -> (ToggleOutcome, LikeState) {
    let token = state.auth.access_token(session).await;
    let backend = state.backend.as_ref();

    let mut current = match session.post_likes.get(&post_id).copied() {
        Some(cached) => cached,
        None if token.is_none() => return (ToggleOutcome::NotAuthenticated, LikeState::default()),
        None => match like::load(backend, token.as_deref(), post_id).await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(%post_id, "Failed to load like info before toggling: {}", e);
                session.toast("Failed to update like", ToastKind::Danger, state.config.toast.auto_hide_ms);
                return (ToggleOutcome::Failed, LikeState::default());
            }
        },
    };

    let outcome = like::toggle(backend, token.as_deref(), post_id, &mut current).await;
    session.post_likes.insert(post_id, current);
    if outcome == ToggleOutcome::Failed {
        session.toast("Failed to update like", ToastKind::Danger, state.config.toast.auto_hide_ms);
    }
    (outcome, current)
}

#[derive(Debug, Deserialize)]
pub struct LikeForm {
    #[serde(default)]
    pub return_to: Option<String>,
}

async fn toggle_like_form(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(slug): Path<String>,
    Form(form): Form<LikeForm>,
) -> Response {
    let post_path = format!("/blog/{}", urlencoding::encode(&slug));
    let back = redirect_back(form.return_to.as_deref(), &post_path);

    let post = match state.posts.by_slug(&slug).await {
        Ok(post) => post,
        Err(e) => {
            tracing::warn!(slug = %slug, "Failed to resolve post for like: {}", e);
            return back.into_response();
        }
    };

    let mut session = current.0.lock().await;
    let (outcome, _) = toggle_in_session(&state, &mut session, post.id).await;
    if outcome == ToggleOutcome::NotAuthenticated {
        session.toast("Please sign in to like posts", ToastKind::Warning, state.config.toast.auto_hide_ms);
    }
    back.into_response()
}

async fn get_like(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<LikeState>, ApiError> {
    let mut session = current.0.lock().await;
    let token = state.auth.access_token(&mut session).await;

    match like::load(state.backend.as_ref(), token.as_deref(), post_id).await {
        Ok(fresh) => {
            session.post_likes.insert(post_id, fresh);
            Ok(Json(fresh))
        }
        Err(e) => match session.post_likes.get(&post_id) {
            Some(cached) => {
                tracing::warn!(%post_id, "Failed to refresh like info, serving cached state: {}", e);
                Ok(Json(*cached))
            }
            None => Err(e.into()),
        },
    }
}

async fn toggle_like(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<LikeState>, ApiError> {
    let mut session = current.0.lock().await;
    match toggle_in_session(&state, &mut session, post_id).await {
        (ToggleOutcome::Toggled, like) => Ok(Json(like)),
        (ToggleOutcome::NotAuthenticated, _) => Err(ApiError::unauthorized("Sign in required")),
        (ToggleOutcome::Busy, _) => Err(ApiError::conflict("A like toggle is already in progress")),
        (ToggleOutcome::Failed, like) => Err(ApiError::with_details(
            "BAD_GATEWAY",
            "Failed to update like",
            serde_json::json!({ "liked": like.liked, "count": like.count }),
        )),
    }
}

//! Comment endpoints
//!
//! Form posts redirect back to the post with the outcome as a toast. The JSON
//! routes answer with the backend records.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::{redirect_back, ApiError, AppState, CurrentSession};
use crate::models::{CommentLikeResponse, CommentRequest, CommentTreeItem};
use crate::services::comment::{CommentServiceError, CommentThread, ReplyThread};
use crate::services::toast::ToastKind;

/// Form routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/blog/{slug}/comments", post(create_comment_form))
        .route("/comments/{id}/edit", post(edit_comment_form))
        .route("/comments/{id}/delete", post(delete_comment_form))
        .route("/comments/{id}/like", post(toggle_comment_like_form))
}

/// JSON routes, nested under `/api`
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/blog/{post_id}/comments", get(list_comments).post(create_comment))
        .route("/blog/{post_id}/comments/count", get(comment_count))
        .route("/comments/{id}/replies", get(list_replies))
        .route("/comments/{id}", patch(update_comment).delete(delete_comment))
        .route("/comments/{id}/like", get(comment_like_info).post(toggle_comment_like))
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentForm {
    pub content: String,
    #[serde(default)]
    pub parent_comment_id: Option<Uuid>,
    #[serde(default)]
    pub return_to: Option<String>,
}

async fn create_comment_form(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(slug): Path<String>,
    Form(form): Form<CreateCommentForm>,
) -> Response {
    let post_path = format!("/blog/{}", urlencoding::encode(&slug));
    let back = redirect_back(form.return_to.as_deref(), &post_path);
    let auto_hide = state.config.toast.auto_hide_ms;

    let mut session = current.0.lock().await;
    let Some(token) = state.auth.access_token(&mut session).await else {
        session.toast("Please sign in to comment", ToastKind::Warning, auto_hide);
        return back.into_response();
    };

    let post = match state.posts.by_slug(&slug).await {
        Ok(post) => post,
        Err(e) => {
            tracing::error!(slug = %slug, "Failed to resolve post for comment: {}", e);
            session.toast("Failed to post comment", ToastKind::Danger, auto_hide);
            return back.into_response();
        }
    };

    match state
        .comments
        .create(&token, post.id, &form.content, form.parent_comment_id)
        .await
    {
        Ok(comment) => {
            if let Some(thread) = session.cached_thread_mut(post.id) {
                match form.parent_comment_id {
                    Some(parent_id) => thread.reply_added(parent_id),
                    None => thread.prepend(comment),
                }
            }
            match form.parent_comment_id {
                Some(parent_id) => {
                    session.toast("Reply posted", ToastKind::Success, auto_hide);
                    redirect_back(
                        Some(&format!("{}?replies={}#comment-{}", post_path, parent_id, parent_id)),
                        &post_path,
                    )
                    .into_response()
                }
                None => {
                    session.toast("Comment posted", ToastKind::Success, auto_hide);
                    back.into_response()
                }
            }
        }
        Err(CommentServiceError::EmptyContent) => {
            session.toast("Comment cannot be empty", ToastKind::Warning, auto_hide);
            back.into_response()
        }
        Err(e) => {
            tracing::error!(post_id = %post.id, "Failed to create comment: {}", e);
            session.toast("Failed to post comment", ToastKind::Danger, auto_hide);
            back.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EditCommentForm {
    pub content: String,
    #[serde(default)]
    pub return_to: Option<String>,
}

async fn edit_comment_form(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
    Form(form): Form<EditCommentForm>,
) -> Response {
    let back = redirect_back(form.return_to.as_deref(), "/blog");
    let auto_hide = state.config.toast.auto_hide_ms;

    let mut session = current.0.lock().await;
    let Some(token) = state.auth.access_token(&mut session).await else {
        session.toast("Please sign in to edit comments", ToastKind::Warning, auto_hide);
        return back.into_response();
    };

    match state.comments.update(&token, id, &form.content).await {
        Ok(updated) => {
            for thread in session.threads.iter_mut() {
                thread.replace(updated.clone());
            }
            session.toast("Comment updated", ToastKind::Success, auto_hide);
        }
        Err(CommentServiceError::EmptyContent) => {
            session.toast("Comment cannot be empty", ToastKind::Warning, auto_hide);
        }
        Err(e) => {
            tracing::error!(comment_id = %id, "Failed to update comment: {}", e);
            session.toast("Failed to update comment", ToastKind::Danger, auto_hide);
        }
    }
    back.into_response()
}

#[derive(Debug, Deserialize)]
pub struct DeleteCommentForm {
    #[serde(default)]
    pub return_to: Option<String>,
    /// Set when the deleted comment is a reply
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

async fn delete_comment_form(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
    Form(form): Form<DeleteCommentForm>,
) -> Response {
    let back = redirect_back(form.return_to.as_deref(), "/blog");
    let auto_hide = state.config.toast.auto_hide_ms;

    let mut session = current.0.lock().await;
    let Some(token) = state.auth.access_token(&mut session).await else {
        session.toast("Please sign in to delete comments", ToastKind::Warning, auto_hide);
        return back.into_response();
    };

    match state.comments.delete(&token, id).await {
        Ok(()) => {
            session.comment_deleted(id, form.parent_id);
            session.toast("Comment deleted", ToastKind::Success, auto_hide);
        }
        Err(e) => {
            tracing::error!(comment_id = %id, "Failed to delete comment: {}", e);
            session.toast("Failed to delete comment", ToastKind::Danger, auto_hide);
        }
    }
    back.into_response()
}

#[derive(Debug, Deserialize)]
pub struct ReturnForm {
    #[serde(default)]
    pub return_to: Option<String>,
}

async fn toggle_comment_like_form(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
    Form(form): Form<ReturnForm>,
) -> Response {
    let back = redirect_back(form.return_to.as_deref(), "/blog");
    let auto_hide = state.config.toast.auto_hide_ms;

    let mut session = current.0.lock().await;
    let Some(token) = state.auth.access_token(&mut session).await else {
        session.toast("Please sign in to like comments", ToastKind::Warning, auto_hide);
        return back.into_response();
    };

    if let Err(e) = state.comments.toggle_like(&token, id).await {
        tracing::warn!(comment_id = %id, "Failed to toggle comment like: {}", e);
        session.toast("Failed to update like", ToastKind::Danger, auto_hide);
    }
    back.into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: u32,
}

/// Access token of the visitor, or 401
async fn require_token(state: &AppState, current: &CurrentSession) -> Result<String, ApiError> {
    let mut session = current.0.lock().await;
    state
        .auth
        .access_token(&mut session)
        .await
        .ok_or_else(|| ApiError::unauthorized("Sign in required"))
}

async fn list_comments(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(post_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<CommentThread>, ApiError> {
    let mut thread = state.comments.new_thread(post_id);
    state.comments.refresh_thread(&mut thread, query.page).await?;

    current.0.lock().await.cache_thread(thread.clone());
    Ok(Json(thread))
}

async fn create_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(post_id): Path<Uuid>,
    Json(request): Json<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = require_token(&state, &current).await?;
    let comment = state
        .comments
        .create(&token, post_id, &request.content, request.parent_comment_id)
        .await?;

    let mut session = current.0.lock().await;
    if let Some(thread) = session.cached_thread_mut(post_id) {
        match request.parent_comment_id {
            Some(parent_id) => thread.reply_added(parent_id),
            None => thread.prepend(comment.clone()),
        }
    }
    Ok((StatusCode::CREATED, Json(comment)))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: i64,
}

async fn comment_count(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<CountResponse>, ApiError> {
    let count = state.backend.comment_count(post_id).await?;
    Ok(Json(CountResponse { count }))
}

async fn list_replies(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ReplyThread>, ApiError> {
    Ok(Json(state.comments.load_replies(id, query.page).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

async fn update_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCommentRequest>,
) -> Result<Json<CommentTreeItem>, ApiError> {
    let token = require_token(&state, &current).await?;
    let updated = state.comments.update(&token, id, &request.content).await?;

    let mut session = current.0.lock().await;
    for thread in session.threads.iter_mut() {
        thread.replace(updated.clone());
    }
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct DeleteCommentQuery {
    /// Parent of the deleted comment when it is a reply
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

async fn delete_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteCommentQuery>,
) -> Result<StatusCode, ApiError> {
    let token = require_token(&state, &current).await?;
    state.comments.delete(&token, id).await?;

    current.0.lock().await.comment_deleted(id, query.parent_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn comment_like_info(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommentLikeResponse>, ApiError> {
    let token = {
        let mut session = current.0.lock().await;
        state.auth.access_token(&mut session).await
    };
    let mut info = state.backend.comment_like_info(token.as_deref(), id).await?;
    if token.is_none() {
        info.is_liked = false;
    }
    Ok(Json(info))
}

async fn toggle_comment_like(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommentLikeResponse>, ApiError> {
    let token = require_token(&state, &current).await?;
    Ok(Json(state.comments.toggle_like(&token, id).await?))
}

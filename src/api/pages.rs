//! Rendered pages
//!
//! - `/` and `/blog`: recent posts
//! - `/blog/tag/{tag}`: posts with a tag
//! - `/blog/{slug}`: post detail with likes and comments
//!
//! Plus the JSON reads of posts under `/api/blog/posts`.

use axum::{
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;
use uuid::Uuid;

use crate::api::assistant::{assistant_view, PanelQuery};
use crate::api::middleware::{theme_from, ApiError, AppState, CurrentSession};
use crate::backend::BackendError;
use crate::models::{BlogPost, CommentLikeResponse, CommentTreeItem};
use crate::services::comment::{is_own_comment, share_url, ReplyThread};
use crate::services::like;
use crate::services::session::Session;
use crate::services::theme::Theme;
use crate::services::toast::ToastKind;
use crate::templates::{simple_error_page, StandardTemplateVars};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(blog_list))
        .route("/blog", get(blog_list))
        .route("/blog/tag/{tag}", get(tag_list))
        .route("/blog/{slug}", get(post_detail))
}

/// JSON routes, nested under `/api`
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/blog/posts", get(list_posts_json))
        .route("/blog/posts/{slug}", get(get_post_json))
}

/// Unknown pages go back to the start page
pub async fn fallback() -> Redirect {
    Redirect::to("/")
}

/// Standard variables for a page, consuming the session's pending toasts
pub(crate) fn page_vars(session: &mut Session, path: &str, theme: Theme) -> StandardTemplateVars {
    StandardTemplateVars::new(path, theme)
        .with_user(session.user.value().cloned(), session.is_authenticated())
        .with_toasts(session.toasts.drain())
}

pub(crate) fn render_page(
    state: &AppState,
    template: &str,
    context: &TeraContext,
    vars: &StandardTemplateVars,
) -> Html<String> {
    let html = match state.templates.read() {
        Ok(engine) => engine.render_page(template, context, vars),
        Err(e) => {
            tracing::error!("Template engine lock poisoned: {}", e);
            simple_error_page("Something went wrong", "This page could not be displayed.")
        }
    };
    Html(html)
}

/// Error page with the usual layout
async fn error_page(
    state: &AppState,
    current: &CurrentSession,
    headers: &HeaderMap,
    path: &str,
    status: StatusCode,
    title: &str,
    message: &str,
) -> Response {
    let vars = {
        let mut session = current.0.lock().await;
        page_vars(&mut session, path, theme_from(headers))
    };

    let mut context = TeraContext::new();
    context.insert("status", &status.as_u16());
    context.insert("error_title", title);
    context.insert("error_message", message);
    (status, render_page(state, "error.html", &context, &vars)).into_response()
}

/// Post summary shown in lists
#[derive(Debug, Clone, Serialize)]
pub struct PostCard {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub published: Option<String>,
    pub tags: Vec<String>,
    pub post_type: String,
    pub href: String,
    pub external: bool,
}

impl From<&BlogPost> for PostCard {
    fn from(post: &BlogPost) -> Self {
        let external = post.external_target();
        Self {
            slug: post.slug.clone(),
            title: post.title.clone(),
            description: post.description.clone(),
            thumbnail_url: post.thumbnail_url.clone(),
            published: post.published_at.map(|d| d.format("%B %-d, %Y").to_string()),
            tags: post.tags.clone(),
            post_type: post.post_type.to_string(),
            href: external
                .map(str::to_string)
                .unwrap_or_else(|| format!("/blog/{}", urlencoding::encode(&post.slug))),
            external: external.is_some(),
        }
    }
}

async fn blog_list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    headers: HeaderMap,
    uri: Uri,
    Query(panel): Query<PanelQuery>,
) -> Html<String> {
    let result = state.posts.recent(state.config.blog.recent_limit).await;
    render_list(&state, &current, &headers, uri.path(), &panel, None, result).await
}

async fn tag_list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    headers: HeaderMap,
    Path(tag): Path<String>,
    Query(panel): Query<PanelQuery>,
) -> Html<String> {
    let path = format!("/blog/tag/{}", urlencoding::encode(&tag));
    let result = state.posts.by_tag(&tag).await;
    render_list(&state, &current, &headers, &path, &panel, Some(&tag), result).await
}

async fn render_list(
    state: &AppState,
    current: &CurrentSession,
    headers: &HeaderMap,
    path: &str,
    panel: &PanelQuery,
    tag: Option<&str>,
    result: Result<Vec<BlogPost>, BackendError>,
) -> Html<String> {
    let mut context = TeraContext::new();
    let posts: Vec<PostCard> = match result {
        Ok(posts) => posts.iter().map(PostCard::from).collect(),
        Err(e) => {
            tracing::error!("Failed to load posts: {}", e);
            context.insert("error", "Failed to load posts. Please try again later.");
            Vec::new()
        }
    };
    context.insert("posts", &posts);
    if let Some(tag) = tag {
        context.insert("tag", tag);
    }

    let mut session = current.0.lock().await;
    let token = state.auth.access_token(&mut session).await;
    context.insert("assistant", &assistant_view(state, headers, panel, token.as_deref()).await);
    let vars = page_vars(&mut session, path, theme_from(headers));
    drop(session);

    render_page(state, "blog_list.html", &context, &vars)
}

#[derive(Debug, Default, Deserialize)]
pub struct PostQuery {
    /// Last comment page to show ("Load more")
    #[serde(default)]
    pub comments_page: u32,
    /// Comment whose replies are expanded
    #[serde(default)]
    pub replies: Option<Uuid>,
    #[serde(default)]
    pub replies_page: u32,
    /// Comment being edited
    #[serde(default)]
    pub edit: Option<Uuid>,
}

#[derive(Debug, Serialize)]
struct CommentView {
    id: Uuid,
    content: String,
    initials: String,
    created: String,
    edited: bool,
    like_count: i64,
    liked: bool,
    reply_count: i64,
    own: bool,
    share_url: String,
    editing: bool,
    expanded: bool,
    replies: Vec<CommentView>,
    replies_has_more: bool,
    replies_next_page: u32,
}

struct ViewContext<'a> {
    public_url: &'a str,
    slug: &'a str,
    viewer: Option<Uuid>,
    editing: Option<Uuid>,
}

impl ViewContext<'_> {
    fn view(&self, comment: &CommentTreeItem, like: CommentLikeResponse) -> CommentView {
        CommentView {
            id: comment.id,
            content: comment.content.clone(),
            initials: comment.initials(),
            created: comment.created_at.format("%B %-d, %Y %H:%M").to_string(),
            edited: comment.is_edited(),
            like_count: like.count,
            liked: like.is_liked,
            reply_count: comment.reply_count,
            own: is_own_comment(comment, self.viewer),
            share_url: share_url(self.public_url, self.slug, comment.id),
            editing: self.editing == Some(comment.id),
            expanded: false,
            replies: Vec::new(),
            replies_has_more: false,
            replies_next_page: 0,
        }
    }
}

async fn post_detail(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Query(query): Query<PostQuery>,
    Query(panel): Query<PanelQuery>,
) -> Response {
    let path = format!("/blog/{}", urlencoding::encode(&slug));

    let post = match state.posts.by_slug(&slug).await {
        Ok(post) => post,
        Err(BackendError::NotFound) => {
            return error_page(
                &state,
                &current,
                &headers,
                &path,
                StatusCode::NOT_FOUND,
                "Post not found",
                "The post you are looking for does not exist.",
            )
            .await;
        }
        Err(e) => {
            tracing::error!(slug = %slug, "Failed to load post: {}", e);
            return error_page(
                &state,
                &current,
                &headers,
                &path,
                StatusCode::BAD_GATEWAY,
                "Post unavailable",
                "The post could not be loaded. Please try again later.",
            )
            .await;
        }
    };

    if let Some(target) = post.external_target() {
        return Redirect::temporary(target).into_response();
    }

    let theme = theme_from(&headers);
    let content_html = state.posts.render(&post, theme).await;
    let auto_hide = state.config.toast.auto_hide_ms;

    let mut session = current.0.lock().await;
    let token = state.auth.access_token(&mut session).await;
    let token = token.as_deref();

    let like_state = match like::load(state.backend.as_ref(), token, post.id).await {
        Ok(fresh) => {
            session.post_likes.insert(post.id, fresh);
            fresh
        }
        Err(e) => {
            tracing::warn!(post_id = %post.id, "Failed to load like info: {}", e);
            session.post_likes.get(&post.id).copied().unwrap_or_default()
        }
    };

    let mut thread = session
        .cached_thread(post.id)
        .cloned()
        .unwrap_or_else(|| state.comments.new_thread(post.id));
    match state.comments.refresh_thread(&mut thread, query.comments_page).await {
        Ok(()) => session.cache_thread(thread.clone()),
        Err(e) => {
            tracing::warn!(post_id = %post.id, "Failed to load comments: {}", e);
            session.toast("Failed to load comments", ToastKind::Danger, auto_hide);
        }
    }

    let expanded: Option<ReplyThread> = match query.replies {
        Some(parent_id) => match state.comments.load_replies(parent_id, query.replies_page).await {
            Ok(replies) => Some(replies),
            Err(e) => {
                tracing::warn!(comment_id = %parent_id, "Failed to load replies: {}", e);
                session.toast("Failed to load replies", ToastKind::Danger, auto_hide);
                None
            }
        },
        None => None,
    };

    let comment_likes = join_all(thread.comments.iter().map(|c| state.comments.like_info(token, c))).await;
    let reply_likes = match &expanded {
        Some(replies) => join_all(replies.replies.iter().map(|r| state.comments.like_info(token, r))).await,
        None => Vec::new(),
    };

    let views = ViewContext {
        public_url: &state.config.server.public_url,
        slug: &post.slug,
        viewer: session.user_id(),
        editing: query.edit,
    };
    let comments: Vec<CommentView> = thread
        .comments
        .iter()
        .zip(comment_likes)
        .map(|(comment, like)| {
            let mut view = views.view(comment, like);
            if let Some(replies) = expanded.as_ref().filter(|r| r.parent_id == comment.id) {
                view.expanded = true;
                view.replies = replies
                    .replies
                    .iter()
                    .zip(reply_likes.iter().copied())
                    .map(|(reply, like)| views.view(reply, like))
                    .collect();
                view.replies_has_more = replies.has_more;
                view.replies_next_page = replies.page + 1;
            }
            view
        })
        .collect();

    let mut context = TeraContext::new();
    context.insert("post", &PostCard::from(&post));
    context.insert("post_id", &post.id);
    context.insert("author_name", &post.author_name);
    context.insert("content_html", &content_html);
    context.insert("like", &like_state);
    context.insert("comments", &comments);
    context.insert("comments_total", &thread.total);
    context.insert("comments_has_more", &thread.has_more);
    context.insert("comments_page", &thread.page);
    context.insert("comments_next_page", &(thread.page + 1));
    context.insert("login_url", &format!("/auth/login?return_to={}", urlencoding::encode(&path)));
    context.insert("assistant", &assistant_view(&state, &headers, &panel, token).await);

    let vars = page_vars(&mut session, &path, theme);
    drop(session);

    render_page(&state, "post.html", &context, &vars).into_response()
}

async fn list_posts_json(State(state): State<AppState>) -> Result<Json<Vec<BlogPost>>, ApiError> {
    Ok(Json(state.posts.recent(state.config.blog.recent_limit).await?))
}

#[derive(Debug, Serialize)]
struct PostDetailResponse {
    post: BlogPost,
    html: String,
}

async fn get_post_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<Json<PostDetailResponse>, ApiError> {
    let post = state.posts.by_slug(&slug).await?;
    let html = state.posts.render(&post, theme_from(&headers)).await;
    Ok(Json(PostDetailResponse { post, html }))
}

//! Visitor sessions
//!
//! A session holds what the browser used to keep for itself: tokens, the
//! resolved user, pending toasts and the last fetched like and comment state.
//! Sessions live in the cache, keyed by the opaque id in the `session` cookie.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cache::{Cache, CacheLayer};
use crate::models::{ConnectedUser, FetchState};
use crate::services::auth::{PendingLogin, TokenSet};
use crate::services::comment::CommentThread;
use crate::services::like::LikeState;
use crate::services::toast::{ToastKind, ToastQueue};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Comment threads kept per session, most recently viewed first
const MAX_CACHED_THREADS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub tokens: Option<TokenSet>,
    #[serde(default)]
    pub user: FetchState<ConnectedUser>,
    #[serde(default)]
    pub pending_login: Option<PendingLogin>,
    #[serde(default)]
    pub toasts: ToastQueue,
    #[serde(default)]
    pub post_likes: HashMap<Uuid, LikeState>,
    #[serde(default)]
    pub threads: Vec<CommentThread>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: generate_session_id(),
            ..Self::default()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    /// Id of the signed-in user, if resolved
    pub fn user_id(&self) -> Option<Uuid> {
        self.user.value().and_then(|user| user.id)
    }

    /// Nothing worth persisting yet
    pub fn is_empty(&self) -> bool {
        self.tokens.is_none()
            && self.pending_login.is_none()
            && self.toasts.is_empty()
            && self.post_likes.is_empty()
            && self.threads.is_empty()
            && matches!(self.user, FetchState::Init)
    }

    /// Give the session a fresh id, as after signing in
    pub fn rotate_id(&mut self) {
        self.id = generate_session_id();
    }

    /// Forget everything tied to the signed-in user
    pub fn sign_out(&mut self) {
        self.tokens = None;
        self.user = FetchState::success(ConnectedUser::not_connected());
        self.post_likes.clear();
    }

    pub fn toast(&mut self, body: impl Into<String>, kind: ToastKind, auto_hide_ms: u64) -> u64 {
        self.toasts.show(body, kind, auto_hide_ms)
    }

    pub fn cached_thread(&self, post_id: Uuid) -> Option<&CommentThread> {
        self.threads.iter().find(|t| t.post_id == post_id)
    }

    pub fn cached_thread_mut(&mut self, post_id: Uuid) -> Option<&mut CommentThread> {
        self.threads.iter_mut().find(|t| t.post_id == post_id)
    }

    /// Reflect a deleted comment in the one cached thread that holds it.
    /// Replies are counted against the thread holding their parent.
    pub fn comment_deleted(&mut self, comment_id: Uuid, parent_id: Option<Uuid>) -> bool {
        match parent_id {
            Some(parent_id) => self
                .threads
                .iter_mut()
                .find(|t| t.find(parent_id).is_some())
                .is_some_and(|t| t.reply_removed(parent_id)),
            None => self
                .threads
                .iter_mut()
                .find(|t| t.find(comment_id).is_some())
                .is_some_and(|t| t.remove(comment_id)),
        }
    }

    /// Remember the last successful fetch of a thread
    pub fn cache_thread(&mut self, thread: CommentThread) {
        self.threads.retain(|t| t.post_id != thread.post_id);
        self.threads.insert(0, thread);
        self.threads.truncate(MAX_CACHED_THREADS);
    }
}

/// 64 hex characters from two v4 uuids
fn generate_session_id() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn is_valid_session_id(id: &str) -> bool {
    id.len() == 64 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

fn cache_key(id: &str) -> String {
    format!("session:{}", id)
}

/// Sessions stored in the shared cache
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<Cache>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(cache: Arc<Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Load the session named by the cookie, or start a new one.
    ///
    /// Returns the session and whether it was newly created.
    pub async fn load_or_create(&self, cookie_value: Option<&str>) -> (Session, bool) {
        if let Some(id) = cookie_value.filter(|id| is_valid_session_id(id)) {
            match self.cache.get::<Session>(&cache_key(id)).await {
                Ok(Some(session)) => return (session, false),
                Ok(None) => tracing::debug!("Session expired or unknown, starting a new one"),
                Err(e) => tracing::warn!("Failed to load session: {}", e),
            }
        }
        (Session::new(), true)
    }

    pub async fn save(&self, session: &Session) -> anyhow::Result<()> {
        self.cache.set(&cache_key(&session.id), session, self.ttl).await
    }

    pub async fn destroy(&self, id: &str) -> anyhow::Result<()> {
        self.cache.delete(&cache_key(id)).await
    }
}

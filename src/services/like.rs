//! Post likes

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{BackendApi, BackendResult};
use crate::models::LikeResponse;

/// Like button state of one post for one visitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeState {
    pub liked: bool,
    pub count: i64,
    /// Set while a toggle is in flight; further toggles are ignored
    pub toggling: bool,
}

impl LikeState {
    fn from_response(response: LikeResponse, authenticated: bool) -> Self {
        Self {
            liked: authenticated && response.is_liked,
            count: response.like_count,
            toggling: false,
        }
    }

    /// Flip locally after the backend accepted a toggle
    fn flip(&mut self) {
        self.liked = !self.liked;
        self.count = if self.liked { self.count + 1 } else { (self.count - 1).max(0) };
    }
}

/// Outcome of a toggle request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Toggled,
    /// Visitor is not signed in
    NotAuthenticated,
    /// Another toggle is still running
    Busy,
    /// Backend rejected the toggle; the state was reloaded
    Failed,
}

/// Fetch the like state of a post. Only signed-in visitors can have liked it.
pub async fn load(backend: &dyn BackendApi, token: Option<&str>, post_id: Uuid) -> BackendResult<LikeState> {
    let response = backend.post_like_info(token, post_id).await?;
    Ok(LikeState::from_response(response, token.is_some()))
}

/// Toggle the visitor's like on `state`.
///
/// `toggling` is cleared on every path out of this function.
pub async fn toggle(
    backend: &dyn BackendApi,
    token: Option<&str>,
    post_id: Uuid,
    state: &mut LikeState,
) -> ToggleOutcome {
    let Some(token) = token else {
        return ToggleOutcome::NotAuthenticated;
    };
    if state.toggling {
        return ToggleOutcome::Busy;
    }

    state.toggling = true;
    let outcome = match backend.toggle_post_like(token, post_id).await {
        Ok(_) => {
            state.flip();
            ToggleOutcome::Toggled
        }
        Err(e) => {
            tracing::warn!(%post_id, "Failed to toggle post like: {}", e);
            if let Ok(fresh) = load(backend, Some(token), post_id).await {
                *state = fresh;
            }
            ToggleOutcome::Failed
        }
    };
    state.toggling = false;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::stub::{StubBackend, VALID_TOKEN};

    #[tokio::test]
    async fn test_load_anonymous_never_liked() {
        let backend = StubBackend::new();
        let post_id = Uuid::new_v4();
        backend.set_post_like(post_id, LikeResponse { like_count: 4, is_liked: true });

        let state = load(&backend, None, post_id).await.unwrap();
        assert_eq!(state, LikeState { liked: false, count: 4, toggling: false });

        let state = load(&backend, Some(VALID_TOKEN), post_id).await.unwrap();
        assert!(state.liked);
    }

    #[tokio::test]
    async fn test_toggle_requires_token() {
        let backend = StubBackend::new();
        let mut state = LikeState::default();

        let outcome = toggle(&backend, None, Uuid::new_v4(), &mut state).await;
        assert_eq!(outcome, ToggleOutcome::NotAuthenticated);
        assert_eq!(backend.calls("toggle_post_like"), 0);
    }

    #[tokio::test]
    async fn test_toggle_ignored_while_in_flight() {
        let backend = StubBackend::new();
        let mut state = LikeState { liked: false, count: 1, toggling: true };

        let outcome = toggle(&backend, Some(VALID_TOKEN), Uuid::new_v4(), &mut state).await;
        assert_eq!(outcome, ToggleOutcome::Busy);
        assert_eq!(backend.calls("toggle_post_like"), 0);
    }

    #[tokio::test]
    async fn test_toggle_flips_and_clears_flag() {
        let backend = StubBackend::new();
        let post_id = Uuid::new_v4();
        let mut state = LikeState { liked: false, count: 2, toggling: false };

        assert_eq!(toggle(&backend, Some(VALID_TOKEN), post_id, &mut state).await, ToggleOutcome::Toggled);
        assert_eq!(state, LikeState { liked: true, count: 3, toggling: false });

        assert_eq!(toggle(&backend, Some(VALID_TOKEN), post_id, &mut state).await, ToggleOutcome::Toggled);
        assert_eq!(state, LikeState { liked: false, count: 2, toggling: false });
    }

    #[tokio::test]
    async fn test_toggle_failure_reloads_state() {
        let backend = StubBackend::new();
        let post_id = Uuid::new_v4();
        backend.set_post_like(post_id, LikeResponse { like_count: 7, is_liked: true });
        backend.fail("toggle_post_like");
        let mut state = LikeState { liked: false, count: 0, toggling: false };

        let outcome = toggle(&backend, Some(VALID_TOKEN), post_id, &mut state).await;
        assert_eq!(outcome, ToggleOutcome::Failed);
        assert_eq!(state, LikeState { liked: true, count: 7, toggling: false });
    }

    #[tokio::test]
    async fn test_toggle_failure_with_failed_reload_keeps_state() {
        let backend = StubBackend::new();
        backend.fail("toggle_post_like");
        backend.fail("post_like_info");
        let mut state = LikeState { liked: true, count: 5, toggling: false };

        let outcome = toggle(&backend, Some(VALID_TOKEN), Uuid::new_v4(), &mut state).await;
        assert_eq!(outcome, ToggleOutcome::Failed);
        assert_eq!(state, LikeState { liked: true, count: 5, toggling: false });
    }
}

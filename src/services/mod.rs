//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the backend API. They are
//! responsible for:
//! - Caching backend reads
//! - Keeping per-visitor state (session, comment threads, likes, chat)
//! - Validation before anything is sent upstream

pub mod assistant;
pub mod auth;
pub mod comment;
pub mod like;
pub mod markdown;
pub mod post;
pub mod session;
pub mod theme;
pub mod toast;

pub use assistant::{AssistantError, AssistantService, Conversation, PanelLayout};
pub use auth::{AuthError, AuthService, HttpTokenClient, OidcEndpoints, TokenClient, TokenSet};
pub use comment::{CommentService, CommentServiceError, CommentThread, ReplyThread};
pub use like::{LikeState, ToggleOutcome};
pub use markdown::MarkdownRenderer;
pub use post::PostService;
pub use session::{Session, SessionStore};
pub use theme::Theme;
pub use toast::{Toast, ToastKind, ToastQueue};

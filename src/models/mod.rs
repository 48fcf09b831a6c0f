//! Data models
//!
//! Records mirrored from backend responses, plus the small request bodies
//! this server sends. Field names follow the backend's camelCase JSON.

mod chat;
mod comment;
mod page;
mod post;
mod state;
mod user;

pub use chat::{ChatMessage, MessageType};
pub use comment::{CommentLikeResponse, CommentRequest, CommentTreeItem, LikeResponse};
pub use page::{Page, PageRequest};
pub use post::{BlogPost, PostType};
pub use state::FetchState;
pub use user::{ConnectedUser, UserProfile};

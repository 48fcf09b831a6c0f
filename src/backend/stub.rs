//! In-memory `BackendApi` for tests

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use super::{BackendApi, BackendError, BackendResult};
use crate::models::{
    BlogPost, ChatMessage, CommentLikeResponse, CommentRequest, CommentTreeItem, LikeResponse,
    Page, PageRequest, PostType, UserProfile,
};

/// Token the stub accepts for user-scoped calls
pub const VALID_TOKEN: &str = "valid-token";

#[derive(Default)]
struct StubState {
    posts: Vec<BlogPost>,
    /// Top-level comments per post, newest first
    comments: HashMap<Uuid, Vec<CommentTreeItem>>,
    /// Replies per parent comment, oldest first
    replies: HashMap<Uuid, Vec<CommentTreeItem>>,
    post_likes: HashMap<Uuid, LikeResponse>,
    comment_likes: HashMap<Uuid, CommentLikeResponse>,
    user: Option<UserProfile>,
    histories: HashMap<String, Vec<ChatMessage>>,
    failing: HashSet<&'static str>,
    calls: HashMap<&'static str, usize>,
}

/// Scriptable backend double. Operations named in `fail` return a 500.
#[derive(Default)]
pub struct StubBackend {
    state: Mutex<StubState>,
}

pub fn sample_post(slug: &str, day: u32) -> BlogPost {
    BlogPost {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        title: format!("Post {}", slug),
        description: format!("About {}", slug),
        content: format!("# {}\n\nBody of **{}**.\n\n```rust\nfn main() {{}}\n```\n", slug, slug),
        author_id: None,
        author_name: Some("Michael".to_string()),
        published_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).single(),
        created_at: None,
        updated_at: None,
        thumbnail_url: None,
        post_type: PostType::Blog,
        external_url: None,
        tags: vec!["rust".to_string()],
    }
}

pub fn sample_comment(user_id: Uuid, content: &str, minutes: i64) -> CommentTreeItem {
    CommentTreeItem {
        id: Uuid::new_v4(),
        user_id,
        content: content.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::minutes(minutes),
        updated_at: None,
        reply_count: 0,
        like_count: 0,
    }
}

pub fn sample_user() -> UserProfile {
    UserProfile {
        id: Uuid::parse_str("ab000000-0000-0000-0000-000000000001").unwrap(),
        username: Some("visitor".to_string()),
        email: Some("visitor@example.com".to_string()),
        first_name: Some("Vis".to_string()),
        last_name: Some("Itor".to_string()),
        created_at: None,
    }
}

fn paginate(items: &[CommentTreeItem], page: &PageRequest) -> Page<CommentTreeItem> {
    let size = page.size.max(1) as usize;
    let start = page.page as usize * size;
    let content: Vec<_> = items.iter().skip(start).take(size).cloned().collect();
    let total = items.len();
    Page {
        last: start + content.len() >= total,
        content,
        total_elements: total as i64,
        total_pages: total.div_ceil(size) as i64,
        number: page.page,
        size: page.size,
    }
}

fn authorize(token: &str) -> BackendResult<()> {
    if token == VALID_TOKEN {
        Ok(())
    } else {
        Err(BackendError::Unauthorized)
    }
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(self, posts: Vec<BlogPost>) -> Self {
        self.state.lock().unwrap().posts = posts;
        self
    }

    pub fn with_user(self, user: UserProfile) -> Self {
        self.state.lock().unwrap().user = Some(user);
        self
    }

    pub fn add_comments(&self, post_id: Uuid, comments: Vec<CommentTreeItem>) {
        self.state.lock().unwrap().comments.entry(post_id).or_default().extend(comments);
    }

    pub fn add_replies(&self, parent_id: Uuid, replies: Vec<CommentTreeItem>) {
        let mut state = self.state.lock().unwrap();
        let count = replies.len() as i64;
        state.replies.entry(parent_id).or_default().extend(replies);
        for comments in state.comments.values_mut() {
            if let Some(parent) = comments.iter_mut().find(|c| c.id == parent_id) {
                parent.reply_count += count;
            }
        }
    }

    pub fn set_post_like(&self, post_id: Uuid, like: LikeResponse) {
        self.state.lock().unwrap().post_likes.insert(post_id, like);
    }

    pub fn set_history(&self, conversation_id: &str, messages: Vec<ChatMessage>) {
        self.state
            .lock()
            .unwrap()
            .histories
            .insert(conversation_id.to_string(), messages);
    }

    pub fn fail(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.state.lock().unwrap().failing.remove(operation);
    }

    pub fn calls(&self, operation: &'static str) -> usize {
        self.state.lock().unwrap().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn first_post(&self) -> BlogPost {
        self.state.lock().unwrap().posts[0].clone()
    }

    fn enter(&self, operation: &'static str) -> BackendResult<std::sync::MutexGuard<'_, StubState>> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(operation).or_default() += 1;
        if state.failing.contains(operation) {
            return Err(BackendError::Status {
                status: 500,
                message: format!("{} failed", operation),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl BackendApi for StubBackend {
    async fn list_posts(&self, page: &PageRequest) -> BackendResult<Page<BlogPost>> {
        let state = self.enter("list_posts")?;
        let size = page.size.max(1) as usize;
        let start = page.page as usize * size;
        let content: Vec<_> = state.posts.iter().skip(start).take(size).cloned().collect();
        Ok(Page {
            last: start + content.len() >= state.posts.len(),
            content,
            total_elements: state.posts.len() as i64,
            total_pages: state.posts.len().div_ceil(size) as i64,
            number: page.page,
            size: page.size,
        })
    }

    async fn get_post(&self, slug: &str) -> BackendResult<BlogPost> {
        let state = self.enter("get_post")?;
        state
            .posts
            .iter()
            .find(|p| p.slug == slug)
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn posts_by_tag(&self, tag: &str, _page: &PageRequest) -> BackendResult<Page<BlogPost>> {
        let state = self.enter("posts_by_tag")?;
        Ok(Page::single(
            state.posts.iter().filter(|p| p.tags.iter().any(|t| t == tag)).cloned().collect(),
        ))
    }

    async fn top_level_comments(&self, post_id: Uuid, page: &PageRequest) -> BackendResult<Page<CommentTreeItem>> {
        let state = self.enter("top_level_comments")?;
        let comments = state.comments.get(&post_id).cloned().unwrap_or_default();
        Ok(paginate(&comments, page))
    }

    async fn comment_count(&self, post_id: Uuid) -> BackendResult<i64> {
        let state = self.enter("comment_count")?;
        let top = state.comments.get(&post_id).map(Vec::len).unwrap_or(0);
        let replies: usize = state
            .comments
            .get(&post_id)
            .map(|comments| {
                comments
                    .iter()
                    .map(|c| state.replies.get(&c.id).map(Vec::len).unwrap_or(0))
                    .sum()
            })
            .unwrap_or(0);
        Ok((top + replies) as i64)
    }

    async fn replies(&self, comment_id: Uuid, page: &PageRequest) -> BackendResult<Page<CommentTreeItem>> {
        let state = self.enter("replies")?;
        let replies = state.replies.get(&comment_id).cloned().unwrap_or_default();
        Ok(paginate(&replies, page))
    }

    async fn create_comment(&self, token: &str, post_id: Uuid, request: &CommentRequest) -> BackendResult<CommentTreeItem> {
        let mut state = self.enter("create_comment")?;
        authorize(token)?;
        let user_id = state.user.as_ref().map(|u| u.id).unwrap_or_else(Uuid::new_v4);
        let comment = CommentTreeItem {
            id: Uuid::new_v4(),
            user_id,
            content: request.content.clone(),
            created_at: Utc::now(),
            updated_at: None,
            reply_count: 0,
            like_count: 0,
        };
        match request.parent_comment_id {
            Some(parent) => state.replies.entry(parent).or_default().push(comment.clone()),
            None => state.comments.entry(post_id).or_default().insert(0, comment.clone()),
        }
        Ok(comment)
    }

    async fn update_comment(&self, token: &str, comment_id: Uuid, content: &str) -> BackendResult<CommentTreeItem> {
        let mut guard = self.enter("update_comment")?;
        authorize(token)?;
        let state = &mut *guard;
        let comment = state
            .comments
            .values_mut()
            .chain(state.replies.values_mut())
            .flat_map(|list| list.iter_mut())
            .find(|c| c.id == comment_id)
            .ok_or(BackendError::NotFound)?;
        comment.content = content.to_string();
        comment.updated_at = Some(Utc::now());
        Ok(comment.clone())
    }

    async fn delete_comment(&self, token: &str, comment_id: Uuid) -> BackendResult<()> {
        let mut state = self.enter("delete_comment")?;
        authorize(token)?;
        for list in state.comments.values_mut() {
            list.retain(|c| c.id != comment_id);
        }
        for list in state.replies.values_mut() {
            list.retain(|c| c.id != comment_id);
        }
        Ok(())
    }

    async fn comment_like_info(&self, _token: Option<&str>, comment_id: Uuid) -> BackendResult<CommentLikeResponse> {
        let state = self.enter("comment_like_info")?;
        Ok(state.comment_likes.get(&comment_id).copied().unwrap_or_default())
    }

    async fn toggle_comment_like(&self, token: &str, comment_id: Uuid) -> BackendResult<CommentLikeResponse> {
        let mut state = self.enter("toggle_comment_like")?;
        authorize(token)?;
        let like = state.comment_likes.entry(comment_id).or_default();
        like.is_liked = !like.is_liked;
        like.count += if like.is_liked { 1 } else { -1 };
        Ok(*like)
    }

    async fn post_like_info(&self, token: Option<&str>, post_id: Uuid) -> BackendResult<LikeResponse> {
        let state = self.enter("post_like_info")?;
        let mut like = state.post_likes.get(&post_id).copied().unwrap_or_default();
        if token != Some(VALID_TOKEN) {
            like.is_liked = false;
        }
        Ok(like)
    }

    async fn toggle_post_like(&self, token: &str, post_id: Uuid) -> BackendResult<LikeResponse> {
        let mut state = self.enter("toggle_post_like")?;
        authorize(token)?;
        let like = state.post_likes.entry(post_id).or_default();
        like.is_liked = !like.is_liked;
        like.like_count += if like.is_liked { 1 } else { -1 };
        Ok(*like)
    }

    async fn current_user(&self, token: &str) -> BackendResult<UserProfile> {
        let state = self.enter("current_user")?;
        authorize(token)?;
        state.user.clone().ok_or(BackendError::NotFound)
    }

    async fn chat(&self, _token: Option<&str>, conversation_id: &str, message: &str) -> BackendResult<String> {
        let mut state = self.enter("chat")?;
        let reply = format!("echo: {}", message);
        let history = state.histories.entry(conversation_id.to_string()).or_default();
        history.push(ChatMessage::user(message));
        history.push(ChatMessage::assistant(reply.clone()));
        Ok(reply)
    }

    async fn chat_history(&self, _token: Option<&str>, conversation_id: &str) -> BackendResult<Vec<ChatMessage>> {
        let state = self.enter("chat_history")?;
        Ok(state.histories.get(conversation_id).cloned().unwrap_or_default())
    }
}

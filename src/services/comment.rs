//! Comment threads
//!
//! `CommentThread` and `ReplyThread` hold what a visitor currently sees of a
//! post's discussion: the pages fetched so far, the running total and whether
//! more can be loaded. A failed fetch never clobbers what is already there.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::{BackendApi, BackendError, BackendResult};
use crate::models::{CommentLikeResponse, CommentRequest, CommentTreeItem, PageRequest};

/// Newest top-level comments first
const TOP_LEVEL_SORT: &str = "createdAt,desc";

/// Replies read top to bottom
const REPLIES_SORT: &str = "createdAt,asc";

/// Comment service errors
#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Comment must not be empty")]
    EmptyContent,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Top-level comments of one post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentThread {
    pub post_id: Uuid,
    pub comments: Vec<CommentTreeItem>,
    pub total: i64,
    /// Last page fetched
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

impl CommentThread {
    pub fn new(post_id: Uuid, page_size: u32) -> Self {
        Self {
            post_id,
            comments: Vec::new(),
            total: 0,
            page: 0,
            page_size,
            has_more: false,
        }
    }

    fn request(&self, page: u32) -> PageRequest {
        PageRequest::new(page, self.page_size).sorted(TOP_LEVEL_SORT)
    }

    /// Fetch the first page and the total count.
    ///
    /// A failed count keeps the previous total.
    pub async fn load(&mut self, backend: &dyn BackendApi) -> BackendResult<()> {
        let page = backend.top_level_comments(self.post_id, &self.request(0)).await?;
        self.comments = page.content;
        self.has_more = !page.last;
        self.page = 0;

        match backend.comment_count(self.post_id).await {
            Ok(count) => self.total = count,
            Err(e) => tracing::warn!(post_id = %self.post_id, "Failed to load comment count: {}", e),
        }
        Ok(())
    }

    /// Append the next page. On failure the page index is rolled back and the
    /// loaded comments stay as they were.
    pub async fn load_more(&mut self, backend: &dyn BackendApi) -> BackendResult<()> {
        if !self.has_more {
            return Ok(());
        }

        self.page += 1;
        match backend.top_level_comments(self.post_id, &self.request(self.page)).await {
            Ok(page) => {
                self.comments.extend(page.content);
                self.has_more = !page.last;
                Ok(())
            }
            Err(e) => {
                self.page -= 1;
                Err(e)
            }
        }
    }

    /// Load pages `0..=page`, as if "Load more" had been clicked `page` times
    pub async fn load_through(&mut self, backend: &dyn BackendApi, page: u32) -> BackendResult<()> {
        self.load(backend).await?;
        while self.page < page && self.has_more {
            self.load_more(backend).await?;
        }
        Ok(())
    }

    /// A freshly posted top-level comment goes first
    pub fn prepend(&mut self, comment: CommentTreeItem) {
        self.comments.insert(0, comment);
        self.total += 1;
    }

    /// Drop a loaded comment. Returns false when it is not in this thread.
    pub fn remove(&mut self, comment_id: Uuid) -> bool {
        let before = self.comments.len();
        self.comments.retain(|c| c.id != comment_id);
        if self.comments.len() == before {
            return false;
        }
        self.total = (self.total - 1).max(0);
        true
    }

    pub fn replace(&mut self, comment: CommentTreeItem) {
        if let Some(existing) = self.comments.iter_mut().find(|c| c.id == comment.id) {
            *existing = comment;
        }
    }

    /// Count a new reply against the thread and its parent
    pub fn reply_added(&mut self, parent_id: Uuid) {
        self.total += 1;
        if let Some(parent) = self.comments.iter_mut().find(|c| c.id == parent_id) {
            parent.reply_count += 1;
        }
    }

    /// Undo `reply_added` after a reply was deleted
    /// Count a deleted reply. Returns false when the parent is not in this thread.
    pub fn reply_removed(&mut self, parent_id: Uuid) -> bool {
        let Some(parent) = self.comments.iter_mut().find(|c| c.id == parent_id) else {
            return false;
        };
        parent.reply_count = (parent.reply_count - 1).max(0);
        self.total = (self.total - 1).max(0);
        true
    }

    pub fn find(&self, comment_id: Uuid) -> Option<&CommentTreeItem> {
        self.comments.iter().find(|c| c.id == comment_id)
    }
}

/// Replies under one comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyThread {
    pub parent_id: Uuid,
    pub replies: Vec<CommentTreeItem>,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

impl ReplyThread {
    pub fn new(parent_id: Uuid, page_size: u32) -> Self {
        Self {
            parent_id,
            replies: Vec::new(),
            page: 0,
            page_size,
            has_more: false,
        }
    }

    fn request(&self, page: u32) -> PageRequest {
        PageRequest::new(page, self.page_size).sorted(REPLIES_SORT)
    }

    pub async fn load(&mut self, backend: &dyn BackendApi) -> BackendResult<()> {
        let page = backend.replies(self.parent_id, &self.request(0)).await?;
        self.replies = page.content;
        self.has_more = !page.last;
        self.page = 0;
        Ok(())
    }

    /// Same rollback rule as `CommentThread::load_more`
    pub async fn load_more(&mut self, backend: &dyn BackendApi) -> BackendResult<()> {
        if !self.has_more {
            return Ok(());
        }

        self.page += 1;
        match backend.replies(self.parent_id, &self.request(self.page)).await {
            Ok(page) => {
                self.replies.extend(page.content);
                self.has_more = !page.last;
                Ok(())
            }
            Err(e) => {
                self.page -= 1;
                Err(e)
            }
        }
    }

    pub async fn load_through(&mut self, backend: &dyn BackendApi, page: u32) -> BackendResult<()> {
        self.load(backend).await?;
        while self.page < page && self.has_more {
            self.load_more(backend).await?;
        }
        Ok(())
    }

    pub fn prepend(&mut self, reply: CommentTreeItem) {
        self.replies.insert(0, reply);
    }

    pub fn remove(&mut self, reply_id: Uuid) {
        self.replies.retain(|r| r.id != reply_id);
    }

    pub fn replace(&mut self, reply: CommentTreeItem) {
        if let Some(existing) = self.replies.iter_mut().find(|r| r.id == reply.id) {
            *existing = reply;
        }
    }
}

/// A comment belongs to the viewer when the ids match
pub fn is_own_comment(comment: &CommentTreeItem, viewer_id: Option<Uuid>) -> bool {
    viewer_id == Some(comment.user_id)
}

/// Permalink to a comment on its post page
pub fn share_url(public_url: &str, slug: &str, comment_id: Uuid) -> String {
    format!(
        "{}/blog/{}#comment-{}",
        public_url.trim_end_matches('/'),
        urlencoding::encode(slug),
        comment_id
    )
}

fn validated(content: &str) -> Result<String, CommentServiceError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(CommentServiceError::EmptyContent);
    }
    Ok(trimmed.to_string())
}

/// Comment operations on behalf of a signed-in user
pub struct CommentService {
    backend: Arc<dyn BackendApi>,
    comments_page_size: u32,
    replies_page_size: u32,
}

impl CommentService {
    pub fn new(backend: Arc<dyn BackendApi>, comments_page_size: u32, replies_page_size: u32) -> Self {
        Self {
            backend,
            comments_page_size,
            replies_page_size,
        }
    }

    pub fn backend(&self) -> &dyn BackendApi {
        self.backend.as_ref()
    }

    pub fn new_thread(&self, post_id: Uuid) -> CommentThread {
        CommentThread::new(post_id, self.comments_page_size)
    }

    pub fn new_replies(&self, parent_id: Uuid) -> ReplyThread {
        ReplyThread::new(parent_id, self.replies_page_size)
    }

    /// Refresh `thread` through `page`. On failure `thread` is left untouched.
    pub async fn refresh_thread(&self, thread: &mut CommentThread, page: u32) -> BackendResult<()> {
        let mut fresh = self.new_thread(thread.post_id);
        fresh.load_through(self.backend(), page).await?;
        *thread = fresh;
        Ok(())
    }

    pub async fn load_replies(&self, parent_id: Uuid, page: u32) -> BackendResult<ReplyThread> {
        let mut replies = self.new_replies(parent_id);
        replies.load_through(self.backend(), page).await?;
        Ok(replies)
    }

    /// Post a comment, or a reply when `parent_id` is set
    pub async fn create(
        &self,
        token: &str,
        post_id: Uuid,
        content: &str,
        parent_id: Option<Uuid>,
    ) -> Result<CommentTreeItem, CommentServiceError> {
        let request = CommentRequest {
            content: validated(content)?,
            parent_comment_id: parent_id,
        };
        let comment = self.backend.create_comment(token, post_id, &request).await?;
        tracing::info!(%post_id, comment_id = %comment.id, reply = parent_id.is_some(), "Comment created");
        Ok(comment)
    }

    pub async fn update(
        &self,
        token: &str,
        comment_id: Uuid,
        content: &str,
    ) -> Result<CommentTreeItem, CommentServiceError> {
        let content = validated(content)?;
        Ok(self.backend.update_comment(token, comment_id, &content).await?)
    }

    pub async fn delete(&self, token: &str, comment_id: Uuid) -> Result<(), CommentServiceError> {
        self.backend.delete_comment(token, comment_id).await?;
        tracing::info!(%comment_id, "Comment deleted");
        Ok(())
    }

    /// Like info for a comment; without a token `is_liked` is always false
    pub async fn like_info(&self, token: Option<&str>, comment: &CommentTreeItem) -> CommentLikeResponse {
        let fallback = CommentLikeResponse {
            count: comment.like_count,
            is_liked: false,
        };
        if token.is_none() {
            return fallback;
        }
        match self.backend.comment_like_info(token, comment.id).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(comment_id = %comment.id, "Failed to load comment like info: {}", e);
                fallback
            }
        }
    }

    /// Toggle the viewer's like; the backend's answer is authoritative
    pub async fn toggle_like(&self, token: &str, comment_id: Uuid) -> BackendResult<CommentLikeResponse> {
        self.backend.toggle_comment_like(token, comment_id).await
    }
}

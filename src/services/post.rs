//! Blog post service
//!
//! Reads posts from the backend and caches them, along with their rendered
//! HTML per colour theme.

use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BackendApi, BackendResult};
use crate::cache::{Cache, CacheLayer};
use crate::models::{BlogPost, PageRequest};
use crate::services::markdown::MarkdownRenderer;
use crate::services::theme::Theme;

/// Page size used when walking the full post list
const LIST_PAGE_SIZE: u32 = 50;

/// Upper bound on pages fetched for one listing
const MAX_LIST_PAGES: u32 = 20;

const POSTS_INDEX_KEY: &str = "posts:index";

fn slug_key(slug: &str) -> String {
    format!("posts:slug:{}", slug)
}

fn html_key(slug: &str, theme: Theme) -> String {
    format!("posts:html:{}:{}", slug, theme)
}

fn tag_key(tag: &str) -> String {
    format!("posts:tag:{}", tag)
}

/// Posts, newest first; undated posts go last
pub fn sort_newest_first(posts: &mut [BlogPost]) {
    // `None < Some(_)`, so reversing also moves undated posts to the end
    posts.sort_by_key(|post| Reverse(post.published_at));
}

pub struct PostService {
    backend: Arc<dyn BackendApi>,
    cache: Arc<Cache>,
    renderer: MarkdownRenderer,
    ttl: Duration,
}

impl PostService {
    pub fn new(backend: Arc<dyn BackendApi>, cache: Arc<Cache>, ttl: Duration) -> Self {
        Self {
            backend,
            cache,
            renderer: MarkdownRenderer::new(),
            ttl,
        }
    }

    async fn cached<T: serde::de::DeserializeOwned + Send>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(value)) => {
                tracing::debug!(key, "Cache hit");
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, "Cache read failed: {}", e);
                None
            }
        }
    }

    async fn store<T: serde::Serialize + Send + Sync>(&self, key: &str, value: &T) {
        if let Err(e) = self.cache.set(key, value, self.ttl).await {
            tracing::warn!(key, "Cache write failed: {}", e);
        }
    }

    /// Every post, fetched page by page until the backend reports the last one
    pub async fn list(&self) -> BackendResult<Vec<BlogPost>> {
        if let Some(posts) = self.cached::<Vec<BlogPost>>(POSTS_INDEX_KEY).await {
            return Ok(posts);
        }

        let mut posts = Vec::new();
        for page in 0..MAX_LIST_PAGES {
            let request = PageRequest::new(page, LIST_PAGE_SIZE).sorted("publishedAt,desc");
            let result = self.backend.list_posts(&request).await?;
            let last = result.last || result.content.is_empty();
            posts.extend(result.content);
            if last {
                break;
            }
            if page + 1 == MAX_LIST_PAGES {
                tracing::warn!(pages = MAX_LIST_PAGES, "Post listing truncated");
            }
        }

        self.store(POSTS_INDEX_KEY, &posts).await;
        Ok(posts)
    }

    /// The `limit` most recently published posts
    pub async fn recent(&self, limit: usize) -> BackendResult<Vec<BlogPost>> {
        let mut posts = self.list().await?;
        sort_newest_first(&mut posts);
        posts.truncate(limit);
        Ok(posts)
    }

    pub async fn by_slug(&self, slug: &str) -> BackendResult<BlogPost> {
        let key = slug_key(slug);
        if let Some(post) = self.cached::<BlogPost>(&key).await {
            return Ok(post);
        }

        let post = self.backend.get_post(slug).await?;
        self.store(&key, &post).await;
        Ok(post)
    }

    pub async fn by_tag(&self, tag: &str) -> BackendResult<Vec<BlogPost>> {
        let key = tag_key(tag);
        if let Some(posts) = self.cached::<Vec<BlogPost>>(&key).await {
            return Ok(posts);
        }

        let request = PageRequest::new(0, LIST_PAGE_SIZE).sorted("publishedAt,desc");
        let mut posts = self.backend.posts_by_tag(tag, &request).await?.content;
        sort_newest_first(&mut posts);
        self.store(&key, &posts).await;
        Ok(posts)
    }

    /// Post body as HTML for `theme`
    pub async fn render(&self, post: &BlogPost, theme: Theme) -> String {
        let key = html_key(&post.slug, theme);
        if let Some(html) = self.cached::<String>(&key).await {
            return html;
        }

        let html = self.renderer.render(&post.content, theme);
        self.store(&key, &html).await;
        html
    }

    /// Drop every cached post entry
    pub async fn invalidate(&self) {
        if let Err(e) = self.cache.delete_pattern("posts:*").await {
            tracing::warn!("Failed to invalidate post cache: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::stub::{sample_post, StubBackend};
    use crate::backend::BackendError;
    use crate::cache::create_cache;

    fn service(backend: Arc<StubBackend>) -> PostService {
        PostService::new(backend, create_cache(1000, Duration::from_secs(60)), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_list_walks_all_pages_and_caches() {
        let backend = Arc::new(StubBackend::new().with_posts(
            (0..120u32).map(|i| sample_post(&format!("q{}", i), (i % 28) + 1)).collect(),
        ));
        let service = service(backend.clone());

        let listed = service.list().await.unwrap();
        assert_eq!(listed.len(), 120);
        assert_eq!(backend.calls("list_posts"), 3);

        service.list().await.unwrap();
        assert_eq!(backend.calls("list_posts"), 3);
    }

    #[tokio::test]
    async fn test_recent_sorts_and_truncates() {
        let mut undated = sample_post("undated", 1);
        undated.published_at = None;
        let backend = Arc::new(StubBackend::new().with_posts(vec![
            sample_post("old", 1),
            undated,
            sample_post("new", 20),
            sample_post("mid", 10),
        ]));
        let service = service(backend);

        let recent = service.recent(3).await.unwrap();
        let slugs: Vec<_> = recent.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["new", "mid", "old"]);

        let all = service.recent(99).await.unwrap();
        assert_eq!(all.last().unwrap().slug, "undated");
    }

    #[tokio::test]
    async fn test_by_slug_caches_and_propagates_not_found() {
        let backend = Arc::new(StubBackend::new().with_posts(vec![sample_post("hello", 1)]));
        let service = service(backend.clone());

        assert_eq!(service.by_slug("hello").await.unwrap().slug, "hello");
        service.by_slug("hello").await.unwrap();
        assert_eq!(backend.calls("get_post"), 1);

        assert_eq!(service.by_slug("missing").await.unwrap_err(), BackendError::NotFound);
    }

    #[tokio::test]
    async fn test_by_tag() {
        let mut other = sample_post("go", 2);
        other.tags = vec!["go".to_string()];
        let backend = Arc::new(StubBackend::new().with_posts(vec![sample_post("rusty", 1), other]));
        let service = service(backend);

        let tagged = service.by_tag("rust").await.unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].slug, "rusty");
    }

    #[tokio::test]
    async fn test_render_is_cached_per_theme() {
        let backend = Arc::new(StubBackend::new());
        let service = service(backend);
        let post = sample_post("hello", 1);

        let light = service.render(&post, Theme::Tageslicht).await;
        let dark = service.render(&post, Theme::Halloween).await;
        assert!(light.contains("<h1>hello</h1>"));
        assert_ne!(light, dark);

        let cached: Option<String> = service
            .cache
            .get(&html_key("hello", Theme::Halloween))
            .await
            .unwrap();
        assert_eq!(cached, Some(dark));
    }

    #[tokio::test]
    async fn test_invalidate_clears_post_entries() {
        let backend = Arc::new(StubBackend::new().with_posts(vec![sample_post("hello", 1)]));
        let service = service(backend.clone());
        service.list().await.unwrap();

        service.invalidate().await;
        service.list().await.unwrap();
        assert_eq!(backend.calls("list_posts"), 2);
    }

    #[test]
    fn test_cache_keys() {
        assert_eq!(slug_key("a"), "posts:slug:a");
        assert_eq!(html_key("a", Theme::Halloween), "posts:html:a:halloween");
        assert_eq!(tag_key("rust"), "posts:tag:rust");
    }
}

//! Blog post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of entry shown in the blog list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostType {
    /// Article hosted on this site
    #[default]
    #[serde(rename = "blog", alias = "BLOG")]
    Blog,
    /// Video, links out to `external_url`
    #[serde(rename = "youtube", alias = "YOUTUBE")]
    Youtube,
    /// Article published elsewhere
    #[serde(rename = "external", alias = "EXTERNAL")]
    External,
}

impl std::fmt::Display for PostType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blog => write!(f, "blog"),
            Self::Youtube => write!(f, "youtube"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Blog post as returned by `GET /v1/blog/...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Markdown body; list endpoints may omit it
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author_id: Option<Uuid>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(rename = "type", default)]
    pub post_type: PostType,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BlogPost {
    /// Where a card or detail request for this post should send the visitor,
    /// when the content lives off-site.
    pub fn external_target(&self) -> Option<&str> {
        match self.post_type {
            PostType::Blog => None,
            PostType::Youtube | PostType::External => self
                .external_url
                .as_deref()
                .filter(|url| !url.trim().is_empty()),
        }
    }
}

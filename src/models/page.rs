//! Paged backend responses

use serde::{Deserialize, Serialize};

/// A page of results as returned by the backend (Spring `Page` JSON).
///
/// Only the fields this server reads are modelled; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub content: Vec<T>,
    #[serde(default = "default_last")]
    pub last: bool,
    #[serde(default)]
    pub total_elements: i64,
    #[serde(default)]
    pub total_pages: i64,
    /// Zero-based page index
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub size: u32,
}

fn default_last() -> bool {
    true
}

impl<T> Page<T> {
    /// A single, final page holding `content`
    pub fn single(content: Vec<T>) -> Self {
        let len = content.len();
        Self {
            content,
            last: true,
            total_elements: len as i64,
            total_pages: 1,
            number: 0,
            size: len as u32,
        }
    }

    /// Whether another page can be requested
    pub fn has_more(&self) -> bool {
        !self.last
    }
}

/// Paging and sorting parameters sent to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    /// Spring sort expression, e.g. `createdAt,desc`
    pub sort: Option<String>,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size, sort: None }
    }

    pub fn sorted(mut self, sort: &str) -> Self {
        self.sort = Some(sort.to_string());
        self
    }

    /// Query pairs in the order the backend documents them
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("page", self.page.to_string()), ("size", self.size.to_string())];
        if let Some(sort) = &self.sort {
            pairs.push(("sort", sort.clone()));
        }
        pairs
    }
}

//! Load state of a remotely fetched value

use serde::{Deserialize, Serialize};

/// Outcome of fetching something from the backend.
///
/// `Ok(None)` is a successful fetch with nothing to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "UPPERCASE")]
pub enum FetchState<T> {
    Init,
    Ok(Option<T>),
    Error(String),
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self::Init
    }
}

impl<T> FetchState<T> {
    pub fn success(value: T) -> Self {
        Self::Ok(Some(value))
    }

    pub fn success_empty() -> Self {
        Self::Ok(None)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ok(Some(value)) => Some(value),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

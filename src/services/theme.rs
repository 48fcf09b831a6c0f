//! Colour theme preference

use serde::{Deserialize, Serialize};

/// Cookie holding the visitor's theme
pub const THEME_COOKIE: &str = "theme";

const HIGHLIGHT_CSS_BASE: &str = "https://cdn.jsdelivr.net/npm/highlight.js@11.9.0/styles";

/// Site colour theme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Light theme
    #[default]
    Tageslicht,
    /// Dark theme
    Halloween,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tageslicht => "tageslicht",
            Self::Halloween => "halloween",
        }
    }

    /// Unknown or missing values fall back to the default theme
    pub fn from_cookie(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }

    pub fn toggle(self) -> Self {
        match self {
            Self::Tageslicht => Self::Halloween,
            Self::Halloween => Self::Tageslicht,
        }
    }

    pub fn is_dark(&self) -> bool {
        matches!(self, Self::Halloween)
    }

    /// highlight.js stylesheet for client-highlighted snippets
    pub fn highlight_css_url(&self) -> String {
        let sheet = if self.is_dark() { "github-dark.css" } else { "github.css" };
        format!("{}/{}", HIGHLIGHT_CSS_BASE, sheet)
    }

    /// syntect theme used when rendering code blocks server-side
    pub fn syntax_theme(&self) -> &'static str {
        if self.is_dark() {
            "base16-ocean.dark"
        } else {
            "InspiredGitHub"
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tageslicht" => Ok(Self::Tageslicht),
            "halloween" => Ok(Self::Halloween),
            _ => Err(format!("Invalid theme: {}", s)),
        }
    }
}

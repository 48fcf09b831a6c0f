//! User models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel email for visitors without a resolved account
pub const NOT_CONNECTED: &str = "NOT_CONNECTED";

/// User as returned by `GET /v1/users/me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// The signed-in user as shown in the navbar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedUser {
    pub id: Option<Uuid>,
    pub email: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ConnectedUser {
    pub fn not_connected() -> Self {
        Self {
            id: None,
            email: NOT_CONNECTED.to_string(),
            username: None,
            first_name: None,
            last_name: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.email != NOT_CONNECTED
    }

    /// Name for greetings: full name, then username, then email
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !full.is_empty() {
            return full;
        }
        self.username.clone().unwrap_or_else(|| self.email.clone())
    }
}

impl From<UserProfile> for ConnectedUser {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: Some(profile.id),
            email: profile.email.unwrap_or_default(),
            username: profile.username,
            first_name: profile.first_name,
            last_name: profile.last_name,
        }
    }
}

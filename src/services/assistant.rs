//! AI assistant
//!
//! Conversations are held by the backend chat memory; this server keeps a
//! mirror of each one in the cache so the panel can be rendered without a
//! round trip, plus the panel's layout rules.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::backend::BackendApi;
use crate::cache::{Cache, CacheLayer};
use crate::config::QuickPrompt;
use crate::models::ChatMessage;

/// Cookie holding the current conversation id
pub const CONVERSATION_COOKIE: &str = "mkopp-ai-conversation-id";

/// Cookie holding the panel width in px
pub const PANEL_WIDTH_COOKIE: &str = "mkopp-ai-panel-width";

/// Cookie set once the greeting bubble next to the assistant button is closed
pub const SPEECH_BUBBLE_COOKIE: &str = "mkopp-ai-speech-bubble-dismissed";

pub const RESPONSE_ERROR: &str = "Failed to get response. Please try again.";
pub const FALLBACK_REPLY: &str = "Sorry, I encountered an error. Please try again.";

pub const DEFAULT_PANEL_WIDTH: u32 = 380;
pub const MIN_PANEL_WIDTH: u32 = 280;
/// Largest panel width as a share of the viewport
pub const MAX_PANEL_FRACTION: f64 = 0.6;
/// Viewports narrower than this open the panel maximized
pub const MOBILE_BREAKPOINT: u32 = 768;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AssistantError {
    #[error("Message must not be empty")]
    EmptyMessage,
}

/// Local mirror of one conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Conversation {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }
}

/// Reuse the conversation id from the cookie when it is a UUID, otherwise
/// mint one. Returns the id and whether it is new.
pub fn load_or_create_conversation_id(cookie: Option<&str>) -> (String, bool) {
    match cookie.map(str::trim).filter(|id| Uuid::parse_str(id).is_ok()) {
        Some(id) => (id.to_string(), false),
        None => (Uuid::new_v4().to_string(), true),
    }
}

fn conversation_key(id: &str) -> String {
    format!("conversation:{}", id)
}

pub struct AssistantService {
    backend: Arc<dyn BackendApi>,
    cache: Arc<Cache>,
    ttl: Duration,
    quick_prompts: Vec<QuickPrompt>,
}

impl AssistantService {
    pub fn new(backend: Arc<dyn BackendApi>, cache: Arc<Cache>, ttl: Duration, quick_prompts: Vec<QuickPrompt>) -> Self {
        Self {
            backend,
            cache,
            ttl,
            quick_prompts,
        }
    }

    pub fn quick_prompts(&self) -> &[QuickPrompt] {
        &self.quick_prompts
    }

    /// The mirrored conversation, empty when nothing is stored
    pub async fn conversation(&self, id: &str) -> Conversation {
        if id.is_empty() {
            return Conversation::default();
        }
        match self.cache.get::<Conversation>(&conversation_key(id)).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => Conversation::new(id),
            Err(e) => {
                tracing::warn!(conversation_id = id, "Failed to read conversation: {}", e);
                Conversation::new(id)
            }
        }
    }

    async fn persist(&self, conversation: &Conversation) {
        if let Err(e) = self
            .cache
            .set(&conversation_key(&conversation.id), conversation, self.ttl)
            .await
        {
            tracing::warn!(conversation_id = %conversation.id, "Failed to store conversation: {}", e);
        }
    }

    /// Pull the conversation from the backend chat memory.
    ///
    /// A failed load yields an empty history.
    pub async fn load_history(&self, token: Option<&str>, id: &str) -> Conversation {
        if id.is_empty() {
            return Conversation::default();
        }

        let mut conversation = self.conversation(id).await;
        conversation.messages = match self.backend.chat_history(token, id).await {
            Ok(messages) => messages.into_iter().filter(ChatMessage::is_visible).collect(),
            Err(e) => {
                tracing::warn!(conversation_id = id, "Failed to load chat history: {}", e);
                Vec::new()
            }
        };
        self.persist(&conversation).await;
        conversation
    }

    /// Send a message and return the assistant's reply.
    ///
    /// An empty conversation id returns `""` without calling the backend. A
    /// failed call records `RESPONSE_ERROR`, appends `FALLBACK_REPLY` and also
    /// returns `""`.
    pub async fn send(&self, token: Option<&str>, id: &str, message: &str) -> Result<String, AssistantError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AssistantError::EmptyMessage);
        }
        if id.is_empty() {
            return Ok(String::new());
        }

        let mut conversation = self.conversation(id).await;
        conversation.error = None;
        conversation.messages.push(ChatMessage::user(message));
        conversation.loading = true;
        self.persist(&conversation).await;

        let reply = match self.backend.chat(token, id, message).await {
            Ok(reply) => {
                conversation.messages.push(ChatMessage::assistant(reply.clone()));
                reply
            }
            Err(e) => {
                tracing::error!(conversation_id = id, "Chat request failed: {}", e);
                conversation.error = Some(RESPONSE_ERROR.to_string());
                conversation.messages.push(ChatMessage::assistant(FALLBACK_REPLY));
                String::new()
            }
        };

        conversation.loading = false;
        self.persist(&conversation).await;
        Ok(reply)
    }

    /// Forget the conversation and return the id of a fresh one
    pub async fn clear(&self, id: &str) -> String {
        if !id.is_empty() {
            if let Err(e) = self.cache.delete(&conversation_key(id)).await {
                tracing::warn!(conversation_id = id, "Failed to clear conversation: {}", e);
            }
        }
        Uuid::new_v4().to_string()
    }
}

/// The greeting bubble stays hidden once dismissed
pub fn speech_bubble_dismissed(stored: Option<&str>) -> bool {
    stored.is_some_and(|value| value.trim() == "true")
}

/// Stored widths that do not parse fall back to the default
pub fn parse_panel_width(stored: Option<&str>) -> u32 {
    stored
        .and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|width| *width > 0)
        .unwrap_or(DEFAULT_PANEL_WIDTH)
}

/// Widest panel allowed for a viewport, never below the minimum
pub fn max_panel_width(viewport_width: u32) -> u32 {
    ((viewport_width as f64 * MAX_PANEL_FRACTION) as u32).max(MIN_PANEL_WIDTH)
}

/// Width after dragging the panel's left edge from `start_x` to `current_x`
pub fn resize(start_width: u32, start_x: i32, current_x: i32, viewport_width: u32) -> u32 {
    let proposed = start_width as i64 + (start_x as i64 - current_x as i64);
    proposed.clamp(MIN_PANEL_WIDTH as i64, max_panel_width(viewport_width) as i64) as u32
}

/// Size state of the assistant panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelLayout {
    pub width: u32,
    pub maximized: bool,
    /// Width to restore when leaving maximized mode
    pub saved_width: Option<u32>,
}

impl Default for PanelLayout {
    fn default() -> Self {
        Self {
            width: DEFAULT_PANEL_WIDTH,
            maximized: false,
            saved_width: None,
        }
    }
}

impl PanelLayout {
    /// Layout on first open. Narrow viewports start maximized.
    pub fn initial(stored_width: Option<&str>, viewport_width: Option<u32>) -> Self {
        let width = parse_panel_width(stored_width);
        let maximized = viewport_width.is_some_and(|w| w < MOBILE_BREAKPOINT);
        Self {
            width,
            maximized,
            saved_width: maximized.then_some(width),
        }
    }

    pub fn toggle_maximize(&mut self) {
        if self.maximized {
            self.width = self.saved_width.take().unwrap_or(self.width);
            self.maximized = false;
        } else {
            self.saved_width = Some(self.width);
            self.maximized = true;
        }
    }

    pub fn resize(&mut self, start_x: i32, current_x: i32, viewport_width: u32) {
        self.width = resize(self.width, start_x, current_x, viewport_width);
    }
}

//! AI chat models

use serde::{Deserialize, Serialize};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    User,
    Assistant,
    System,
    Tool,
}

/// One entry of a conversation, as stored by the backend chat memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message_type: MessageType,
    #[serde(default)]
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Assistant,
            text: text.into(),
        }
    }

    /// Only user and assistant turns are rendered in the panel
    pub fn is_visible(&self) -> bool {
        matches!(self.message_type, MessageType::User | MessageType::Assistant)
    }
}

//! User messages handed to a conversation.

use serde::{Deserialize, Serialize};

/// A user turn, as converted from ACP prompt content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserMessage {
    /// Ordered parts.
    pub parts: Vec<MessagePart>,
}

/// One part of a user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    /// Text.
    Text {
        /// Body.
        text: String,
    },
    /// Image given as a URL (data URLs included).
    Image {
        /// Image URL.
        url: String,
    },
}

impl UserMessage {
    /// Single-text message.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    /// Concatenated text parts.
    #[must_use]
    pub fn plain_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::Image { .. } => None,
            })
            .collect()
    }

    /// Whether the message carries no text and no images.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|part| match part {
            MessagePart::Text { text } => text.trim().is_empty(),
            MessagePart::Image { .. } => false,
        })
    }
}

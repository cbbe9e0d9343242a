//! Chat message model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An order-preserving message key, unique within a conversation.
///
/// Keys sort lexicographically in creation order. Store-assigned keys are
/// UUID v7 strings, which satisfy that ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wrap an existing store key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generate a fresh time-sortable key.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A tagged reference to a game entity attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredItem {
    /// Display name of the entity.
    pub name: String,
    /// Entity category (e.g. "pet", "vehicle").
    #[serde(default)]
    pub category: String,
    /// Image URL for the entity.
    #[serde(default)]
    pub image: Option<String>,
    /// Trade value.
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub fly: bool,
    #[serde(default)]
    pub ride: bool,
    #[serde(default)]
    pub neon: bool,
    #[serde(default)]
    pub mega: bool,
}

impl StructuredItem {
    pub fn new(name: impl Into<String>, category: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            image: None,
            value,
            fly: false,
            ride: false,
            neon: false,
            mega: false,
        }
    }
}

/// A message as held by the store and mirrored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: String,
    /// May be empty when attachments or items are present.
    #[serde(default)]
    pub text: String,
    /// Creation timestamp (Unix ms). Absent on malformed records.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Public image URLs (0..=3).
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub structured_items: Vec<StructuredItem>,
    /// Weak back-reference to the message being replied to.
    #[serde(default)]
    pub reply_to_id: Option<MessageId>,
    #[serde(default)]
    pub report_count: u32,
    /// Sender's strike count when the message was sent.
    #[serde(default)]
    pub strike_count_at_send: Option<u32>,
}

impl Message {
    /// Timestamp used for ordering; absent timestamps sort as 0.
    pub fn sort_timestamp(&self) -> i64 {
        self.timestamp.unwrap_or(0)
    }

    /// Short text used for conversation previews.
    pub fn preview_text(&self) -> String {
        let text = self.text.trim();
        if !text.is_empty() {
            return text.to_string();
        }
        if !self.attachments.is_empty() {
            return "Sent an image".to_string();
        }
        if !self.structured_items.is_empty() {
            return "Sent a trade".to_string();
        }
        String::new()
    }
}

/// Locally composed content awaiting send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    #[serde(default)]
    pub text: String,
    /// Local file URIs still to be uploaded.
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub structured_items: Vec<StructuredItem>,
    #[serde(default)]
    pub reply_to_id: Option<MessageId>,
}

impl MessageDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Whether the draft carries anything worth sending.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty() && self.structured_items.is_empty()
    }
}

/// Record handed to the store; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub sender_id: String,
    pub text: String,
    pub timestamp: i64,
    pub attachments: Vec<String>,
    pub structured_items: Vec<StructuredItem>,
    pub reply_to_id: Option<MessageId>,
    pub strike_count_at_send: Option<u32>,
}

impl NewMessage {
    /// Attach a store-assigned key.
    pub fn into_message(self, id: MessageId) -> Message {
        Message {
            id,
            sender_id: self.sender_id,
            text: self.text,
            timestamp: Some(self.timestamp),
            attachments: self.attachments,
            structured_items: self.structured_items,
            reply_to_id: self.reply_to_id,
            report_count: 0,
            strike_count_at_send: self.strike_count_at_send,
        }
    }
}

//! Conversation references and summaries

use serde::{Deserialize, Serialize};

/// Whether a conversation is a shared room or a one-to-one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Group,
    Private,
}

/// Identifies a conversation's message log in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConversationRef {
    /// A shared group room.
    Group { room_id: String },
    /// A one-to-one chat; `chat_key` is shared by both participants.
    Private { chat_key: String, partner_id: String },
}

impl ConversationRef {
    pub fn group(room_id: impl Into<String>) -> Self {
        Self::Group {
            room_id: room_id.into(),
        }
    }

    /// Private chat between `viewer_id` and `partner_id`.
    pub fn private(viewer_id: &str, partner_id: &str) -> Self {
        Self::Private {
            chat_key: private_chat_key(viewer_id, partner_id),
            partner_id: partner_id.to_string(),
        }
    }

    pub const fn kind(&self) -> ConversationKind {
        match self {
            Self::Group { .. } => ConversationKind::Group,
            Self::Private { .. } => ConversationKind::Private,
        }
    }

    /// Store path of the conversation's message log.
    pub fn messages_path(&self) -> String {
        match self {
            Self::Group { room_id } => format!("chat_rooms/{room_id}/messages"),
            Self::Private { chat_key, .. } => format!("private_chat/{chat_key}/messages"),
        }
    }

    pub fn partner_id(&self) -> Option<&str> {
        match self {
            Self::Group { .. } => None,
            Self::Private { partner_id, .. } => Some(partner_id),
        }
    }
}

/// Order-independent key for a pair of participants.
pub fn private_chat_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}

/// Per-counterpart (or per-group) inbox entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub partner_or_group_id: String,
    #[serde(default)]
    pub last_message_preview: String,
    #[serde(default)]
    pub last_message_timestamp: i64,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl ConversationSummary {
    pub fn new(partner_or_group_id: impl Into<String>) -> Self {
        Self {
            partner_or_group_id: partner_or_group_id.into(),
            last_message_preview: String::new(),
            last_message_timestamp: 0,
            unread_count: 0,
            display_name: String::new(),
            avatar_url: None,
        }
    }

    #[must_use]
    pub const fn with_unread(mut self, unread_count: u32) -> Self {
        self.unread_count = unread_count;
        self
    }
}

/// How an unread counter should change upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnreadUpdate {
    Set(u32),
    Increment(u32),
}

/// Partial update for a summary record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPatch {
    pub unread: Option<UnreadUpdate>,
    pub last_message_preview: Option<String>,
    pub last_message_timestamp: Option<i64>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl SummaryPatch {
    /// A patch that only zeroes the unread counter.
    pub fn mark_read() -> Self {
        Self {
            unread: Some(UnreadUpdate::Set(0)),
            ..Self::default()
        }
    }

    /// Apply the patch, creating values where absent.
    pub fn apply(&self, summary: &mut ConversationSummary) {
        match self.unread {
            Some(UnreadUpdate::Set(count)) => summary.unread_count = count,
            Some(UnreadUpdate::Increment(by)) => {
                summary.unread_count = summary.unread_count.saturating_add(by);
            }
            None => {}
        }
        if let Some(preview) = &self.last_message_preview {
            summary.last_message_preview.clone_from(preview);
        }
        if let Some(timestamp) = self.last_message_timestamp {
            summary.last_message_timestamp = timestamp;
        }
        if let Some(name) = &self.display_name {
            summary.display_name.clone_from(name);
        }
        if let Some(url) = &self.avatar_url {
            summary.avatar_url = Some(url.clone());
        }
    }
}

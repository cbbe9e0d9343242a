//! Pre-send checks: content limits, duplicate suppression, cooldown, bans.

mod ban;
mod fingerprint;

use std::fmt;

pub use ban::{check_send_allowed, format_remaining, SendPermission};
pub use fingerprint::MessageFingerprint;

use crate::config::ChatConfig;
use crate::models::{MessageDraft, SenderProfile};
use crate::moderation::{contains_link, ModerationReason};

/// Rejection category, used by clients to pick alert wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The content must be edited before retrying.
    Validation,
    /// The sender may not send right now.
    Authorization,
}

/// Why a send was refused before any network effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendRejection {
    Empty,
    TooLong { max: usize },
    TooManyAttachments { max: usize },
    TooManyItems { max: usize },
    Duplicate,
    LinkNotPermitted,
    CoolingDown,
    AlreadySending,
    Moderation(ModerationReason),
    NotSignedIn,
    Banned { message: String },
}

impl SendRejection {
    pub const fn kind(&self) -> RejectionKind {
        match self {
            Self::NotSignedIn | Self::Banned { .. } => RejectionKind::Authorization,
            _ => RejectionKind::Validation,
        }
    }
}

impl fmt::Display for SendRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Message cannot be empty."),
            Self::TooLong { max } => write!(f, "Message cannot be longer than {max} characters."),
            Self::TooManyAttachments { max } => write!(f, "You can attach up to {max} images."),
            Self::TooManyItems { max } => write!(f, "You can attach up to {max} items."),
            Self::Duplicate => f.write_str("You cannot send the same message twice."),
            Self::LinkNotPermitted => f.write_str("Only subscribers can share links."),
            Self::CoolingDown => f.write_str("You're sending messages too fast."),
            Self::AlreadySending => f.write_str("A message is already being sent."),
            Self::Moderation(reason) => fmt::Display::fmt(reason, f),
            Self::NotSignedIn => f.write_str("You must be signed in to chat."),
            Self::Banned { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for SendRejection {}

/// Numeric caps applied to outgoing drafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendLimits {
    pub max_chars: usize,
    pub max_attachments: usize,
    pub max_items: usize,
}

impl From<&ChatConfig> for SendLimits {
    fn from(config: &ChatConfig) -> Self {
        Self {
            max_chars: config.max_message_chars,
            max_attachments: config.max_attachments,
            max_items: config.max_structured_items,
        }
    }
}

impl Default for SendLimits {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

/// Stateful guard remembering only the most recently sent fingerprint.
#[derive(Debug, Clone, Default)]
pub struct SendGuard {
    limits: SendLimits,
    last_sent: Option<MessageFingerprint>,
}

impl SendGuard {
    pub const fn new(limits: SendLimits) -> Self {
        Self {
            limits,
            last_sent: None,
        }
    }

    /// Boolean form of [`SendGuard::check`].
    pub fn can_send(
        &self,
        candidate: &MessageDraft,
        sender: &SenderProfile,
        cooldown_active: bool,
    ) -> bool {
        self.check(candidate, sender, cooldown_active).is_ok()
    }

    /// Run the guards in order, returning the first failure.
    pub fn check(
        &self,
        candidate: &MessageDraft,
        sender: &SenderProfile,
        cooldown_active: bool,
    ) -> Result<(), SendRejection> {
        if cooldown_active {
            return Err(SendRejection::CoolingDown);
        }
        if candidate.is_empty() {
            return Err(SendRejection::Empty);
        }

        let text = candidate.text.trim();
        if text.chars().count() > self.limits.max_chars {
            return Err(SendRejection::TooLong {
                max: self.limits.max_chars,
            });
        }
        if candidate.attachments.len() > self.limits.max_attachments {
            return Err(SendRejection::TooManyAttachments {
                max: self.limits.max_attachments,
            });
        }
        if candidate.structured_items.len() > self.limits.max_items {
            return Err(SendRejection::TooManyItems {
                max: self.limits.max_items,
            });
        }
        if !sender.may_post_links() && contains_link(text) {
            return Err(SendRejection::LinkNotPermitted);
        }
        if self.is_duplicate(candidate) {
            return Err(SendRejection::Duplicate);
        }
        Ok(())
    }

    pub fn is_duplicate(&self, candidate: &MessageDraft) -> bool {
        self.last_sent
            .as_ref()
            .is_some_and(|last| *last == MessageFingerprint::of(candidate))
    }

    /// Remember a successfully sent draft, replacing the previous one.
    pub fn record_sent(&mut self, sent: &MessageDraft) {
        self.last_sent = Some(MessageFingerprint::of(sent));
    }

    pub const fn limits(&self) -> SendLimits {
        self.limits
    }
}

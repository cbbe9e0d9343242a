//! Data models for Tradechat

mod conversation;
mod message;
mod strike;

pub use conversation::{
    private_chat_key, ConversationKind, ConversationRef, ConversationSummary, SummaryPatch,
    UnreadUpdate,
};
pub use message::{Message, MessageDraft, MessageId, NewMessage, StructuredItem};
pub use strike::{BanExpiry, SenderProfile, StrikeRecord};

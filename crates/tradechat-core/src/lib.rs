//! tradechat-core - Core library for Tradechat
//!
//! This crate contains the chat models, send gating, moderation, and the
//! reconciliation logic that keeps local message lists and inbox summaries
//! consistent with the remote chat store. It is used by the app shells and
//! the `tradechat` CLI.

pub mod config;
pub mod error;
pub mod guard;
pub mod models;
pub mod moderation;
pub mod services;
pub mod state;
pub mod store;
pub mod sync;
pub mod util;

pub use config::ChatConfig;
pub use error::{Error, Result};
pub use models::{ConversationRef, ConversationSummary, Message, MessageDraft, MessageId};
pub use services::{ChatServices, ChatSession, SendError};
pub use state::{LoadState, SendState};
pub use store::{ChatStore, MemoryChatStore};
pub use sync::{BlockList, ConversationAggregator, MessageReconciler};

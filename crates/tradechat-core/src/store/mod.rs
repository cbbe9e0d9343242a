//! Capability interface for the external chat store.
//!
//! The real transport is a hosted key-value/document store. This module only
//! fixes the shape of the calls the chat layer makes, plus the streaming
//! [`Subscription`] handle used for live deltas.

mod memory;

pub use memory::MemoryChatStore;

use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::{
    ConversationRef, ConversationSummary, Message, MessageId, NewMessage, SummaryPatch,
};

/// Bounds for a key-ordered page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    /// Inclusive upper key bound; `None` means "newest".
    pub end_at: Option<MessageId>,
    pub limit: usize,
}

impl PageQuery {
    pub const fn latest(limit: usize) -> Self {
        Self {
            end_at: None,
            limit,
        }
    }

    pub const fn ending_at(end_at: MessageId, limit: usize) -> Self {
        Self {
            end_at: Some(end_at),
            limit,
        }
    }
}

/// A single child-level change in a remote collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildDelta<T> {
    Added(T),
    Changed(T),
    Removed(String),
}

/// Partial update for a message record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub report_count: Option<u32>,
}

/// Receiving half of a live listener.
///
/// Dropping or calling [`Subscription::stop`] detaches the listener; the
/// store prunes closed listeners on its next delivery.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

/// Sending half held by the store.
pub type SubscriptionSender<T> = mpsc::UnboundedSender<T>;

impl<T> Subscription<T> {
    /// Create a connected sender/subscription pair.
    pub fn channel() -> (SubscriptionSender<T>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }

    /// Wait for the next event; `None` once the store side is gone or stopped.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Take every already-delivered event.
    pub fn drain(&mut self) -> Vec<T> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }

    /// Detach from the store. Events already queued are discarded.
    pub fn stop(&mut self) {
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }
}

/// Operations the chat layer needs from the backing store.
#[allow(async_fn_in_trait)]
pub trait ChatStore {
    /// Up to `query.limit` messages ordered by key ascending, optionally ending at `query.end_at` (inclusive).
    async fn fetch_page(&self, conversation: &ConversationRef, query: PageQuery)
        -> Result<Vec<Message>>;

    /// Listen for messages appended after the subscription starts.
    async fn subscribe_to_new(&self, conversation: &ConversationRef)
        -> Result<Subscription<Message>>;

    /// Listen for added/changed/removed messages in a conversation.
    async fn subscribe_to_message_changes(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Subscription<ChildDelta<Message>>>;

    /// Listen for summary deltas in `owner_id`'s inbox. Existing children are
    /// delivered first as `Added` events.
    async fn subscribe_to_child_deltas(
        &self,
        owner_id: &str,
    ) -> Result<Subscription<ChildDelta<ConversationSummary>>>;

    /// Append a message; the store assigns its key.
    async fn write_message(&self, conversation: &ConversationRef, message: NewMessage)
        -> Result<Message>;

    async fn update_message(
        &self,
        conversation: &ConversationRef,
        id: &MessageId,
        patch: MessagePatch,
    ) -> Result<()>;

    async fn remove_message(&self, conversation: &ConversationRef, id: &MessageId) -> Result<()>;

    /// Upsert `owner_id`'s summary for `partner_id`.
    async fn update_summary(&self, owner_id: &str, partner_id: &str, patch: SummaryPatch)
        -> Result<()>;

    async fn remove_summary(&self, owner_id: &str, partner_id: &str) -> Result<()>;

    /// Refer a user to the moderation authority.
    async fn request_ban(&self, user_id: &str, reason: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscription_drains_queued_events() {
        let (sender, mut subscription) = Subscription::channel();
        sender.send(1).unwrap();
        sender.send(2).unwrap();

        assert_eq!(subscription.drain(), vec![1, 2]);
        assert_eq!(subscription.try_next(), None);
    }

    #[tokio::test]
    async fn stopped_subscription_rejects_new_events() {
        let (sender, mut subscription) = Subscription::channel();
        sender.send(1).unwrap();
        subscription.stop();

        assert!(sender.send(2).is_err());
        assert_eq!(subscription.next().await, None);
    }
}

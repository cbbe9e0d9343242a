//! In-process store used by tests and the CLI replay tool.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{ChatStore, ChildDelta, MessagePatch, PageQuery, Subscription, SubscriptionSender};
use crate::error::{Error, Result};
use crate::models::{
    ConversationRef, ConversationSummary, Message, MessageId, NewMessage, SummaryPatch,
};

/// A recorded summary write, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryWrite {
    pub owner_id: String,
    pub partner_id: String,
    pub patch: SummaryPatch,
}

#[derive(Default)]
struct Inner {
    messages: HashMap<String, BTreeMap<MessageId, Message>>,
    new_listeners: HashMap<String, Vec<SubscriptionSender<Message>>>,
    change_listeners: HashMap<String, Vec<SubscriptionSender<ChildDelta<Message>>>>,
    summaries: HashMap<String, BTreeMap<String, ConversationSummary>>,
    summary_listeners: HashMap<String, Vec<SubscriptionSender<ChildDelta<ConversationSummary>>>>,
    summary_writes: Vec<SummaryWrite>,
    ban_requests: Vec<(String, String)>,
    page_fetches: usize,
    message_writes: usize,
    failing: bool,
}

/// Thread-safe in-memory [`ChatStore`].
#[derive(Clone, Default)]
pub struct MemoryChatStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub async fn set_failing(&self, failing: bool) {
        self.inner.lock().await.failing = failing;
    }

    /// Seed history without notifying listeners.
    pub async fn seed_messages(
        &self,
        conversation: &ConversationRef,
        messages: impl IntoIterator<Item = Message>,
    ) {
        let mut inner = self.inner.lock().await;
        let log = inner
            .messages
            .entry(conversation.messages_path())
            .or_default();
        for message in messages {
            log.insert(message.id.clone(), message);
        }
    }

    /// Append a message as another client would, notifying listeners.
    pub async fn push_message(&self, conversation: &ConversationRef, message: Message) {
        let mut inner = self.inner.lock().await;
        inner.insert_and_notify(&conversation.messages_path(), message);
    }

    /// Seed or replace a summary as the remote side would, notifying listeners.
    pub async fn put_summary(&self, owner_id: &str, summary: ConversationSummary) {
        let mut inner = self.inner.lock().await;
        let partner_id = summary.partner_or_group_id.clone();
        let existed = inner
            .summaries
            .entry(owner_id.to_string())
            .or_default()
            .insert(partner_id, summary.clone())
            .is_some();
        let delta = if existed {
            ChildDelta::Changed(summary)
        } else {
            ChildDelta::Added(summary)
        };
        inner.notify_summary(owner_id, &delta);
    }

    pub async fn messages(&self, conversation: &ConversationRef) -> Vec<Message> {
        let inner = self.inner.lock().await;
        inner
            .messages
            .get(&conversation.messages_path())
            .map(|log| log.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn summary(&self, owner_id: &str, partner_id: &str) -> Option<ConversationSummary> {
        let inner = self.inner.lock().await;
        inner
            .summaries
            .get(owner_id)
            .and_then(|summaries| summaries.get(partner_id))
            .cloned()
    }

    pub async fn summary_writes(&self) -> Vec<SummaryWrite> {
        self.inner.lock().await.summary_writes.clone()
    }

    pub async fn ban_requests(&self) -> Vec<(String, String)> {
        self.inner.lock().await.ban_requests.clone()
    }

    pub async fn page_fetches(&self) -> usize {
        self.inner.lock().await.page_fetches
    }

    pub async fn message_writes(&self) -> usize {
        self.inner.lock().await.message_writes
    }
}

impl Inner {
    fn check_available(&self) -> Result<()> {
        if self.failing {
            Err(Error::Store("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn insert_and_notify(&mut self, path: &str, message: Message) {
        let existed = self
            .messages
            .entry(path.to_string())
            .or_default()
            .insert(message.id.clone(), message.clone())
            .is_some();

        if let Some(listeners) = self.change_listeners.get_mut(path) {
            let delta = if existed {
                ChildDelta::Changed(message.clone())
            } else {
                ChildDelta::Added(message.clone())
            };
            listeners.retain(|listener| listener.send(delta.clone()).is_ok());
        }
        if !existed {
            if let Some(listeners) = self.new_listeners.get_mut(path) {
                listeners.retain(|listener| listener.send(message.clone()).is_ok());
            }
        }
    }

    fn notify_summary(&mut self, owner_id: &str, delta: &ChildDelta<ConversationSummary>) {
        if let Some(listeners) = self.summary_listeners.get_mut(owner_id) {
            listeners.retain(|listener| listener.send(delta.clone()).is_ok());
        }
    }
}

impl ChatStore for MemoryChatStore {
    async fn fetch_page(
        &self,
        conversation: &ConversationRef,
        query: PageQuery,
    ) -> Result<Vec<Message>> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        inner.page_fetches += 1;

        let Some(log) = inner.messages.get(&conversation.messages_path()) else {
            return Ok(Vec::new());
        };
        let mut page: Vec<Message> = log
            .iter()
            .rev()
            .filter(|(id, _)| query.end_at.as_ref().map_or(true, |end| *id <= end))
            .take(query.limit)
            .map(|(_, message)| message.clone())
            .collect();
        page.reverse();
        Ok(page)
    }

    async fn subscribe_to_new(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Subscription<Message>> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        let (sender, subscription) = Subscription::channel();
        inner
            .new_listeners
            .entry(conversation.messages_path())
            .or_default()
            .push(sender);
        Ok(subscription)
    }

    async fn subscribe_to_message_changes(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Subscription<ChildDelta<Message>>> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        let (sender, subscription) = Subscription::channel();
        inner
            .change_listeners
            .entry(conversation.messages_path())
            .or_default()
            .push(sender);
        Ok(subscription)
    }

    async fn subscribe_to_child_deltas(
        &self,
        owner_id: &str,
    ) -> Result<Subscription<ChildDelta<ConversationSummary>>> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        let (sender, subscription) = Subscription::channel();
        if let Some(existing) = inner.summaries.get(owner_id) {
            for summary in existing.values() {
                // receiver is alive: we hold it
                let _ = sender.send(ChildDelta::Added(summary.clone()));
            }
        }
        inner
            .summary_listeners
            .entry(owner_id.to_string())
            .or_default()
            .push(sender);
        Ok(subscription)
    }

    async fn write_message(
        &self,
        conversation: &ConversationRef,
        message: NewMessage,
    ) -> Result<Message> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        inner.message_writes += 1;
        let message = message.into_message(MessageId::generate());
        inner.insert_and_notify(&conversation.messages_path(), message.clone());
        Ok(message)
    }

    async fn update_message(
        &self,
        conversation: &ConversationRef,
        id: &MessageId,
        patch: MessagePatch,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        let path = conversation.messages_path();
        let mut message = inner
            .messages
            .get(&path)
            .and_then(|log| log.get(id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("message {id}")))?;
        if let Some(report_count) = patch.report_count {
            message.report_count = report_count;
        }
        inner.insert_and_notify(&path, message);
        Ok(())
    }

    async fn remove_message(&self, conversation: &ConversationRef, id: &MessageId) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        let path = conversation.messages_path();
        let removed = inner
            .messages
            .get_mut(&path)
            .and_then(|log| log.remove(id))
            .is_some();
        if removed {
            if let Some(listeners) = inner.change_listeners.get_mut(&path) {
                let delta = ChildDelta::Removed(id.to_string());
                listeners.retain(|listener| listener.send(delta.clone()).is_ok());
            }
        }
        Ok(())
    }

    async fn update_summary(
        &self,
        owner_id: &str,
        partner_id: &str,
        patch: SummaryPatch,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        inner.summary_writes.push(SummaryWrite {
            owner_id: owner_id.to_string(),
            partner_id: partner_id.to_string(),
            patch: patch.clone(),
        });

        let summaries = inner.summaries.entry(owner_id.to_string()).or_default();
        let existed = summaries.contains_key(partner_id);
        let summary = summaries
            .entry(partner_id.to_string())
            .or_insert_with(|| ConversationSummary::new(partner_id));
        patch.apply(summary);
        let summary = summary.clone();

        let delta = if existed {
            ChildDelta::Changed(summary)
        } else {
            ChildDelta::Added(summary)
        };
        inner.notify_summary(owner_id, &delta);
        Ok(())
    }

    async fn remove_summary(&self, owner_id: &str, partner_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        let removed = inner
            .summaries
            .get_mut(owner_id)
            .and_then(|summaries| summaries.remove(partner_id))
            .is_some();
        if removed {
            inner.notify_summary(owner_id, &ChildDelta::Removed(partner_id.to_string()));
        }
        Ok(())
    }

    async fn request_ban(&self, user_id: &str, reason: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.check_available()?;
        tracing::info!(user = user_id, reason, "Ban requested");
        inner
            .ban_requests
            .push((user_id.to_string(), reason.to_string()));
        Ok(())
    }
}

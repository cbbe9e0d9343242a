//! Inbox summaries and the aggregate unread badge.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::Result;
use crate::models::{ConversationSummary, SummaryPatch};
use crate::store::{ChatStore, ChildDelta, Subscription};
use crate::sync::BlockList;

/// Mirrors a user's conversation summaries from child-level deltas.
///
/// There is no bulk fetch: the summary listener replays existing children as
/// `Added` events, so the first drained batch populates the map.
pub struct ConversationAggregator<S> {
    store: Arc<S>,
    owner_id: String,
    block_list: BlockList,
    summaries: HashMap<String, ConversationSummary>,
    active: Option<String>,
    populated: bool,
    total: watch::Sender<u64>,
    deltas: Option<Subscription<ChildDelta<ConversationSummary>>>,
}

impl<S: ChatStore> ConversationAggregator<S> {
    pub fn new(store: Arc<S>, owner_id: impl Into<String>, block_list: BlockList) -> Self {
        let (total, _) = watch::channel(0);
        Self {
            store,
            owner_id: owner_id.into(),
            block_list,
            summaries: HashMap::new(),
            active: None,
            populated: false,
            total,
            deltas: None,
        }
    }

    /// Receiver for the aggregate unread total (tab badge).
    pub fn subscribe_total(&self) -> watch::Receiver<u64> {
        self.total.subscribe()
    }

    pub fn unread_total(&self) -> u64 {
        *self.total.borrow()
    }

    pub fn summary(&self, partner_id: &str) -> Option<&ConversationSummary> {
        self.summaries.get(partner_id)
    }

    /// Summaries sorted by most recent message first.
    pub fn summaries(&self) -> Vec<&ConversationSummary> {
        let mut summaries: Vec<_> = self.summaries.values().collect();
        summaries.sort_by(|a, b| {
            b.last_message_timestamp
                .cmp(&a.last_message_timestamp)
                .then_with(|| a.partner_or_group_id.cmp(&b.partner_or_group_id))
        });
        summaries
    }

    /// Whether the first batch of deltas has arrived.
    pub const fn is_populated(&self) -> bool {
        self.populated
    }

    pub async fn attach(&mut self) -> Result<()> {
        if self.deltas.is_none() {
            self.deltas = Some(self.store.subscribe_to_child_deltas(&self.owner_id).await?);
            tracing::debug!(owner = %self.owner_id, "Attached summary listener");
        }
        Ok(())
    }

    pub fn detach(&mut self) {
        if let Some(mut deltas) = self.deltas.take() {
            deltas.stop();
        }
    }

    /// Apply every delta already delivered.
    pub async fn pump(&mut self) -> usize {
        let batch = self
            .deltas
            .as_mut()
            .map(Subscription::drain)
            .unwrap_or_default();
        let count = batch.len();
        for delta in batch {
            self.apply(delta).await;
        }
        if count > 0 && !self.populated {
            self.populated = true;
            tracing::info!(owner = %self.owner_id, conversations = self.summaries.len(), "Inbox populated");
        }
        count
    }

    /// Wait for one delta and apply it. Returns `false` once detached.
    pub async fn next_event(&mut self) -> bool {
        let Some(deltas) = self.deltas.as_mut() else {
            return false;
        };
        let Some(delta) = deltas.next().await else {
            return false;
        };
        self.apply(delta).await;
        self.populated = true;
        true
    }

    /// Upsert or delete one summary and republish the total.
    ///
    /// Nonzero unread counts from blocked users, or for the conversation
    /// being viewed, are zeroed upstream and recorded as 0.
    pub async fn apply(&mut self, delta: ChildDelta<ConversationSummary>) {
        match delta {
            ChildDelta::Added(mut summary) | ChildDelta::Changed(mut summary) => {
                let partner_id = summary.partner_or_group_id.clone();
                if summary.unread_count > 0 && self.should_zero(&partner_id) {
                    if let Err(error) = self
                        .store
                        .update_summary(&self.owner_id, &partner_id, SummaryPatch::mark_read())
                        .await
                    {
                        tracing::warn!(partner = %partner_id, "Failed to zero unread count: {error}");
                    }
                    summary.unread_count = 0;
                }
                self.summaries.insert(partner_id, summary);
            }
            ChildDelta::Removed(partner_id) => {
                self.summaries.remove(&partner_id);
            }
        }
        self.publish_total();
    }

    /// Record that the viewer is looking at `partner_id` and clear its badge.
    pub async fn set_active(&mut self, partner_id: Option<&str>) {
        self.active = partner_id.map(ToString::to_string);
        if let Some(partner_id) = partner_id {
            self.mark_read(partner_id).await;
        }
    }

    /// Zero a conversation's unread count locally and upstream.
    pub async fn mark_read(&mut self, partner_id: &str) {
        let Some(summary) = self.summaries.get_mut(partner_id) else {
            return;
        };
        if summary.unread_count == 0 {
            return;
        }
        summary.unread_count = 0;
        self.publish_total();
        if let Err(error) = self
            .store
            .update_summary(&self.owner_id, partner_id, SummaryPatch::mark_read())
            .await
        {
            tracing::warn!(partner = partner_id, "Failed to mark conversation read: {error}");
        }
    }

    /// Delete a conversation from the inbox.
    pub async fn delete(&mut self, partner_id: &str) -> Result<()> {
        self.store.remove_summary(&self.owner_id, partner_id).await?;
        self.summaries.remove(partner_id);
        self.publish_total();
        Ok(())
    }

    fn should_zero(&self, partner_id: &str) -> bool {
        self.block_list.contains(partner_id) || self.active.as_deref() == Some(partner_id)
    }

    fn publish_total(&self) {
        let total: u64 = self
            .summaries
            .values()
            .map(|summary| u64::from(summary.unread_count))
            .sum();
        self.total.send_if_modified(|current| {
            let changed = *current != total;
            *current = total;
            changed
        });
    }
}

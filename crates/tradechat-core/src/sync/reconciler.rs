//! Per-conversation message list reconciliation.
//!
//! Keeps a de-duplicated, newest-first list of messages fed from three
//! sources: the initial page, older-history pages, and the live listener.
//! New messages arriving while the viewer is scrolled away from the live
//! edge are parked in a pending buffer and flushed when they return.
//!
//! Fetches are split into `begin_*`/`complete_*` pairs so a controller can
//! run the store call outside the reconciler's borrow. Each ticket carries
//! the generation it was issued under; completions from before a
//! [`MessageReconciler::detach`] or [`MessageReconciler::reset`] are dropped.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::ChatConfig;
use crate::error::Result;
use crate::models::{ConversationRef, Message, MessageId};
use crate::state::LoadState;
use crate::store::{ChatStore, ChildDelta, PageQuery, Subscription};
use crate::sync::BlockList;

/// An outstanding page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    generation: u64,
    query: PageQuery,
}

impl PageTicket {
    pub const fn query(&self) -> &PageQuery {
        &self.query
    }
}

/// What happened to a live message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Shown immediately at the live edge.
    Inserted,
    /// Parked until the viewer returns to the live edge.
    Buffered,
    /// Already held.
    Duplicate,
    /// Sender is blocked.
    Blocked,
}

/// Message list controller for one conversation.
pub struct MessageReconciler<S> {
    store: Arc<S>,
    conversation: ConversationRef,
    block_list: BlockList,
    initial_page: usize,
    page_size: usize,
    live_edge_threshold: f64,
    state: LoadState,
    messages: Vec<Message>,
    known_ids: HashSet<MessageId>,
    pending: Vec<Message>,
    cursor: Option<MessageId>,
    at_live_edge: bool,
    generation: u64,
    live: Option<Subscription<Message>>,
    changes: Option<Subscription<ChildDelta<Message>>>,
}

impl<S: ChatStore> MessageReconciler<S> {
    pub fn new(
        store: Arc<S>,
        conversation: ConversationRef,
        config: &ChatConfig,
        block_list: BlockList,
    ) -> Self {
        let kind = conversation.kind();
        Self {
            store,
            conversation,
            block_list,
            initial_page: config.initial_page(kind),
            page_size: config.page_size(kind),
            live_edge_threshold: config.live_edge_threshold,
            state: LoadState::Empty,
            messages: Vec::new(),
            known_ids: HashSet::new(),
            pending: Vec::new(),
            cursor: None,
            at_live_edge: true,
            generation: 0,
            live: None,
            changes: None,
        }
    }

    pub const fn conversation(&self) -> &ConversationRef {
        &self.conversation
    }

    pub const fn state(&self) -> LoadState {
        self.state
    }

    /// Visible messages, newest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages waiting for the viewer to return to the live edge, in arrival order.
    pub fn pending(&self) -> &[Message] {
        &self.pending
    }

    pub const fn is_at_live_edge(&self) -> bool {
        self.at_live_edge
    }

    /// Whether another "load more" could return anything.
    pub const fn has_more_history(&self) -> bool {
        self.cursor.is_some()
    }

    pub const fn is_attached(&self) -> bool {
        self.live.is_some()
    }

    /// Start listening for live messages (screen gained focus).
    pub async fn attach(&mut self) -> Result<()> {
        if self.is_attached() {
            return Ok(());
        }
        let live = self.store.subscribe_to_new(&self.conversation).await?;
        let changes = self
            .store
            .subscribe_to_message_changes(&self.conversation)
            .await?;
        self.live = Some(live);
        self.changes = Some(changes);
        tracing::debug!(path = %self.conversation.messages_path(), "Attached live listeners");
        Ok(())
    }

    /// Stop listening (screen lost focus). Outstanding page requests are abandoned.
    pub fn detach(&mut self) {
        if let Some(mut live) = self.live.take() {
            live.stop();
        }
        if let Some(mut changes) = self.changes.take() {
            changes.stop();
        }
        self.generation += 1;
        self.state = match self.state {
            LoadState::Loading => LoadState::Empty,
            LoadState::Paginating => LoadState::Ready,
            other => other,
        };
        tracing::debug!(path = %self.conversation.messages_path(), "Detached live listeners");
    }

    /// Drop all held messages and return to `Empty`.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = LoadState::Empty;
        self.messages.clear();
        self.known_ids.clear();
        self.pending.clear();
        self.cursor = None;
        self.at_live_edge = true;
    }

    /// Fetch and merge the newest page.
    pub async fn load_initial(&mut self) {
        let Some(ticket) = self.begin_initial_load() else {
            return;
        };
        let result = self
            .store
            .fetch_page(&self.conversation, ticket.query.clone())
            .await;
        self.complete_initial_load(&ticket, result);
    }

    /// Fetch and merge the next page of older history.
    pub async fn load_older(&mut self) {
        let Some(ticket) = self.begin_load_older() else {
            return;
        };
        let result = self
            .store
            .fetch_page(&self.conversation, ticket.query.clone())
            .await;
        self.complete_load_older(&ticket, result);
    }

    /// Apply every event the listeners have already delivered.
    pub fn pump(&mut self) -> usize {
        let live = self.live.as_mut().map(Subscription::drain).unwrap_or_default();
        let changes = self
            .changes
            .as_mut()
            .map(Subscription::drain)
            .unwrap_or_default();
        let count = live.len() + changes.len();

        for message in live {
            self.ingest_live(message);
        }
        for delta in changes {
            self.apply_change(delta);
        }
        count
    }

    /// Wait for one listener event and apply it. Returns `false` once detached.
    pub async fn next_event(&mut self) -> bool {
        let (Some(live), Some(changes)) = (self.live.as_mut(), self.changes.as_mut()) else {
            return false;
        };
        tokio::select! {
            Some(message) = live.next() => {
                self.ingest_live(message);
                true
            }
            Some(delta) = changes.next() => {
                self.apply_change(delta);
                true
            }
            else => false,
        }
    }
}

impl<S> MessageReconciler<S> {
    /// Mark the initial fetch in flight. `None` while another fetch is outstanding.
    pub fn begin_initial_load(&mut self) -> Option<PageTicket> {
        if matches!(self.state, LoadState::Loading | LoadState::Paginating) {
            return None;
        }
        self.state = LoadState::Loading;
        Some(PageTicket {
            generation: self.generation,
            query: PageQuery::latest(self.initial_page),
        })
    }

    /// Merge the initial page. Failures leave the list empty without surfacing.
    pub fn complete_initial_load(&mut self, ticket: &PageTicket, result: Result<Vec<Message>>) {
        if ticket.generation != self.generation {
            tracing::debug!("Dropping stale initial page");
            return;
        }
        match result {
            Ok(page) => {
                self.cursor = page.first().map(|message| message.id.clone());
                let added = self.merge_history(page);
                self.state = LoadState::Ready;
                tracing::info!(
                    path = %self.conversation.messages_path(),
                    added,
                    "Initial messages loaded"
                );
            }
            Err(error) => {
                self.state = LoadState::Empty;
                tracing::warn!(
                    path = %self.conversation.messages_path(),
                    "Initial message load failed: {error}"
                );
            }
        }
    }

    /// Mark an older-history fetch in flight.
    ///
    /// Returns `None` while any fetch is outstanding, before the initial load,
    /// or after history is exhausted.
    pub fn begin_load_older(&mut self) -> Option<PageTicket> {
        if self.state != LoadState::Ready {
            return None;
        }
        let cursor = self.cursor.clone()?;
        self.state = LoadState::Paginating;
        Some(PageTicket {
            generation: self.generation,
            // end bound is inclusive, so ask for one extra to fill the page
            query: PageQuery::ending_at(cursor, self.page_size + 1),
        })
    }

    /// Merge an older page. A page with nothing new ends pagination.
    pub fn complete_load_older(&mut self, ticket: &PageTicket, result: Result<Vec<Message>>) {
        if ticket.generation != self.generation {
            tracing::debug!("Dropping stale history page");
            return;
        }
        self.state = LoadState::Ready;
        match result {
            Ok(page) => {
                let unseen = page
                    .iter()
                    .filter(|message| !self.known_ids.contains(&message.id))
                    .count();
                if unseen == 0 {
                    self.cursor = None;
                    tracing::info!(
                        path = %self.conversation.messages_path(),
                        "Reached start of history"
                    );
                    return;
                }
                self.cursor = page.first().map(|message| message.id.clone());
                let added = self.merge_history(page);
                tracing::debug!(added, "Older messages merged");
            }
            Err(error) => {
                tracing::warn!(
                    path = %self.conversation.messages_path(),
                    "Loading older messages failed: {error}"
                );
            }
        }
    }

    /// Route a newly appended message to the list or the pending buffer.
    pub fn ingest_live(&mut self, message: Message) -> IngestOutcome {
        if self.block_list.contains(&message.sender_id) {
            tracing::debug!(id = %message.id, "Dropping live message from blocked sender");
            return IngestOutcome::Blocked;
        }
        if !self.known_ids.insert(message.id.clone()) {
            tracing::debug!(id = %message.id, "Dropping duplicate live message");
            return IngestOutcome::Duplicate;
        }
        if self.at_live_edge {
            self.messages.insert(0, message);
            self.sort();
            IngestOutcome::Inserted
        } else {
            self.pending.push(message);
            IngestOutcome::Buffered
        }
    }

    /// Apply an update or removal of an existing message.
    ///
    /// `Added` deltas are ignored; new messages come through [`Self::ingest_live`].
    pub fn apply_change(&mut self, delta: ChildDelta<Message>) {
        match delta {
            ChildDelta::Added(_) => {}
            ChildDelta::Changed(message) => {
                if self.block_list.contains(&message.sender_id) {
                    self.remove(message.id.as_str());
                    return;
                }
                let slot = self
                    .messages
                    .iter_mut()
                    .chain(self.pending.iter_mut())
                    .find(|held| held.id == message.id);
                if let Some(held) = slot {
                    *held = message;
                    self.sort();
                }
            }
            ChildDelta::Removed(id) => {
                self.remove(&id);
            }
        }
    }

    /// Update the viewer's distance from the newest message.
    ///
    /// Returning to the live edge flushes the pending buffer.
    pub fn set_scroll_offset(&mut self, offset: f64) -> usize {
        let was_at_edge = self.at_live_edge;
        self.at_live_edge = offset <= self.live_edge_threshold;
        if self.at_live_edge && !was_at_edge {
            self.flush_pending()
        } else {
            0
        }
    }

    /// Prepend every pending message in arrival order.
    pub fn flush_pending(&mut self) -> usize {
        let flushed = self.pending.len();
        if flushed == 0 {
            return 0;
        }
        let pending = std::mem::take(&mut self.pending);
        self.messages.splice(0..0, pending.into_iter().rev());
        self.sort();
        tracing::debug!(flushed, "Flushed pending messages");
        flushed
    }

    /// Remove messages from senders blocked since they were ingested.
    pub fn purge_blocked(&mut self) -> usize {
        let before = self.messages.len() + self.pending.len();
        let block_list = &self.block_list;
        self.messages
            .retain(|message| !block_list.contains(&message.sender_id));
        self.pending
            .retain(|message| !block_list.contains(&message.sender_id));
        before - self.messages.len() - self.pending.len()
    }

    /// Drop a message locally (soft delete or report removal).
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.messages.len() + self.pending.len();
        self.messages.retain(|message| message.id.as_str() != id);
        self.pending.retain(|message| message.id.as_str() != id);
        before != self.messages.len() + self.pending.len()
    }

    fn merge_history(&mut self, page: Vec<Message>) -> usize {
        let mut added = 0;
        for message in page {
            // blocked messages are recorded as seen but never shown
            if !self.known_ids.insert(message.id.clone()) {
                continue;
            }
            if !self.block_list.contains(&message.sender_id) {
                self.messages.push(message);
                added += 1;
            }
        }
        self.sort();
        added
    }

    fn sort(&mut self) {
        self.messages
            .sort_by_key(|message| Reverse(message.sort_timestamp()));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::Error;
    use crate::models::NewMessage;
    use crate::store::MemoryChatStore;

    fn message(id: &str, sender: &str, timestamp: i64) -> Message {
        NewMessage {
            sender_id: sender.to_string(),
            text: format!("text {id}"),
            timestamp,
            attachments: Vec::new(),
            structured_items: Vec::new(),
            reply_to_id: None,
            strike_count_at_send: None,
        }
        .into_message(MessageId::new(id))
    }

    fn history(count: i64) -> Vec<Message> {
        (1..=count)
            .map(|n| message(&format!("m{n:03}"), "alice", n * 1000))
            .collect()
    }

    fn ids(messages: &[Message]) -> Vec<String> {
        messages.iter().map(|message| message.id.to_string()).collect()
    }

    fn is_sorted_desc(messages: &[Message]) -> bool {
        messages
            .windows(2)
            .all(|pair| pair[0].sort_timestamp() >= pair[1].sort_timestamp())
    }

    async fn setup(
        count: i64,
        blocked: &[&str],
    ) -> (MemoryChatStore, MessageReconciler<MemoryChatStore>) {
        let store = MemoryChatStore::new();
        let room = ConversationRef::group("trading");
        store.seed_messages(&room, history(count)).await;
        let reconciler = MessageReconciler::new(
            Arc::new(store.clone()),
            room,
            &ChatConfig::default(),
            BlockList::from_ids(blocked.iter().copied()),
        );
        (store, reconciler)
    }

    #[tokio::test]
    async fn initial_load_fetches_newest_page_newest_first() {
        let (_, mut reconciler) = setup(12, &[]).await;
        reconciler.load_initial().await;

        assert_eq!(reconciler.state(), LoadState::Ready);
        assert_eq!(
            ids(reconciler.messages()),
            vec!["m012", "m011", "m010", "m009", "m008"]
        );
        assert!(reconciler.has_more_history());
    }

    #[tokio::test]
    async fn initial_load_failure_degrades_to_empty() {
        let (store, mut reconciler) = setup(3, &[]).await;
        store.set_failing(true).await;
        reconciler.load_initial().await;

        assert_eq!(reconciler.state(), LoadState::Empty);
        assert!(reconciler.messages().is_empty());
    }

    #[tokio::test]
    async fn pagination_appends_older_without_duplicates() {
        let (_, mut reconciler) = setup(30, &[]).await;
        reconciler.load_initial().await;
        reconciler.load_older().await;

        let held = ids(reconciler.messages());
        assert_eq!(held.len(), 15);
        assert_eq!(held.first().map(String::as_str), Some("m030"));
        assert_eq!(held.last().map(String::as_str), Some("m016"));
        let unique: HashSet<_> = held.iter().collect();
        assert_eq!(unique.len(), held.len());
    }

    #[tokio::test]
    async fn pagination_terminates_after_empty_page() {
        let (store, mut reconciler) = setup(5, &[]).await;
        reconciler.load_initial().await;
        assert_eq!(store.page_fetches().await, 1);

        // only the inclusive cursor comes back: nothing new
        reconciler.load_older().await;
        assert!(!reconciler.has_more_history());
        assert_eq!(store.page_fetches().await, 2);

        reconciler.load_older().await;
        assert_eq!(store.page_fetches().await, 2);
        assert_eq!(reconciler.state(), LoadState::Ready);

        reconciler.reset();
        reconciler.load_initial().await;
        assert!(reconciler.has_more_history());
    }

    #[tokio::test]
    async fn pagination_ends_when_oldest_sender_is_blocked() {
        let store = MemoryChatStore::new();
        let room = ConversationRef::group("trading");
        let mut seeded = vec![message("m001", "spammer", 1000)];
        seeded.extend((2..=5).map(|n| message(&format!("m{n:03}"), "alice", n * 1000)));
        store.seed_messages(&room, seeded).await;
        let mut reconciler = MessageReconciler::new(
            Arc::new(store.clone()),
            room,
            &ChatConfig::default(),
            BlockList::from_ids(["spammer"]),
        );

        reconciler.load_initial().await;
        for _ in 0..5 {
            reconciler.load_older().await;
        }

        assert!(!reconciler.has_more_history());
        assert_eq!(store.page_fetches().await, 2);
        assert_eq!(
            ids(reconciler.messages()),
            vec!["m005", "m004", "m003", "m002"]
        );
    }

    #[test]
    fn pagination_is_serialized() {
        let store = Arc::new(MemoryChatStore::new());
        let mut reconciler = MessageReconciler::new(
            store,
            ConversationRef::group("trading"),
            &ChatConfig::default(),
            BlockList::new(),
        );
        let ticket = reconciler.begin_initial_load().unwrap();
        reconciler.complete_initial_load(&ticket, Ok(history(5)));

        let first = reconciler.begin_load_older();
        assert!(first.is_some());
        assert!(reconciler.state().is_paginating());
        assert_eq!(reconciler.begin_load_older(), None);
        assert_eq!(reconciler.begin_initial_load(), None);
    }

    #[test]
    fn pagination_failure_keeps_list_and_cursor() {
        let store = Arc::new(MemoryChatStore::new());
        let mut reconciler = MessageReconciler::new(
            store,
            ConversationRef::group("trading"),
            &ChatConfig::default(),
            BlockList::new(),
        );
        let ticket = reconciler.begin_initial_load().unwrap();
        reconciler.complete_initial_load(&ticket, Ok(history(5)));
        let before = ids(reconciler.messages());

        let ticket = reconciler.begin_load_older().unwrap();
        reconciler.complete_load_older(&ticket, Err(Error::Store("offline".to_string())));

        assert_eq!(ids(reconciler.messages()), before);
        assert!(reconciler.has_more_history());
        assert_eq!(reconciler.state(), LoadState::Ready);
    }

    #[test]
    fn stale_completion_after_detach_is_ignored() {
        let store = Arc::new(MemoryChatStore::new());
        let mut reconciler = MessageReconciler::new(
            store,
            ConversationRef::group("trading"),
            &ChatConfig::default(),
            BlockList::new(),
        );
        let ticket = reconciler.begin_initial_load().unwrap();
        reconciler.detach();
        reconciler.complete_initial_load(&ticket, Ok(history(5)));

        assert!(reconciler.messages().is_empty());
        assert_eq!(reconciler.state(), LoadState::Empty);
    }

    #[tokio::test]
    async fn live_and_history_overlap_yields_one_copy() {
        let (_, mut reconciler) = setup(5, &[]).await;
        reconciler.load_initial().await;

        let overlap = message("m005", "alice", 5000);
        assert_eq!(reconciler.ingest_live(overlap.clone()), IngestOutcome::Duplicate);
        assert_eq!(reconciler.ingest_live(overlap), IngestOutcome::Duplicate);

        let fresh = message("m006", "alice", 6000);
        assert_eq!(reconciler.ingest_live(fresh.clone()), IngestOutcome::Inserted);
        assert_eq!(reconciler.ingest_live(fresh), IngestOutcome::Duplicate);

        let count = reconciler
            .messages()
            .iter()
            .filter(|held| held.id.as_str() == "m006")
            .count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn order_holds_across_interleaved_sources() {
        let (_, mut reconciler) = setup(20, &[]).await;
        reconciler.ingest_live(message("z-late", "bob", 2500));
        reconciler.load_initial().await;
        reconciler.ingest_live(message("m021", "bob", 21_000));
        reconciler.ingest_live(message("m020b", "bob", 19_500));
        reconciler.load_older().await;
        let mut undated = message("m000", "bob", 0);
        undated.timestamp = None;
        reconciler.ingest_live(undated);

        assert!(is_sorted_desc(reconciler.messages()));
        assert_eq!(
            reconciler.messages().last().map(|m| m.id.as_str()),
            Some("m000")
        );
    }

    #[tokio::test]
    async fn pending_buffer_flushes_in_arrival_order() {
        let (_, mut reconciler) = setup(5, &[]).await;
        reconciler.load_initial().await;
        let before = ids(reconciler.messages());

        assert_eq!(reconciler.set_scroll_offset(600.0), 0);
        for n in 6..=8 {
            let outcome = reconciler.ingest_live(message(&format!("m{n:03}"), "bob", n * 1000));
            assert_eq!(outcome, IngestOutcome::Buffered);
        }
        assert_eq!(ids(reconciler.messages()), before);
        assert_eq!(reconciler.pending().len(), 3);

        assert_eq!(reconciler.set_scroll_offset(10.0), 3);

        let mut expected = vec!["m008".to_string(), "m007".to_string(), "m006".to_string()];
        expected.extend(before);
        assert_eq!(ids(reconciler.messages()), expected);
        assert!(reconciler.pending().is_empty());
    }

    #[tokio::test]
    async fn blocked_senders_are_excluded_everywhere() {
        let store = MemoryChatStore::new();
        let room = ConversationRef::group("trading");
        store
            .seed_messages(
                &room,
                vec![
                    message("m001", "alice", 1000),
                    message("m002", "spammer", 2000),
                    message("m003", "alice", 3000),
                ],
            )
            .await;
        let block_list = BlockList::from_ids(["spammer"]);
        let mut reconciler = MessageReconciler::new(
            Arc::new(store.clone()),
            room.clone(),
            &ChatConfig::default(),
            block_list.clone(),
        );
        reconciler.attach().await.unwrap();
        reconciler.load_initial().await;
        assert_eq!(ids(reconciler.messages()), vec!["m003", "m001"]);

        store.push_message(&room, message("m004", "spammer", 4000)).await;
        store.push_message(&room, message("m005", "bob", 5000)).await;
        reconciler.pump();
        assert_eq!(ids(reconciler.messages()), vec!["m005", "m003", "m001"]);

        block_list.block("bob");
        assert_eq!(reconciler.purge_blocked(), 1);
        assert_eq!(ids(reconciler.messages()), vec!["m003", "m001"]);
    }

    #[tokio::test]
    async fn change_listener_updates_and_removes() {
        let (store, mut reconciler) = setup(3, &[]).await;
        let room = reconciler.conversation().clone();
        reconciler.attach().await.unwrap();
        reconciler.load_initial().await;

        store
            .update_message(
                &room,
                &MessageId::new("m002"),
                crate::store::MessagePatch {
                    report_count: Some(1),
                },
            )
            .await
            .unwrap();
        store.remove_message(&room, &MessageId::new("m003")).await.unwrap();
        reconciler.pump();

        assert_eq!(ids(reconciler.messages()), vec!["m002", "m001"]);
        assert_eq!(reconciler.messages()[0].report_count, 1);
    }

    #[tokio::test]
    async fn detach_stops_live_delivery() {
        let (store, mut reconciler) = setup(3, &[]).await;
        let room = reconciler.conversation().clone();
        reconciler.attach().await.unwrap();
        reconciler.load_initial().await;
        reconciler.detach();
        assert!(!reconciler.is_attached());

        store.push_message(&room, message("m004", "bob", 4000)).await;
        assert_eq!(reconciler.pump(), 0);
        assert!(!reconciler.next_event().await);
        assert_eq!(reconciler.messages().len(), 3);
    }

    #[tokio::test]
    async fn next_event_applies_live_message() {
        let (store, mut reconciler) = setup(2, &[]).await;
        let room = reconciler.conversation().clone();
        reconciler.attach().await.unwrap();
        reconciler.load_initial().await;

        // one event on each listener: the new message and its change delta
        store.push_message(&room, message("m003", "bob", 3000)).await;
        assert!(reconciler.next_event().await);
        assert!(reconciler.next_event().await);
        assert_eq!(reconciler.messages()[0].id.as_str(), "m003");
        assert_eq!(reconciler.messages().len(), 3);
    }
}

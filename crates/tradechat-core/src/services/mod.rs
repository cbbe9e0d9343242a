//! Application-level service context.
//!
//! [`ChatServices`] owns the shared collaborators (store, uploader, ad
//! display, moderation rules, block list) and hands them to the
//! per-conversation controllers it builds.

mod ads;
mod session;
mod upload;

use std::sync::Arc;

pub use ads::{AdCompletion, AdContinuation, AdGate, InterstitialAds, NoAds};
pub use session::{ChatSession, ReportOutcome, SendError, SendReceipt};
pub use upload::{upload_all, AttachmentUploader, StaticUploader};

use crate::config::ChatConfig;
use crate::error::Result;
use crate::models::{ConversationRef, SenderProfile};
use crate::moderation::ModerationFilter;
use crate::store::ChatStore;
use crate::sync::{BlockList, ConversationAggregator, MessageReconciler};

/// Shared, cheaply clonable handles for one signed-in app instance.
pub struct ChatServices<S, U, A> {
    store: Arc<S>,
    uploader: Arc<U>,
    ads: Arc<A>,
    filter: Arc<ModerationFilter>,
    block_list: BlockList,
    config: ChatConfig,
}

impl<S, U, A> Clone for ChatServices<S, U, A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            uploader: Arc::clone(&self.uploader),
            ads: Arc::clone(&self.ads),
            filter: Arc::clone(&self.filter),
            block_list: self.block_list.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S, U, A> ChatServices<S, U, A> {
    /// Build the context after validating `config`.
    pub fn new(store: S, uploader: U, ads: A, config: ChatConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: Arc::new(store),
            uploader: Arc::new(uploader),
            ads: Arc::new(ads),
            filter: Arc::new(ModerationFilter::new()),
            block_list: BlockList::new(),
            config,
        })
    }

    #[must_use]
    pub fn with_block_list(mut self, block_list: BlockList) -> Self {
        self.block_list = block_list;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: ModerationFilter) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub const fn uploader(&self) -> &Arc<U> {
        &self.uploader
    }

    pub const fn ads(&self) -> &Arc<A> {
        &self.ads
    }

    pub const fn filter(&self) -> &Arc<ModerationFilter> {
        &self.filter
    }

    pub const fn block_list(&self) -> &BlockList {
        &self.block_list
    }

    pub const fn config(&self) -> &ChatConfig {
        &self.config
    }
}

impl<S: ChatStore, U, A> ChatServices<S, U, A> {
    /// Message list controller for a conversation.
    pub fn reconciler(&self, conversation: ConversationRef) -> MessageReconciler<S> {
        MessageReconciler::new(
            Arc::clone(&self.store),
            conversation,
            &self.config,
            self.block_list.clone(),
        )
    }

    /// Inbox controller for `owner_id`.
    pub fn aggregator(&self, owner_id: impl Into<String>) -> ConversationAggregator<S> {
        ConversationAggregator::new(Arc::clone(&self.store), owner_id, self.block_list.clone())
    }
}

impl<S, U, A> ChatServices<S, U, A>
where
    S: ChatStore,
    U: AttachmentUploader,
    A: InterstitialAds,
{
    /// Outbound controller for a conversation.
    pub fn session(
        &self,
        conversation: ConversationRef,
        sender: Option<SenderProfile>,
    ) -> ChatSession<S, U, A> {
        ChatSession::new(self, conversation, sender)
    }
}

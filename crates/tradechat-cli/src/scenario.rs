//! Scripted chat scenarios driven through the core controllers.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tradechat_core::models::{ConversationRef, ConversationSummary, Message, MessageId};
use tradechat_core::services::{NoAds, StaticUploader};
use tradechat_core::{BlockList, ChatConfig, ChatServices, ChatStore, MemoryChatStore};

use crate::error::CliError;

/// A recorded conversation plus the events to play against it.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Whose inbox the summaries belong to.
    pub viewer: String,
    pub conversation: ConversationRef,
    #[serde(default)]
    pub blocked: Vec<String>,
    /// Messages already in the store before the conversation opens.
    #[serde(default)]
    pub history: Vec<Message>,
    /// Inbox entries already in the store.
    #[serde(default)]
    pub summaries: Vec<ConversationSummary>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    InitialLoad,
    LoadOlder,
    Scroll { offset: f64 },
    Incoming { message: Message },
    Remove { id: MessageId },
    SummaryUpsert { summary: ConversationSummary },
    SummaryRemove { partner_id: String },
    Block { user_id: String },
    Unblock { user_id: String },
    MarkRead { partner_id: String },
}

/// Final state after a replay.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub state: String,
    pub messages: Vec<Message>,
    pub pending: Vec<Message>,
    pub has_more_history: bool,
    pub unread_total: u64,
    pub summaries: Vec<ConversationSummary>,
}

impl Scenario {
    pub fn from_json_str(payload: &str) -> Result<Self, CliError> {
        let scenario: Self = serde_json::from_str(payload)?;
        if scenario.viewer.trim().is_empty() {
            return Err(CliError::Scenario("viewer cannot be empty".to_string()));
        }
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        let payload = std::fs::read_to_string(path)?;
        Self::from_json_str(&payload)
    }
}

pub async fn replay(scenario: Scenario, config: ChatConfig) -> Result<ReplayReport, CliError> {
    let store = MemoryChatStore::new();
    let conversation = scenario.conversation;
    let viewer = scenario.viewer;
    store.seed_messages(&conversation, scenario.history).await;
    for summary in scenario.summaries {
        store.put_summary(&viewer, summary).await;
    }

    let services = ChatServices::new(
        store.clone(),
        StaticUploader::new("https://cdn.invalid"),
        NoAds,
        config,
    )?
    .with_block_list(BlockList::from_ids(scenario.blocked));
    let mut reconciler = services.reconciler(conversation.clone());
    let mut inbox = services.aggregator(viewer.clone());
    reconciler.attach().await?;
    inbox.attach().await?;
    inbox.pump().await;

    for (index, step) in scenario.steps.into_iter().enumerate() {
        tracing::debug!(step = index, ?step, "Replaying step");
        match step {
            Step::InitialLoad => reconciler.load_initial().await,
            Step::LoadOlder => reconciler.load_older().await,
            Step::Scroll { offset } => {
                reconciler.set_scroll_offset(offset);
            }
            Step::Incoming { message } => store.push_message(&conversation, message).await,
            Step::Remove { id } => store.remove_message(&conversation, &id).await?,
            Step::SummaryUpsert { summary } => store.put_summary(&viewer, summary).await,
            Step::SummaryRemove { partner_id } => {
                store.remove_summary(&viewer, &partner_id).await?;
            }
            Step::Block { user_id } => {
                services.block_list().block(&user_id);
                reconciler.purge_blocked();
            }
            Step::Unblock { user_id } => {
                services.block_list().unblock(&user_id);
            }
            Step::MarkRead { partner_id } => inbox.mark_read(&partner_id).await,
        }
        reconciler.pump();
        // corrective writes echo back as a second batch
        while inbox.pump().await > 0 {}
    }

    Ok(ReplayReport {
        state: format!("{:?}", reconciler.state()),
        messages: reconciler.messages().to_vec(),
        pending: reconciler.pending().to_vec(),
        has_more_history: reconciler.has_more_history(),
        unread_total: inbox.unread_total(),
        summaries: inbox.summaries().into_iter().cloned().collect(),
    })
}

//! Outbound chat flow for one open conversation.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use super::ads::{AdGate, InterstitialAds};
use super::upload::{upload_all, AttachmentUploader};
use super::ChatServices;
use crate::error::Error;
use crate::guard::{check_send_allowed, SendGuard, SendPermission, SendRejection};
use crate::models::{
    ConversationRef, Message, MessageDraft, MessageId, NewMessage, SenderProfile, SummaryPatch,
    UnreadUpdate,
};
use crate::moderation::{ModerationFilter, ModerationVerdict};
use crate::state::SendState;
use crate::store::{ChatStore, MessagePatch};
use crate::util::{truncate_preview, unix_millis_now};

const REPORT_REASON: &str = "Message reported by multiple users";

/// Why a send did not go through.
#[derive(Debug, Error)]
pub enum SendError {
    /// Refused before any network effect; the draft was left untouched.
    #[error(transparent)]
    Rejected(#[from] SendRejection),

    /// Upload or write failure after the draft was cleared.
    #[error("Could not send message. Please try again. ({0})")]
    Failed(#[from] Error),
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq)]
pub struct SendReceipt {
    pub message: Message,
    /// Attachments dropped because their upload failed.
    pub failed_uploads: usize,
    pub ad_shown: bool,
}

/// Result of reporting a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The report count was raised.
    Flagged { report_count: u32 },
    /// The threshold was reached: the message is gone and its sender referred for a ban.
    Removed,
}

/// Send, report, and delete operations bound to one conversation.
pub struct ChatSession<S, U, A> {
    store: Arc<S>,
    uploader: Arc<U>,
    ads: Arc<A>,
    filter: Arc<ModerationFilter>,
    conversation: ConversationRef,
    sender: Option<SenderProfile>,
    guard: SendGuard,
    ad_gate: AdGate,
    state: SendState,
    // dead once the send future holding it finishes or is dropped
    in_flight: Weak<()>,
    cooldown: Duration,
    preview_chars: usize,
    report_ban_threshold: u32,
    reported: HashSet<MessageId>,
}

impl<S, U, A> ChatSession<S, U, A>
where
    S: ChatStore,
    U: AttachmentUploader,
    A: InterstitialAds,
{
    pub fn new(
        services: &ChatServices<S, U, A>,
        conversation: ConversationRef,
        sender: Option<SenderProfile>,
    ) -> Self {
        let config = services.config();
        Self {
            store: Arc::clone(services.store()),
            uploader: Arc::clone(services.uploader()),
            ads: Arc::clone(services.ads()),
            filter: Arc::clone(services.filter()),
            conversation,
            sender,
            guard: SendGuard::new(config.into()),
            ad_gate: AdGate::new(config.ad_every_n_messages),
            state: SendState::Idle,
            in_flight: Weak::new(),
            cooldown: config.send_cooldown(),
            preview_chars: config.preview_chars,
            report_ban_threshold: config.report_ban_threshold,
            reported: HashSet::new(),
        }
    }

    pub const fn conversation(&self) -> &ConversationRef {
        &self.conversation
    }

    pub const fn sender(&self) -> Option<&SenderProfile> {
        self.sender.as_ref()
    }

    /// Replace the signed-in profile (sign-in, sign-out, strike refresh).
    pub fn set_sender(&mut self, sender: Option<SenderProfile>) {
        self.sender = sender;
    }

    /// Current send state; an elapsed cooldown or an abandoned send reads as `Idle`.
    pub fn state(&self) -> SendState {
        match self.state {
            SendState::Cooldown { until } if Instant::now() >= until => SendState::Idle,
            SendState::Sending if self.in_flight.strong_count() == 0 => SendState::Idle,
            state => state,
        }
    }

    pub fn is_sending(&self) -> bool {
        self.state() == SendState::Sending
    }

    /// Validate and send `draft`.
    ///
    /// Rejections leave `draft` as it was so the user can edit it. Once the
    /// checks pass the draft is cleared and is not restored if the upload or
    /// write fails.
    pub async fn send(&mut self, draft: &mut MessageDraft) -> Result<SendReceipt, SendError> {
        let sender = self.admit(draft)?;

        let in_flight = Arc::new(());
        self.in_flight = Arc::downgrade(&in_flight);
        self.state = SendState::Sending;
        let draft = std::mem::take(draft);
        let outcome = self.deliver(&sender, &draft).await;
        drop(in_flight);
        match outcome {
            Ok(receipt) => Ok(receipt),
            Err(error) => {
                self.state = SendState::Idle;
                tracing::warn!(conversation = %self.conversation.messages_path(), "Send failed: {error}");
                Err(error.into())
            }
        }
    }

    /// Every pre-send check, in order. No network effects.
    fn admit(&self, draft: &MessageDraft) -> Result<SenderProfile, SendRejection> {
        match self.state() {
            SendState::Idle => {}
            SendState::Sending => return Err(SendRejection::AlreadySending),
            SendState::Cooldown { .. } => return Err(SendRejection::CoolingDown),
        }

        let sender = self.sender.clone().ok_or(SendRejection::NotSignedIn)?;
        if let SendPermission::Denied { message } =
            check_send_allowed(&sender.strikes, unix_millis_now())
        {
            return Err(SendRejection::Banned { message });
        }

        self.guard.check(draft, &sender, false)?;
        let text = draft.text.trim();
        if !text.is_empty() {
            if let ModerationVerdict::Rejected(reason) =
                self.filter.validate_with(text, sender.may_post_links())
            {
                return Err(SendRejection::Moderation(reason));
            }
        }
        Ok(sender)
    }

    async fn deliver(
        &mut self,
        sender: &SenderProfile,
        draft: &MessageDraft,
    ) -> crate::Result<SendReceipt> {
        let attachments = upload_all(self.uploader.as_ref(), &draft.attachments).await;
        let failed_uploads = draft.attachments.len() - attachments.len();
        let text = draft.text.trim().to_string();
        if attachments.is_empty() && text.is_empty() && draft.structured_items.is_empty() {
            return Err(Error::Upload(format!(
                "none of {} attachments could be uploaded",
                draft.attachments.len()
            )));
        }

        let message = self
            .store
            .write_message(
                &self.conversation,
                NewMessage {
                    sender_id: sender.user_id.clone(),
                    text,
                    timestamp: unix_millis_now(),
                    attachments,
                    structured_items: draft.structured_items.clone(),
                    reply_to_id: draft.reply_to_id.clone(),
                    strike_count_at_send: Some(sender.strikes.strike_count),
                },
            )
            .await?;

        self.guard.record_sent(draft);
        self.state = SendState::Cooldown {
            until: Instant::now() + self.cooldown,
        };
        tracing::debug!(id = %message.id, "Message sent");

        if let ConversationRef::Private { partner_id, .. } = &self.conversation {
            self.touch_summaries(sender, partner_id, &message).await;
        }

        let continuation = self.ad_gate.on_message_sent(self.ads.as_ref(), sender.is_subscriber);
        let ad_shown = continuation.ad_shown();
        continuation.await;

        Ok(SendReceipt {
            message,
            failed_uploads,
            ad_shown,
        })
    }

    /// Refresh both participants' inbox entries after a private send.
    async fn touch_summaries(&self, sender: &SenderProfile, partner_id: &str, message: &Message) {
        let preview = truncate_preview(&message.preview_text(), self.preview_chars);
        let own = SummaryPatch {
            last_message_preview: Some(preview.clone()),
            last_message_timestamp: message.timestamp,
            ..SummaryPatch::default()
        };
        let theirs = SummaryPatch {
            unread: Some(UnreadUpdate::Increment(1)),
            display_name: Some(sender.display_name.clone()).filter(|name| !name.is_empty()),
            ..own.clone()
        };

        if let Err(error) = self
            .store
            .update_summary(&sender.user_id, partner_id, own)
            .await
        {
            tracing::warn!(partner = partner_id, "Failed to update own summary: {error}");
        }
        if let Err(error) = self
            .store
            .update_summary(partner_id, &sender.user_id, theirs)
            .await
        {
            tracing::warn!(partner = partner_id, "Failed to update partner summary: {error}");
        }
    }

    /// Report someone else's message.
    ///
    /// The report that reaches the configured threshold removes the message
    /// and refers its sender to the moderation authority.
    pub async fn report_message(&mut self, message: &Message) -> crate::Result<ReportOutcome> {
        let viewer = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::InvalidInput("You must be signed in to report messages.".to_string()))?;
        if viewer.user_id == message.sender_id {
            return Err(Error::InvalidInput(
                "You cannot report your own message.".to_string(),
            ));
        }
        if self.reported.contains(&message.id) {
            return Err(Error::InvalidInput(
                "You have already reported this message.".to_string(),
            ));
        }

        let report_count = message.report_count.saturating_add(1);
        let outcome = if report_count >= self.report_ban_threshold {
            self.store
                .remove_message(&self.conversation, &message.id)
                .await?;
            self.store
                .request_ban(&message.sender_id, REPORT_REASON)
                .await?;
            tracing::info!(id = %message.id, sender = %message.sender_id, "Reported message removed");
            ReportOutcome::Removed
        } else {
            self.store
                .update_message(
                    &self.conversation,
                    &message.id,
                    MessagePatch {
                        report_count: Some(report_count),
                    },
                )
                .await?;
            ReportOutcome::Flagged { report_count }
        };

        self.reported.insert(message.id.clone());
        Ok(outcome)
    }

    /// Delete a message. Only its sender or a moderator may do so.
    pub async fn delete_message(&self, message: &Message) -> crate::Result<()> {
        let viewer = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::InvalidInput("You must be signed in to delete messages.".to_string()))?;
        if viewer.user_id != message.sender_id && !viewer.is_moderator {
            return Err(Error::InvalidInput(
                "You can only delete your own messages.".to_string(),
            ));
        }
        self.store
            .remove_message(&self.conversation, &message.id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::ChatConfig;
    use crate::models::{BanExpiry, ConversationSummary, StrikeRecord};
    use crate::moderation::ModerationReason;
    use crate::services::{NoAds, StaticUploader};
    use crate::store::MemoryChatStore;

    type TestSession = ChatSession<MemoryChatStore, StaticUploader, NoAds>;

    fn services(store: &MemoryChatStore) -> ChatServices<MemoryChatStore, StaticUploader, NoAds> {
        ChatServices::new(
            store.clone(),
            StaticUploader::new("https://cdn.example.com"),
            NoAds,
            ChatConfig::default(),
        )
        .unwrap()
    }

    fn alice() -> SenderProfile {
        SenderProfile {
            display_name: "Alice".to_string(),
            ..SenderProfile::new("alice")
        }
    }

    fn group_session(store: &MemoryChatStore) -> TestSession {
        services(store).session(ConversationRef::group("trading"), Some(alice()))
    }

    #[tokio::test(start_paused = true)]
    async fn sends_and_enters_cooldown() {
        let store = MemoryChatStore::new();
        let mut session = group_session(&store);
        let mut draft = MessageDraft::text("  selling a frost dragon  ");

        let receipt = session.send(&mut draft).await.unwrap();

        assert_eq!(receipt.message.text, "selling a frost dragon");
        assert_eq!(receipt.message.sender_id, "alice");
        assert!(draft.is_empty());
        assert!(matches!(session.state(), SendState::Cooldown { .. }));
        assert_eq!(store.messages(session.conversation()).await.len(), 1);
    }

    struct StalledUploader;

    impl AttachmentUploader for StalledUploader {
        async fn upload_attachment(&self, _local_uri: &str) -> Option<String> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_send_returns_to_idle() {
        let store = MemoryChatStore::new();
        let services = ChatServices::new(
            store.clone(),
            StalledUploader,
            NoAds,
            ChatConfig::default(),
        )
        .unwrap();
        let mut session = services.session(ConversationRef::group("trading"), Some(alice()));

        let mut draft = MessageDraft {
            attachments: vec!["file:///tmp/dragon.png".to_string()],
            ..MessageDraft::text("stuck")
        };
        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), session.send(&mut draft)).await;
        assert!(timed_out.is_err());
        assert_eq!(session.state(), SendState::Idle);
        assert!(!session.is_sending());

        let receipt = session
            .send(&mut MessageDraft::text("later"))
            .await
            .unwrap();
        assert_eq!(receipt.message.text, "later");
        assert_eq!(store.message_writes().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_send_within_cooldown_is_rejected() {
        let store = MemoryChatStore::new();
        let mut session = group_session(&store);
        session.send(&mut MessageDraft::text("first")).await.unwrap();

        let mut second = MessageDraft::text("second");
        let error = session.send(&mut second).await.unwrap_err();
        assert!(matches!(error, SendError::Rejected(SendRejection::CoolingDown)));
        assert_eq!(second.text, "second");

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(session.state(), SendState::Idle);
        session.send(&mut second).await.unwrap();
        assert_eq!(store.message_writes().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_send_never_reaches_the_store() {
        let store = MemoryChatStore::new();
        let mut session = group_session(&store);
        session.send(&mut MessageDraft::text("hello")).await.unwrap();
        tokio::time::advance(Duration::from_millis(150)).await;

        let error = session
            .send(&mut MessageDraft::text("hello"))
            .await
            .unwrap_err();
        assert!(matches!(error, SendError::Rejected(SendRejection::Duplicate)));
        assert_eq!(store.message_writes().await, 1);
        assert_eq!(session.state(), SendState::Idle);
    }

    #[tokio::test]
    async fn signed_out_and_banned_senders_are_refused() {
        let store = MemoryChatStore::new();
        let mut session = services(&store).session(ConversationRef::group("trading"), None);
        let error = session.send(&mut MessageDraft::text("hi")).await.unwrap_err();
        assert!(matches!(error, SendError::Rejected(SendRejection::NotSignedIn)));

        session.set_sender(Some(SenderProfile {
            strikes: StrikeRecord {
                strike_count: 3,
                banned_until: Some(BanExpiry::Permanent),
            },
            ..alice()
        }));
        let error = session.send(&mut MessageDraft::text("hi")).await.unwrap_err();
        assert_eq!(error.to_string(), "You are permanently banned from chat.");
        assert_eq!(store.message_writes().await, 0);
    }

    #[tokio::test]
    async fn moderation_rejection_keeps_the_draft() {
        let store = MemoryChatStore::new();
        let mut session = group_session(&store);
        let mut draft = MessageDraft::text("free robux giveaway");

        let error = session.send(&mut draft).await.unwrap_err();
        assert!(matches!(
            error,
            SendError::Rejected(SendRejection::Moderation(ModerationReason::Spam))
        ));
        assert_eq!(draft.text, "free robux giveaway");
        assert_eq!(session.state(), SendState::Idle);
    }

    #[tokio::test]
    async fn subscriber_may_share_links() {
        let store = MemoryChatStore::new();
        let services = services(&store);
        let mut member = services.session(ConversationRef::group("trading"), Some(alice()));
        let error = member
            .send(&mut MessageDraft::text("check http://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            SendError::Rejected(SendRejection::LinkNotPermitted)
        ));

        let subscriber = SenderProfile {
            is_subscriber: true,
            ..alice()
        };
        let mut session = services.session(ConversationRef::group("trading"), Some(subscriber));
        session
            .send(&mut MessageDraft::text("check http://example.com"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn store_failure_clears_draft_and_resets_state() {
        let store = MemoryChatStore::new();
        let mut session = group_session(&store);
        store.set_failing(true).await;
        let mut draft = MessageDraft::text("anyone trading?");

        let error = session.send(&mut draft).await.unwrap_err();
        assert!(matches!(error, SendError::Failed(Error::Store(_))));
        assert!(draft.is_empty());
        assert_eq!(session.state(), SendState::Idle);
    }

    #[tokio::test]
    async fn partial_upload_failure_still_sends() {
        let store = MemoryChatStore::new();
        let mut session = group_session(&store);
        let mut draft = MessageDraft {
            attachments: vec![
                "file:///tmp/pet.png".to_string(),
                "file:///tmp/fail.png".to_string(),
            ],
            ..MessageDraft::default()
        };

        let receipt = session.send(&mut draft).await.unwrap();
        assert_eq!(
            receipt.message.attachments,
            vec!["https://cdn.example.com/pet.png".to_string()]
        );
        assert_eq!(receipt.failed_uploads, 1);
    }

    #[tokio::test]
    async fn total_upload_failure_without_text_fails() {
        let store = MemoryChatStore::new();
        let mut session = group_session(&store);
        let mut draft = MessageDraft {
            attachments: vec!["file:///tmp/fail.png".to_string()],
            ..MessageDraft::default()
        };

        let error = session.send(&mut draft).await.unwrap_err();
        assert!(matches!(error, SendError::Failed(Error::Upload(_))));
        assert_eq!(store.message_writes().await, 0);
        assert_eq!(session.state(), SendState::Idle);
    }

    #[tokio::test]
    async fn private_send_updates_both_summaries() {
        let store = MemoryChatStore::new();
        let mut session = services(&store).session(
            ConversationRef::private("alice", "bob"),
            Some(alice()),
        );
        store
            .put_summary("bob", ConversationSummary::new("alice").with_unread(2))
            .await;

        session.send(&mut MessageDraft::text("still have that pet?")).await.unwrap();

        let own = store.summary("alice", "bob").await.unwrap();
        assert_eq!(own.last_message_preview, "still have that pet?");
        assert_eq!(own.unread_count, 0);
        let theirs = store.summary("bob", "alice").await.unwrap();
        assert_eq!(theirs.unread_count, 3);
        assert_eq!(theirs.display_name, "Alice");
    }

    #[tokio::test]
    async fn second_report_removes_message_and_requests_ban() {
        let store = MemoryChatStore::new();
        let room = ConversationRef::group("trading");
        let services = services(&store);
        let offending = NewMessage {
            sender_id: "scammer".to_string(),
            text: "trust trade".to_string(),
            timestamp: 1,
            attachments: Vec::new(),
            structured_items: Vec::new(),
            reply_to_id: None,
            strike_count_at_send: None,
        }
        .into_message(MessageId::new("m1"));
        store.seed_messages(&room, [offending.clone()]).await;

        let mut reconciler = services.reconciler(room.clone());
        reconciler.attach().await.unwrap();
        reconciler.load_initial().await;
        assert_eq!(reconciler.messages().len(), 1);

        let mut first = services.session(room.clone(), Some(alice()));
        assert_eq!(
            first.report_message(&offending).await.unwrap(),
            ReportOutcome::Flagged { report_count: 1 }
        );
        assert!(first.report_message(&offending).await.is_err());

        let flagged = store.messages(&room).await.remove(0);
        let mut second = services.session(room.clone(), Some(SenderProfile::new("carol")));
        assert_eq!(
            second.report_message(&flagged).await.unwrap(),
            ReportOutcome::Removed
        );

        reconciler.pump();
        assert!(reconciler.messages().is_empty());
        assert!(store.messages(&room).await.is_empty());
        assert_eq!(
            store.ban_requests().await,
            vec![("scammer".to_string(), REPORT_REASON.to_string())]
        );
    }

    #[tokio::test]
    async fn cannot_report_own_message() {
        let store = MemoryChatStore::new();
        let mut session = group_session(&store);
        let receipt = session.send(&mut MessageDraft::text("my offer")).await.unwrap();
        assert!(session.report_message(&receipt.message).await.is_err());
    }

    #[tokio::test]
    async fn only_sender_or_moderator_may_delete() {
        let store = MemoryChatStore::new();
        let services = services(&store);
        let room = ConversationRef::group("trading");
        let mut own = services.session(room.clone(), Some(alice()));
        let receipt = own.send(&mut MessageDraft::text("wrong room")).await.unwrap();

        let other = services.session(room.clone(), Some(SenderProfile::new("bob")));
        assert!(other.delete_message(&receipt.message).await.is_err());

        let moderator = SenderProfile {
            is_moderator: true,
            ..SenderProfile::new("mod")
        };
        let moderator = services.session(room.clone(), Some(moderator));
        moderator.delete_message(&receipt.message).await.unwrap();
        assert!(store.messages(&room).await.is_empty());
    }
}

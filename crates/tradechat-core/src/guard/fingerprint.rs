//! Canonical content fingerprint for duplicate-send detection.

use std::cmp::Ordering;

use crate::models::{MessageDraft, StructuredItem};

/// Normalized view of a message's content.
///
/// Two drafts with the same trimmed text, the same set of attachments, and
/// the same structured items in any order produce equal fingerprints.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageFingerprint {
    text: String,
    attachments: Vec<String>,
    items: Vec<StructuredItem>,
}

impl MessageFingerprint {
    pub fn of(draft: &MessageDraft) -> Self {
        let mut attachments = draft.attachments.clone();
        attachments.sort();

        let mut items = draft.structured_items.clone();
        items.sort_by(compare_items);

        Self {
            text: draft.text.trim().to_string(),
            attachments,
            items,
        }
    }
}

fn compare_items(a: &StructuredItem, b: &StructuredItem) -> Ordering {
    a.name
        .cmp(&b.name)
        .then_with(|| a.category.cmp(&b.category))
        .then_with(|| a.value.total_cmp(&b.value))
        .then_with(|| flags(a).cmp(&flags(b)))
        .then_with(|| a.image.cmp(&b.image))
}

const fn flags(item: &StructuredItem) -> (bool, bool, bool, bool) {
    (item.fly, item.ride, item.neon, item.mega)
}

//! Viewer's block list, shared read-only by reconcilers and aggregators.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Cheaply clonable handle to the set of blocked user ids.
///
/// Only explicit block/unblock actions mutate it.
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    blocked: Arc<RwLock<HashSet<String>>>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an existing set of ids.
    pub fn from_ids(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            blocked: Arc::new(RwLock::new(ids.into_iter().map(Into::into).collect())),
        }
    }

    /// Returns `true` when the user was not already blocked.
    pub fn block(&self, user_id: &str) -> bool {
        let inserted = self
            .blocked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string());
        if inserted {
            tracing::info!(user = user_id, "User blocked");
        }
        inserted
    }

    /// Returns `true` when the user was blocked.
    pub fn unblock(&self, user_id: &str) -> bool {
        let removed = self
            .blocked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id);
        if removed {
            tracing::info!(user = user_id, "User unblocked");
        }
        removed
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.blocked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(user_id)
    }

    /// Sorted copy of the blocked ids.
    pub fn snapshot(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .blocked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let list = BlockList::new();
        let reader = list.clone();

        assert!(list.block("spammer"));
        assert!(!list.block("spammer"));
        assert!(reader.contains("spammer"));

        assert!(list.unblock("spammer"));
        assert!(!reader.contains("spammer"));
    }

    #[test]
    fn snapshot_is_sorted() {
        let list = BlockList::from_ids(["zed", "amy"]);
        assert_eq!(list.snapshot(), vec!["amy".to_string(), "zed".to_string()]);
    }
}

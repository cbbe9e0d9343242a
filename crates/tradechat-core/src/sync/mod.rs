//! Keeping local chat state consistent with the remote store.

mod aggregator;
mod block_list;
mod reconciler;

pub use aggregator::ConversationAggregator;
pub use block_list::BlockList;
pub use reconciler::{IngestOutcome, MessageReconciler, PageTicket};

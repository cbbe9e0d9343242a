//! Explicit state machines shared by controllers and clients.

/// Load lifecycle of a single conversation's message list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Nothing fetched yet (or the initial fetch failed).
    #[default]
    Empty,
    /// Initial page request in flight.
    Loading,
    /// Messages held; live deltas accepted.
    Ready,
    /// An older-history page request is in flight.
    Paginating,
}

impl LoadState {
    /// Whether a spinner should be shown for the initial fetch.
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Whether a pagination request is currently outstanding.
    pub const fn is_paginating(self) -> bool {
        matches!(self, Self::Paginating)
    }
}

/// Outbound send lifecycle for a chat session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SendState {
    /// Ready to accept a new send.
    #[default]
    Idle,
    /// A send is being processed.
    Sending,
    /// A send just completed; further sends are rejected until `until`.
    Cooldown { until: tokio::time::Instant },
}

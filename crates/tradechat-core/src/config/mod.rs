//! Chat tuning configuration.
//!
//! Provides a single `ChatConfig` struct holding every numeric limit used by
//! the reconciler, the send guards, and the ad gate. Values can be loaded
//! from a JSON file and overridden through `TRADECHAT_*` environment variables.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::ConversationKind;
use crate::util::normalize_text_option;

const ENV_PREFIX: &str = "TRADECHAT_";

/// All chat tunables in one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ChatConfig {
    /// Window after a successful send during which new sends are rejected.
    pub send_cooldown_ms: u64,
    /// Messages fetched on first open of a group chat.
    pub group_initial_page: usize,
    /// Messages fetched on first open of a private chat.
    pub private_initial_page: usize,
    /// Older messages fetched per "load more" in a group chat.
    pub group_page_size: usize,
    /// Older messages fetched per "load more" in a private chat.
    pub private_page_size: usize,
    /// Maximum trimmed text length in characters.
    pub max_message_chars: usize,
    /// Maximum image attachments per message.
    pub max_attachments: usize,
    /// Maximum structured items per message.
    pub max_structured_items: usize,
    /// An interstitial is offered every N sent messages.
    pub ad_every_n_messages: u64,
    /// Scroll offset (from the newest message) still considered the live edge.
    pub live_edge_threshold: f64,
    /// Report count at which a message is removed and its sender referred for a ban.
    pub report_ban_threshold: u32,
    /// Characters kept in conversation previews.
    pub preview_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            send_cooldown_ms: 100,
            group_initial_page: 5,
            private_initial_page: 10,
            group_page_size: 10,
            private_page_size: 20,
            max_message_chars: 250,
            max_attachments: 3,
            max_structured_items: 18,
            ad_every_n_messages: 15,
            live_edge_threshold: 80.0,
            report_ban_threshold: 2,
            preview_chars: 80,
        }
    }
}

impl ChatConfig {
    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json_str(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let payload = std::fs::read_to_string(path)?;
        Self::from_json_str(&payload)
    }

    /// Apply `TRADECHAT_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Keys are the upper-cased field names with the `TRADECHAT_` prefix,
    /// e.g. `TRADECHAT_SEND_COOLDOWN_MS`.
    pub fn apply_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let read = |name: &str| normalize_text_option(lookup(&format!("{ENV_PREFIX}{name}")));

        if let Some(value) = read("SEND_COOLDOWN_MS") {
            self.send_cooldown_ms = parse_env("SEND_COOLDOWN_MS", &value)?;
        }
        if let Some(value) = read("GROUP_INITIAL_PAGE") {
            self.group_initial_page = parse_env("GROUP_INITIAL_PAGE", &value)?;
        }
        if let Some(value) = read("PRIVATE_INITIAL_PAGE") {
            self.private_initial_page = parse_env("PRIVATE_INITIAL_PAGE", &value)?;
        }
        if let Some(value) = read("GROUP_PAGE_SIZE") {
            self.group_page_size = parse_env("GROUP_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read("PRIVATE_PAGE_SIZE") {
            self.private_page_size = parse_env("PRIVATE_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read("MAX_MESSAGE_CHARS") {
            self.max_message_chars = parse_env("MAX_MESSAGE_CHARS", &value)?;
        }
        if let Some(value) = read("AD_EVERY_N_MESSAGES") {
            self.ad_every_n_messages = parse_env("AD_EVERY_N_MESSAGES", &value)?;
        }
        if let Some(value) = read("LIVE_EDGE_THRESHOLD") {
            self.live_edge_threshold = parse_env("LIVE_EDGE_THRESHOLD", &value)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values that would stall pagination or divide by zero.
    pub fn validate(&self) -> Result<()> {
        let page_sizes = [
            ("group_initial_page", self.group_initial_page),
            ("private_initial_page", self.private_initial_page),
            ("group_page_size", self.group_page_size),
            ("private_page_size", self.private_page_size),
        ];
        for (field, value) in page_sizes {
            if value == 0 {
                return Err(Error::Config(format!("{field} must be greater than zero")));
            }
        }
        if self.ad_every_n_messages == 0 {
            return Err(Error::Config(
                "ad_every_n_messages must be greater than zero".to_string(),
            ));
        }
        if self.max_message_chars == 0 {
            return Err(Error::Config(
                "max_message_chars must be greater than zero".to_string(),
            ));
        }
        if !self.live_edge_threshold.is_finite() || self.live_edge_threshold < 0.0 {
            return Err(Error::Config(
                "live_edge_threshold must be a non-negative number".to_string(),
            ));
        }
        if self.report_ban_threshold == 0 {
            return Err(Error::Config(
                "report_ban_threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub const fn send_cooldown(&self) -> Duration {
        Duration::from_millis(self.send_cooldown_ms)
    }

    /// Size of the first fetch for a conversation of this kind.
    pub const fn initial_page(&self, kind: ConversationKind) -> usize {
        match kind {
            ConversationKind::Group => self.group_initial_page,
            ConversationKind::Private => self.private_initial_page,
        }
    }

    /// Size of each "load more" fetch for a conversation of this kind.
    pub const fn page_size(&self, kind: ConversationKind) -> usize {
        match kind {
            ConversationKind::Group => self.group_page_size,
            ConversationKind::Private => self.private_page_size,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{ENV_PREFIX}{name} has invalid value '{value}'")))
}

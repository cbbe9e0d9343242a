//! Ban gate: decides whether a strike record permits sending.

use crate::models::{BanExpiry, StrikeRecord};

const MINUTE_MS: i64 = 60_000;

/// Outcome of the ban gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendPermission {
    Allowed,
    Denied { message: String },
}

impl SendPermission {
    pub const fn allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Denied { message } => Some(message),
        }
    }
}

/// Check a strike record against the current time (Unix ms).
pub fn check_send_allowed(record: &StrikeRecord, now: i64) -> SendPermission {
    match record.banned_until {
        Some(BanExpiry::Permanent) => SendPermission::Denied {
            message: "You are permanently banned from chat.".to_string(),
        },
        Some(BanExpiry::Until(until)) if until > now => SendPermission::Denied {
            message: format!(
                "You are banned from chat. Time remaining: {}",
                format_remaining(until.saturating_sub(now))
            ),
        },
        _ => SendPermission::Allowed,
    }
}

/// Render a positive duration as `"{h}h {m}m"` or `"{m}m"`, rounding up to the minute.
pub fn format_remaining(remaining_ms: i64) -> String {
    let total_minutes = remaining_ms.max(0).saturating_add(MINUTE_MS - 1) / MINUTE_MS;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

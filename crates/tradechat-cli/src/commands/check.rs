use std::path::Path;

use serde::Serialize;
use tradechat_core::guard::{RejectionKind, SendGuard, SendLimits, SendRejection};
use tradechat_core::models::{MessageDraft, SenderProfile};
use tradechat_core::moderation::ModerationFilter;
use tradechat_core::ChatConfig;

use crate::commands::config::load_config;
use crate::error::CliError;

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub text: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub fn run_check(
    text_parts: &[String],
    subscriber: bool,
    moderator: bool,
    as_json: bool,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let text = text_parts.join(" ");
    if text.trim().is_empty() {
        return Err(CliError::EmptyText);
    }
    let config = load_config(config_path)?;
    let report = evaluate_message(&text, subscriber, moderator, &config);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if let Some(reason) = &report.reason {
        println!("Rejected: {reason}");
    } else {
        println!("OK");
    }
    Ok(())
}

/// Stateless dry run: send guards first, then the moderation filter.
pub fn evaluate_message(
    text: &str,
    subscriber: bool,
    moderator: bool,
    config: &ChatConfig,
) -> CheckReport {
    let sender = SenderProfile {
        is_subscriber: subscriber,
        is_moderator: moderator,
        ..SenderProfile::new("cli")
    };
    let draft = MessageDraft::text(text);
    let guard = SendGuard::new(SendLimits::from(config));

    let rejection = guard.check(&draft, &sender, false).err().or_else(|| {
        ModerationFilter::new()
            .validate_with(draft.text.trim(), sender.may_post_links())
            .reason()
            .map(SendRejection::Moderation)
    });
    tracing::debug!(allowed = rejection.is_none(), "Checked message");

    CheckReport {
        text: text.trim().to_string(),
        allowed: rejection.is_none(),
        category: rejection.as_ref().map(|rejection| match rejection.kind() {
            RejectionKind::Validation => "validation",
            RejectionKind::Authorization => "authorization",
        }),
        reason: rejection.map(|rejection| rejection.to_string()),
    }
}

use serde::Serialize;
use tradechat_core::guard::check_send_allowed;
use tradechat_core::models::{BanExpiry, StrikeRecord};
use tradechat_core::util::unix_millis_now;

use crate::error::CliError;

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct BanReport {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn run_ban_status(
    banned_until: Option<BanExpiry>,
    now: Option<i64>,
    as_json: bool,
) -> Result<(), CliError> {
    let report = evaluate_ban(banned_until, now.unwrap_or_else(unix_millis_now));

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if let Some(message) = &report.message {
        println!("{message}");
    } else {
        println!("Allowed to send.");
    }
    Ok(())
}

pub fn evaluate_ban(banned_until: Option<BanExpiry>, now: i64) -> BanReport {
    let record = StrikeRecord {
        strike_count: 0,
        banned_until,
    };
    let permission = check_send_allowed(&record, now);
    BanReport {
        allowed: permission.allowed(),
        message: permission.message().map(str::to_string),
    }
}

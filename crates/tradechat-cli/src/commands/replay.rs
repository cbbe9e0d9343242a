use std::path::Path;

use crate::commands::config::load_config;
use crate::error::CliError;
use crate::scenario::{replay, ReplayReport, Scenario};

pub async fn run_replay(
    scenario_path: &Path,
    as_json: bool,
    config_path: Option<&Path>,
) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let scenario = Scenario::load(scenario_path)?;
    let report = replay(scenario, config).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_report(&report));
    }
    Ok(())
}

pub fn format_report(report: &ReplayReport) -> String {
    let mut output = format!("State: {}\n", report.state);
    output.push_str(&format!("Messages ({}):\n", report.messages.len()));
    for message in &report.messages {
        output.push_str(&format!(
            "  [{}] {}: {}\n",
            message.sort_timestamp(),
            message.sender_id,
            message.preview_text()
        ));
    }
    if !report.pending.is_empty() {
        output.push_str(&format!("Pending: {}\n", report.pending.len()));
    }
    output.push_str(&format!(
        "More history: {}\n",
        if report.has_more_history { "yes" } else { "no" }
    ));
    output.push_str(&format!("Unread total: {}\n", report.unread_total));
    output
}

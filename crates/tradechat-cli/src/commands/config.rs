use std::path::Path;

use tradechat_core::ChatConfig;

use crate::error::CliError;

/// Defaults, then the optional config file, then `TRADECHAT_*` variables.
pub fn load_config(path: Option<&Path>) -> Result<ChatConfig, CliError> {
    let config = match path {
        Some(path) => ChatConfig::load(path)?,
        None => ChatConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

pub fn run_config_show(path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

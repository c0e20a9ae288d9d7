//! Configuration validation

use std::path::Component;

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_storage(config)?;
    validate_history(config)?;
    validate_transfer(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn invalid(field: &str, message: &str) -> crate::error::StrongroomError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn validate_storage(config: &Config) -> Result<()> {
    let dir = &config.storage.vaults_dir;
    if dir.as_os_str().is_empty() {
        return Err(invalid("storage.vaults_dir", "cannot be empty"));
    }
    if dir
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(invalid(
            "storage.vaults_dir",
            "must be a relative path inside the data dir",
        ));
    }
    Ok(())
}

fn validate_history(config: &Config) -> Result<()> {
    let branch = &config.history.default_branch;
    if branch.is_empty() {
        return Err(invalid("history.default_branch", "branch cannot be empty"));
    }
    if branch.chars().any(char::is_whitespace) {
        return Err(invalid(
            "history.default_branch",
            "branch cannot contain whitespace",
        ));
    }
    if !git2::Reference::is_valid_name(&format!("refs/heads/{branch}")) {
        return Err(invalid("history.default_branch", "not a valid branch name"));
    }
    if config.history.author_email.is_empty() {
        return Err(invalid("history.author_email", "cannot be empty"));
    }
    Ok(())
}

fn validate_transfer(config: &Config) -> Result<()> {
    if config.transfer.agent.is_empty() {
        return Err(invalid("transfer.agent", "agent cannot be empty"));
    }
    if config.transfer.capability.is_empty()
        || config.transfer.capability.contains(char::is_whitespace)
    {
        return Err(invalid(
            "transfer.capability",
            "must be a single capability token",
        ));
    }
    Ok(())
}

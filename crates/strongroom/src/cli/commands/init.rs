//! Init command

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use strongroom_core::config::defaults::{DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TOML};

use crate::cli::output::{self, path_style};
use crate::cli::Cli;

/// Write a default configuration file
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, "executing init command");
        let config_path = match &self.output {
            Some(path) => path.clone(),
            None => std::env::current_dir()?.join(DEFAULT_CONFIG_TOML),
        };

        if config_path.exists() && !self.force {
            anyhow::bail!(
                "Configuration file already exists at {}. Use --force to overwrite.",
                config_path.display()
            );
        }

        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;

        if !cli.quiet {
            output::success(&format!(
                "Created configuration at {}",
                path_style().apply_to(config_path.display())
            ));
            println!();
            println!("Next steps:");
            println!("  1. Edit {} to choose where vaults live", config_path.display());
            println!("  2. Run {} to create your first vault", path_style().apply_to("strongroom vault create <name>"));
        }

        Ok(())
    }
}

//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;

use strongroom_core::config::{load_config, load_config_or_default, validate_config};
use strongroom_core::{Config, FsStorage, Storage};
use strongroom_vault::VaultManager;

use commands::{CompletionsCommand, InitCommand, SecretCommand, VaultCommand};

/// Strongroom - peer-synchronizable secret store
#[derive(Debug, Parser)]
#[command(name = "strongroom")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Configuration file (searched for from the current directory if omitted)
    #[arg(short, long, global = true, env = "STRONGROOM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory holding the vaults (overrides the configuration)
    #[arg(short, long, global = true, env = "STRONGROOM_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a default configuration file
    Init(InitCommand),

    /// Create, inspect, share and synchronize vaults
    Vault(VaultCommand),

    /// Manage the secrets inside a vault
    Secret(SecretCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Init(ref cmd) => cmd.execute(&self),
            Commands::Completions(ref cmd) => cmd.execute(&self),
            Commands::Vault(ref cmd) => {
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(cmd.execute(&self))
            }
            Commands::Secret(ref cmd) => {
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(cmd.execute(&self))
            }
        }
    }

    /// Resolve configuration from `--config`, the nearest config file or
    /// defaults, then apply `--data-dir`
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => load_config_or_default(&std::env::current_dir()?).0,
        };

        if let Some(dir) = &self.data_dir {
            config.storage.data_dir = dir.clone();
        }
        validate_config(&config)?;
        Ok(config)
    }

    /// Open the vault manager over the configured data directory
    pub async fn open_manager(&self) -> anyhow::Result<VaultManager> {
        let config = self.load_config()?;
        open_manager_at(config.storage.data_dir.clone(), config).await
    }
}

/// Open a vault manager rooted at `data_dir`
pub async fn open_manager_at(data_dir: PathBuf, config: Config) -> anyhow::Result<VaultManager> {
    debug!(data_dir = %data_dir.display(), "opening vault manager");
    let storage: Arc<dyn Storage> = Arc::new(FsStorage::new(data_dir.clone()));
    VaultManager::open(storage, config)
        .await
        .with_context(|| format!("failed to open vaults under {}", data_dir.display()))
}

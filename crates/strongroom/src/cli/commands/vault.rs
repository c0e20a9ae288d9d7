//! Vault commands

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Subcommand};
use tracing::info;

use strongroom_vault::{LocalTransferClient, PullOutcome, VaultManager, VaultTransferService};

use crate::cli::output::{self, hash_style, header, key_value, name_style};
use crate::cli::{open_manager_at, Cli, OutputFormat};

/// Vault management commands
#[derive(Debug, Args)]
pub struct VaultCommand {
    #[command(subcommand)]
    pub command: VaultSubcommand,
}

/// Vault subcommands
#[derive(Debug, Subcommand)]
pub enum VaultSubcommand {
    /// Create an empty vault
    Create {
        /// Vault name
        name: String,
    },

    /// List vaults
    List,

    /// Delete a vault and all of its history
    Destroy {
        /// Vault name
        name: String,
    },

    /// Show a vault's history, newest first
    History {
        /// Vault name
        name: String,

        /// Only show the newest N entries
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Authorize a public key to pull a vault
    Share {
        /// Vault name
        name: String,
        /// Public key of the peer
        key: String,
    },

    /// Revoke a public key
    Unshare {
        /// Vault name
        name: String,
        /// Public key of the peer
        key: String,
    },

    /// Copy a vault from another data directory
    Clone {
        /// Vault name
        name: String,

        /// Data directory of the peer holding the vault
        #[arg(long)]
        from: PathBuf,
    },

    /// Fast-forward a vault from another data directory
    Pull {
        /// Vault name
        name: String,

        /// Data directory of the peer holding the vault
        #[arg(long)]
        from: PathBuf,
    },

    /// Print the ref advertisement a peer would receive
    Advertise {
        /// Vault name
        name: String,
    },
}

impl VaultCommand {
    /// Execute the vault command
    pub async fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let manager = cli.open_manager().await?;

        match &self.command {
            VaultSubcommand::Create { name } => {
                info!(vault = %name, "executing vault create");
                let vault = manager.create_vault(name).await?;
                match cli.format {
                    OutputFormat::Json => output::json(&serde_json::json!({
                        "name": vault.name(),
                        "path": vault.path().display().to_string(),
                    })),
                    OutputFormat::Text => {
                        if !cli.quiet {
                            output::success(&format!(
                                "Created vault {}",
                                name_style().apply_to(vault.name())
                            ));
                        }
                        Ok(())
                    }
                }
            }
            VaultSubcommand::List => {
                let names = manager.list_vaults();
                match cli.format {
                    OutputFormat::Json => output::json(&serde_json::json!(names)),
                    OutputFormat::Text => {
                        if names.is_empty() {
                            output::info("No vaults");
                        }
                        for name in names {
                            println!("{}", name_style().apply_to(name));
                        }
                        Ok(())
                    }
                }
            }
            VaultSubcommand::Destroy { name } => {
                info!(vault = %name, "executing vault destroy");
                let destroyed = manager.destroy_vault(name).await?;
                match cli.format {
                    OutputFormat::Json => output::json(&serde_json::json!({
                        "name": name,
                        "destroyed": destroyed,
                    })),
                    OutputFormat::Text => {
                        if !destroyed {
                            output::warning(&format!("No vault named {name}"));
                        } else if !cli.quiet {
                            output::success(&format!("Destroyed vault {name}"));
                        }
                        Ok(())
                    }
                }
            }
            VaultSubcommand::History { name, depth } => {
                let vault = manager.get_vault(name)?;
                let history = vault.history(*depth).await?;
                match cli.format {
                    OutputFormat::Json => output::json(&serde_json::to_value(&history)?),
                    OutputFormat::Text => {
                        println!("{}", header(&format!("History of {name}")));
                        for commit in &history {
                            println!(
                                "  {} {} {}",
                                hash_style().apply_to(&commit.short_hash),
                                commit.timestamp.format("%Y-%m-%d %H:%M:%S"),
                                commit.message
                            );
                        }
                        Ok(())
                    }
                }
            }
            VaultSubcommand::Share { name, key } => {
                let vault = manager.get_vault(name)?;
                vault.share_vault(key).await?;
                self.print_keys(cli, name, &vault.shared_keys().await)
            }
            VaultSubcommand::Unshare { name, key } => {
                let vault = manager.get_vault(name)?;
                vault.unshare_vault(key).await?;
                self.print_keys(cli, name, &vault.shared_keys().await)
            }
            VaultSubcommand::Clone { name, from } => {
                info!(vault = %name, from = %from.display(), "executing vault clone");
                let client = peer_client(from, &manager).await?;
                let vault = manager.clone_vault(name, &client).await?;
                let secrets = vault.list_secrets().await.len();
                match cli.format {
                    OutputFormat::Json => output::json(&serde_json::json!({
                        "name": name,
                        "secrets": secrets,
                    })),
                    OutputFormat::Text => {
                        if !cli.quiet {
                            output::success(&format!(
                                "Cloned vault {} ({secrets} secrets)",
                                name_style().apply_to(name)
                            ));
                        }
                        Ok(())
                    }
                }
            }
            VaultSubcommand::Pull { name, from } => {
                info!(vault = %name, from = %from.display(), "executing vault pull");
                let vault = manager.get_vault(name)?;
                let client = peer_client(from, &manager).await?;
                let outcome = vault.pull_vault(&client).await?;
                match (cli.format, outcome) {
                    (OutputFormat::Json, PullOutcome::UpToDate) => {
                        output::json(&serde_json::json!({ "name": name, "updated": false }))
                    }
                    (OutputFormat::Json, PullOutcome::FastForwarded { from, to }) => {
                        output::json(&serde_json::json!({
                            "name": name,
                            "updated": true,
                            "from": from.map(|oid| oid.to_string()),
                            "to": to.to_string(),
                        }))
                    }
                    (OutputFormat::Text, PullOutcome::UpToDate) => {
                        if !cli.quiet {
                            output::info(&format!("{name} is already up to date"));
                        }
                        Ok(())
                    }
                    (OutputFormat::Text, PullOutcome::FastForwarded { to, .. }) => {
                        if !cli.quiet {
                            output::success(&format!(
                                "Pulled {} to {}",
                                name_style().apply_to(name),
                                hash_style().apply_to(&to.to_string()[..7])
                            ));
                        }
                        Ok(())
                    }
                }
            }
            VaultSubcommand::Advertise { name } => {
                let vault = manager.get_vault(name)?;
                let capabilities = manager.config().transfer.capability_line();
                let advertisement = vault.advertise_refs(&capabilities).await?;
                let text = String::from_utf8_lossy(&advertisement);
                match cli.format {
                    OutputFormat::Json => output::json(&serde_json::json!({
                        "name": name,
                        "advertisement": text,
                    })),
                    OutputFormat::Text => {
                        // Capabilities follow a NUL on the first line.
                        println!("{}", text.replace('\0', " "));
                        Ok(())
                    }
                }
            }
        }
    }

    fn print_keys(&self, cli: &Cli, name: &str, keys: &[String]) -> anyhow::Result<()> {
        match cli.format {
            OutputFormat::Json => output::json(&serde_json::json!({
                "name": name,
                "shared_with": keys,
            })),
            OutputFormat::Text => {
                if !cli.quiet {
                    output::success(&format!("Updated sharing for {name}"));
                    println!("{}", key_value("Shared with", &keys.len().to_string()));
                    for key in keys {
                        println!("    {key}");
                    }
                }
                Ok(())
            }
        }
    }
}

/// Client serving vaults out of another local data directory
async fn peer_client(data_dir: &Path, local: &VaultManager) -> anyhow::Result<LocalTransferClient> {
    let mut config = local.config().clone();
    config.storage.data_dir = data_dir.to_path_buf();
    let peer = open_manager_at(data_dir.to_path_buf(), config).await?;
    Ok(LocalTransferClient::new(VaultTransferService::new(
        Arc::new(peer),
    )))
}

//! Secret commands

use std::io::{Read, Write};
use std::path::PathBuf;

use clap::{Args, Subcommand};
use tracing::info;

use crate::cli::output::{self, name_style};
use crate::cli::{Cli, OutputFormat};

/// Secret management commands
#[derive(Debug, Args)]
pub struct SecretCommand {
    #[command(subcommand)]
    pub command: SecretSubcommand,
}

/// Secret subcommands
#[derive(Debug, Subcommand)]
pub enum SecretSubcommand {
    /// Add a new secret
    Add(WriteSecretArgs),

    /// Replace the content of an existing secret
    Update(WriteSecretArgs),

    /// Print a secret's content
    Get {
        /// Vault name
        vault: String,
        /// Secret name
        name: String,
    },

    /// Remove a secret
    Rm {
        /// Vault name
        vault: String,
        /// Secret name
        name: String,
    },

    /// List the secrets in a vault
    List {
        /// Vault name
        vault: String,
    },
}

/// Where a secret's content comes from
#[derive(Debug, Args)]
pub struct WriteSecretArgs {
    /// Vault name
    pub vault: String,

    /// Secret name
    pub name: String,

    /// Secret value (read from stdin when neither a value nor --file is given)
    #[arg(conflicts_with = "file")]
    pub value: Option<String>,

    /// Read the secret from a file
    #[arg(long)]
    pub file: Option<PathBuf>,
}

impl WriteSecretArgs {
    fn content(&self) -> anyhow::Result<Vec<u8>> {
        if let Some(value) = &self.value {
            return Ok(value.clone().into_bytes());
        }
        if let Some(path) = &self.file {
            return Ok(std::fs::read(path)?);
        }
        let mut content = Vec::new();
        std::io::stdin().read_to_end(&mut content)?;
        Ok(content)
    }
}

impl SecretCommand {
    /// Execute the secret command
    pub async fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let manager = cli.open_manager().await?;

        match &self.command {
            SecretSubcommand::Add(args) => {
                info!(vault = %args.vault, secret = %args.name, "executing secret add");
                let vault = manager.get_vault(&args.vault)?;
                vault.add_secret(&args.name, &args.content()?).await?;
                report(cli, "added", &args.vault, &args.name)
            }
            SecretSubcommand::Update(args) => {
                info!(vault = %args.vault, secret = %args.name, "executing secret update");
                let vault = manager.get_vault(&args.vault)?;
                vault.update_secret(&args.name, &args.content()?).await?;
                report(cli, "updated", &args.vault, &args.name)
            }
            SecretSubcommand::Get { vault, name } => {
                let content = manager.get_vault(vault)?.get_secret(name).await?;
                match cli.format {
                    OutputFormat::Json => output::json(&serde_json::json!({
                        "vault": vault,
                        "name": name,
                        "value": String::from_utf8_lossy(&content),
                    })),
                    OutputFormat::Text => {
                        let mut stdout = std::io::stdout().lock();
                        stdout.write_all(&content)?;
                        stdout.flush()?;
                        Ok(())
                    }
                }
            }
            SecretSubcommand::Rm { vault, name } => {
                info!(vault = %vault, secret = %name, "executing secret rm");
                manager.get_vault(vault)?.remove_secret(name).await?;
                report(cli, "removed", vault, name)
            }
            SecretSubcommand::List { vault } => {
                let mut names = manager.get_vault(vault)?.list_secrets().await;
                names.sort();
                match cli.format {
                    OutputFormat::Json => output::json(&serde_json::json!(names)),
                    OutputFormat::Text => {
                        for name in names {
                            println!("{}", name_style().apply_to(name));
                        }
                        Ok(())
                    }
                }
            }
        }
    }
}

fn report(cli: &Cli, action: &str, vault: &str, name: &str) -> anyhow::Result<()> {
    match cli.format {
        OutputFormat::Json => output::json(&serde_json::json!({
            "vault": vault,
            "name": name,
            "action": action,
        })),
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(&format!(
                    "Secret {} {action} in {vault}",
                    name_style().apply_to(name)
                ));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Commands;
    use clap::Parser;

    #[test]
    fn test_value_and_file_conflict() {
        let result = Cli::try_parse_from([
            "strongroom", "secret", "add", "ops", "token", "abc", "--file", "x",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_inline_value_is_used() {
        let cli = Cli::parse_from(["strongroom", "secret", "add", "ops", "token", "abc"]);
        let Commands::Secret(cmd) = cli.command else {
            panic!("expected secret command");
        };
        let SecretSubcommand::Add(args) = cmd.command else {
            panic!("expected add");
        };
        assert_eq!(args.content().unwrap(), b"abc");
    }

    #[test]
    fn test_file_value_is_read() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("secret.bin");
        std::fs::write(&path, [0u8, 1, 2]).unwrap();

        let args = WriteSecretArgs {
            vault: "ops".to_string(),
            name: "bin".to_string(),
            value: None,
            file: Some(path),
        };
        assert_eq!(args.content().unwrap(), vec![0u8, 1, 2]);
    }
}

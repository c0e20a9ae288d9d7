//! Shell completion scripts

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, CommandFactory};
use clap_complete::Shell;
use tracing::info;

use crate::cli::output::{self, path_style};
use crate::cli::{Cli, OutputFormat};

/// Print or save a completion script for the strongroom CLI
#[derive(Debug, Args)]
pub struct CompletionsCommand {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Save the script to this file instead of printing it
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CompletionsCommand {
    /// Execute the completions command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(shell = %self.shell, "executing completions command");

        let Some(path) = &self.output else {
            let mut stdout = std::io::stdout().lock();
            write_script(self.shell, &mut stdout);
            stdout.flush()?;
            return Ok(());
        };

        let mut script = Vec::new();
        write_script(self.shell, &mut script);
        std::fs::write(path, &script)?;

        match cli.format {
            OutputFormat::Json => output::json(&serde_json::json!({
                "shell": self.shell.to_string(),
                "path": path.display().to_string(),
            })),
            OutputFormat::Text => {
                if !cli.quiet {
                    output::success(&format!(
                        "Saved {} completions to {}",
                        self.shell,
                        path_style().apply_to(path.display())
                    ));
                }
                Ok(())
            }
        }
    }
}

fn write_script(shell: Shell, out: &mut dyn Write) {
    clap_complete::generate(shell, &mut Cli::command(), "strongroom", out);
}

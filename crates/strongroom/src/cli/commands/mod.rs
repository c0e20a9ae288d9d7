//! CLI commands

mod completions;
mod init;
mod secret;
mod vault;

pub use completions::CompletionsCommand;
pub use init::InitCommand;
pub use secret::SecretCommand;
pub use vault::VaultCommand;

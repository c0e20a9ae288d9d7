//! Default configuration values

use super::types::Config;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "strongroom.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "strongroom.yaml";

/// Default directory holding vaults, relative to the data dir
pub const DEFAULT_VAULTS_DIR: &str = "vaults";

/// Branch every new vault starts on
pub const DEFAULT_BRANCH: &str = "main";

/// Email used on auto-commits
pub const DEFAULT_AUTHOR_EMAIL: &str = "vault@strongroom.local";

/// Capability advertised by the upload-pack service
pub const DEFAULT_CAPABILITY: &str = "side-band-64k";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".strongroom.toml",
        ".strongroom.yaml",
    ]
}

/// Generate default configuration TOML
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&Config::default())
        .unwrap_or_else(|_| DEFAULT_CONFIG_TEMPLATE.to_string())
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Strongroom configuration

[storage]
vaults_dir = "vaults"

[history]
default_branch = "main"
author_email = "vault@strongroom.local"

[transfer]
capability = "side-band-64k"
"#;

//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

use super::defaults::config_file_names;
use super::types::Config;
use super::validation::validate_config;

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<Config> {
    let format = if path
        .extension()
        .is_some_and(|e| e == "yaml" || e == "yml")
    {
        "YAML"
    } else {
        "TOML"
    };
    info!(path = %path.display(), format, "loading config");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let config: Config = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    validate_config(&config)?;
    debug!(path = %path.display(), "config loaded and validated");
    Ok(config)
}

/// Find a configuration file in `start_dir` or any of its parents.
///
/// Names are tried in the order given by [`config_file_names`]; the first
/// match in the nearest directory wins.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.exists() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Load configuration from directory (searching parent directories)
pub fn load_config_from_dir(dir: &Path) -> Result<(Config, PathBuf)> {
    let config_path = find_config(dir).ok_or_else(|| ConfigError::NotFound(dir.to_path_buf()))?;

    let config = load_config(&config_path)?;
    Ok((config, config_path))
}

/// Load configuration or use defaults
pub fn load_config_or_default(dir: &Path) -> (Config, Option<PathBuf>) {
    match load_config_from_dir(dir) {
        Ok((config, path)) => (config, Some(path)),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "no usable config found, using defaults");
            (Config::default(), None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("strongroom.toml");
        std::fs::write(&config_path, "[history]\ndefault_branch = \"main\"").unwrap();

        let found = find_config(temp.path());
        assert_eq!(found, Some(config_path));
    }

    #[test]
    fn test_find_config_prefers_toml_over_yaml() {
        let temp = TempDir::new().unwrap();
        let toml_path = temp.path().join("strongroom.toml");
        let yaml_path = temp.path().join("strongroom.yaml");
        std::fs::write(&toml_path, "[history]\ndefault_branch = \"main\"").unwrap();
        std::fs::write(&yaml_path, "history:\n  default_branch: main").unwrap();

        let found = find_config(temp.path()).unwrap();
        assert_eq!(found, toml_path);
    }

    #[test]
    fn test_find_config_in_parent() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(".strongroom.toml");
        std::fs::write(&config_path, "").unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config(&nested), Some(config_path));
    }

    #[test]
    fn test_load_config_toml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("strongroom.toml");
        std::fs::write(
            &config_path,
            "[storage]\nvaults_dir = \"v\"\n\n[history]\ndefault_branch = \"trunk\"\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.storage.vaults_dir, PathBuf::from("v"));
        assert_eq!(config.history.default_branch, "trunk");
    }

    #[test]
    fn test_load_config_yaml() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("strongroom.yaml");
        std::fs::write(
            &config_path,
            "transfer:\n  agent: peer/1.0\n  capability: side-band-64k\n",
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.transfer.agent, "peer/1.0");
    }

    #[test]
    fn test_load_invalid_config_fails() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("strongroom.toml");
        std::fs::write(&config_path, "[history]\ndefault_branch = \"\"\n").unwrap();

        assert!(load_config(&config_path).is_err());
    }
}

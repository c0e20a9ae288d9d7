//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::defaults::{
    DEFAULT_AUTHOR_EMAIL, DEFAULT_BRANCH, DEFAULT_CAPABILITY, DEFAULT_VAULTS_DIR,
};

/// Main configuration for Strongroom
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage layout
    pub storage: StorageConfig,

    /// History log settings
    pub history: HistoryConfig,

    /// Transfer protocol settings
    pub transfer: TransferConfig,
}

/// Where vaults live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the storage layer
    pub data_dir: PathBuf,

    /// Directory under `data_dir` holding one subdirectory per vault
    pub vaults_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("strongroom"),
            vaults_dir: PathBuf::from(DEFAULT_VAULTS_DIR),
        }
    }
}

/// How auto-commits are recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Branch new vaults start on
    pub default_branch: String,

    /// Email recorded next to the vault name on every commit
    pub author_email: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_branch: DEFAULT_BRANCH.to_string(),
            author_email: DEFAULT_AUTHOR_EMAIL.to_string(),
        }
    }
}

/// Ref advertisement settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Agent string advertised with the first ref
    pub agent: String,

    /// Capability token advertised with the first ref
    pub capability: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            agent: format!("strongroom/{}", env!("CARGO_PKG_VERSION")),
            capability: DEFAULT_CAPABILITY.to_string(),
        }
    }
}

impl TransferConfig {
    /// Capability string appended after the NUL on the first advertised ref
    pub fn capability_line(&self) -> String {
        format!("{} agent={}", self.capability, self.agent)
    }
}

//! Core types for Strongroom

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Directory inside every vault reserved for vault metadata
pub const METADATA_DIR: &str = ".vault";

/// File inside [`METADATA_DIR`] holding [`VaultMetadata`]
pub const METADATA_FILE: &str = "metadata.json";

/// Kind of change an auto-commit records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A new secret was written
    Added,
    /// An existing secret was overwritten
    Modified,
    /// A secret was deleted
    Removed,
}

impl ChangeKind {
    /// Returns the string representation of the change marker
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }

    /// Whether the path must be staged for deletion rather than added
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Removed)
    }

    /// Commit message recorded for a change to `secret`
    pub fn commit_message(&self, secret: &str) -> String {
        let verb = match self {
            Self::Added => "Add",
            Self::Modified => "Update",
            Self::Removed => "Remove",
        };
        format!("{verb} secret: {secret}")
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "added" => Ok(Self::Added),
            "modified" => Ok(Self::Modified),
            "removed" => Ok(Self::Removed),
            _ => Err(format!("Unknown change kind: {}", s)),
        }
    }
}

/// Persisted per-vault metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMetadata {
    /// Public keys authorized to pull the vault
    #[serde(rename = "sharedPubKeys", default)]
    pub shared_pub_keys: BTreeSet<String>,
}

impl VaultMetadata {
    /// Parse metadata from its JSON document
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Serialize metadata to its JSON document
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

/// Check that `name` can be used as a vault or secret name.
///
/// Names become single path components in storage, and dot-prefixed names
/// are reserved for the history log, metadata and temporary files.
pub fn validate_name(name: &str) -> Result<(), VaultError> {
    let reason = if name.trim().is_empty() {
        Some("name cannot be empty or blank")
    } else if name.starts_with('.') || name.to_ascii_lowercase().starts_with("git~") {
        // `git~1` is the NTFS short name of `.git`.
        Some("names starting with '.' or 'git~' are reserved")
    } else if name.contains(['/', '\\', '\0']) {
        Some("name cannot contain path separators or NUL")
    } else if name.contains(['<', '>', '\n']) {
        // Vault names become commit author names.
        Some("name cannot contain angle brackets or newlines")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(VaultError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_parse() {
        assert_eq!("added".parse::<ChangeKind>().unwrap(), ChangeKind::Added);
        assert_eq!("REMOVED".parse::<ChangeKind>().unwrap(), ChangeKind::Removed);
        assert!("renamed".parse::<ChangeKind>().is_err());
    }

    #[test]
    fn test_commit_messages() {
        assert_eq!(ChangeKind::Added.commit_message("db"), "Add secret: db");
        assert_eq!(ChangeKind::Modified.commit_message("db"), "Update secret: db");
        assert_eq!(ChangeKind::Removed.commit_message("db"), "Remove secret: db");
        assert!(ChangeKind::Removed.is_removal());
        assert!(!ChangeKind::Modified.is_removal());
    }

    #[test]
    fn test_metadata_json_shape() {
        let mut meta = VaultMetadata::default();
        meta.shared_pub_keys.insert("key-b".to_string());
        meta.shared_pub_keys.insert("key-a".to_string());

        let value: serde_json::Value = serde_json::from_slice(&meta.to_json().unwrap()).unwrap();
        assert_eq!(value, serde_json::json!({ "sharedPubKeys": ["key-a", "key-b"] }));

        let parsed = VaultMetadata::from_json(&meta.to_json().unwrap()).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_metadata_tolerates_missing_field() {
        let meta = VaultMetadata::from_json(b"{}").unwrap();
        assert!(meta.shared_pub_keys.is_empty());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("ASecret").is_ok());
        assert!(validate_name("42").is_ok());
        assert!(validate_name("db-password.prod").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(" ").is_err());
        assert!(validate_name("\t\n").is_err());
        assert!(validate_name("GIT~1").is_err());
        assert!(validate_name("digit~1").is_ok());
        assert!(validate_name(".git").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("<ops>").is_err());
    }
}

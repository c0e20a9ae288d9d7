//! Git types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use strongroom_core::ChangeKind;

/// Information about one history log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Commit hash (full)
    pub hash: String,
    /// Short hash (first 7 characters)
    pub short_hash: String,
    /// Commit message (first line)
    pub message: String,
    /// Change marker recorded with the commit, if any
    pub change: Option<ChangeKind>,
    /// Author name; the vault name for auto-commits
    pub author: String,
    /// Commit timestamp
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// Create a new CommitInfo
    pub fn new(
        hash: impl Into<String>,
        message: impl Into<String>,
        author: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let hash = hash.into();
        let short_hash = hash.chars().take(7).collect();

        Self {
            hash,
            short_hash,
            message: message.into(),
            change: None,
            author: author.into(),
            timestamp,
        }
    }

    /// Set the change marker
    pub fn with_change(mut self, change: Option<ChangeKind>) -> Self {
        self.change = change;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_info() {
        let commit = CommitInfo::new("abc1234567890", "Add secret: x", "vault", Utc::now())
            .with_change(Some(ChangeKind::Added));
        assert_eq!(commit.short_hash, "abc1234");
        assert_eq!(commit.message, "Add secret: x");
        assert_eq!(commit.change, Some(ChangeKind::Added));
    }
}

//! Auto-commits and commit history

use std::path::Path;

use chrono::{TimeZone, Utc};
use git2::{Oid, Signature, Sort};
use tracing::{debug, instrument};

use strongroom_core::ChangeKind;

use crate::repository::{GitRepo, Result};
use crate::types::CommitInfo;

/// Trailer carrying the change marker in commit bodies
pub(crate) const CHANGE_TRAILER: &str = "Change-Kind";

impl GitRepo {
    /// Stage one path and record it as a single commit on HEAD.
    ///
    /// Removals are staged as deletions so the path does not linger in the
    /// tree. The commit message is derived from `change` and the path.
    #[instrument(skip(self, email), fields(path = %path.display(), change = %change))]
    pub fn commit_change(
        &self,
        path: &Path,
        change: ChangeKind,
        author: &str,
        email: &str,
    ) -> Result<Oid> {
        let mut index = self.repo.index()?;
        if change.is_removal() {
            index.remove_path(path)?;
        } else {
            index.add_path(path)?;
        }
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let parent = self.head_commit()?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let message = format!(
            "{}\n\n{}: {}\n",
            change.commit_message(&path.to_string_lossy()),
            CHANGE_TRAILER,
            change
        );
        let sig = Signature::now(author, email)?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, &message, &tree, &parents)?;

        debug!(commit = %oid, "recorded commit");
        Ok(oid)
    }

    /// Reset the index entry for `path` to what HEAD records.
    ///
    /// Undoes the staging half of a `commit_change` that failed before the
    /// ref moved. On an unborn branch the entry is dropped.
    pub fn unstage(&self, path: &Path) -> Result<()> {
        let head = self.head_commit()?;
        self.repo
            .reset_default(head.as_ref().map(|commit| commit.as_object()), [path])?;
        debug!(path = %path.display(), "unstaged path");
        Ok(())
    }

    /// Commits reachable from HEAD, most recent first.
    ///
    /// An empty log yields an empty list. `depth` bounds the number of
    /// entries returned.
    pub fn history(&self, depth: Option<usize>) -> Result<Vec<CommitInfo>> {
        let Some(head) = self.head_oid()? else {
            return Ok(Vec::new());
        };

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push(head)?;

        let mut commits = Vec::new();
        for oid in revwalk.take(depth.unwrap_or(usize::MAX)) {
            let commit = self.repo.find_commit(oid?)?;
            commits.push(commit_to_info(&commit));
        }

        Ok(commits)
    }
}

/// Convert a git2 Commit to CommitInfo
fn commit_to_info(commit: &git2::Commit<'_>) -> CommitInfo {
    let author = commit.author();

    let message = commit.summary().unwrap_or("(no message)").to_string();

    let change = commit.body().and_then(|body| {
        body.lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(key, _)| key.trim() == CHANGE_TRAILER)
            .and_then(|(_, value)| value.trim().parse().ok())
    });

    let timestamp = Utc
        .timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or_else(Utc::now);

    CommitInfo::new(
        commit.id().to_string(),
        message,
        author.name().unwrap_or("Unknown"),
        timestamp,
    )
    .with_change(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, GitRepo) {
        let temp = TempDir::new().unwrap();
        let repo = GitRepo::init(temp.path(), "main").unwrap();
        (temp, repo)
    }

    #[test]
    fn test_empty_history() {
        let (_temp, repo) = setup_repo();
        assert!(repo.history(None).unwrap().is_empty());
    }

    #[test]
    fn test_commit_change_sequence() {
        let (temp, repo) = setup_repo();

        std::fs::write(temp.path().join("token"), "a").unwrap();
        repo.commit_change(Path::new("token"), ChangeKind::Added, "ops", "ops@test")
            .unwrap();
        std::fs::write(temp.path().join("token"), "b").unwrap();
        repo.commit_change(Path::new("token"), ChangeKind::Modified, "ops", "ops@test")
            .unwrap();
        std::fs::remove_file(temp.path().join("token")).unwrap();
        repo.commit_change(Path::new("token"), ChangeKind::Removed, "ops", "ops@test")
            .unwrap();

        let history = repo.history(None).unwrap();
        let messages: Vec<_> = history.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["Remove secret: token", "Update secret: token", "Add secret: token"]
        );
        assert_eq!(history[0].change, Some(ChangeKind::Removed));
        assert_eq!(history[2].change, Some(ChangeKind::Added));
        assert_eq!(history[0].author, "ops");
        assert!(repo.is_clean().unwrap());
    }

    #[test]
    fn test_removed_path_leaves_tree() {
        let (temp, repo) = setup_repo();

        std::fs::write(temp.path().join("a"), "1").unwrap();
        repo.commit_change(Path::new("a"), ChangeKind::Added, "v", "v@test")
            .unwrap();
        std::fs::remove_file(temp.path().join("a")).unwrap();
        repo.commit_change(Path::new("a"), ChangeKind::Removed, "v", "v@test")
            .unwrap();

        let head = repo.head_commit().unwrap().unwrap();
        assert_eq!(head.tree().unwrap().len(), 0);
    }

    #[test]
    fn test_unstage_drops_uncommitted_entry() {
        let (temp, repo) = setup_repo();
        std::fs::write(temp.path().join("a"), "1").unwrap();
        repo.commit_change(Path::new("a"), ChangeKind::Added, "v", "v@test")
            .unwrap();

        std::fs::write(temp.path().join("a"), "2").unwrap();
        std::fs::write(temp.path().join("b"), "3").unwrap();
        let mut index = repo.inner().index().unwrap();
        index.add_path(Path::new("a")).unwrap();
        index.add_path(Path::new("b")).unwrap();
        index.write().unwrap();

        repo.unstage(Path::new("a")).unwrap();
        repo.unstage(Path::new("b")).unwrap();
        std::fs::write(temp.path().join("a"), "1").unwrap();
        std::fs::remove_file(temp.path().join("b")).unwrap();
        assert!(repo.is_clean().unwrap());
        assert_eq!(repo.history(None).unwrap().len(), 1);
    }

    #[test]
    fn test_unstage_on_unborn_branch() {
        let (temp, repo) = setup_repo();
        std::fs::write(temp.path().join("a"), "1").unwrap();
        let mut index = repo.inner().index().unwrap();
        index.add_path(Path::new("a")).unwrap();
        index.write().unwrap();

        repo.unstage(Path::new("a")).unwrap();
        assert!(repo.inner().index().unwrap().is_empty());
    }

    #[test]
    fn test_history_depth() {
        let (temp, repo) = setup_repo();
        for name in ["a", "b", "c"] {
            std::fs::write(temp.path().join(name), name).unwrap();
            repo.commit_change(Path::new(name), ChangeKind::Added, "v", "v@test")
                .unwrap();
        }

        let history = repo.history(Some(2)).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "Add secret: c");
        assert_eq!(history[1].message, "Add secret: b");
    }
}

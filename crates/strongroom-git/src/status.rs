//! Repository status operations

use crate::repository::{GitRepo, Result};

impl GitRepo {
    /// Check if the working directory is clean (no uncommitted changes)
    pub fn is_clean(&self) -> Result<bool> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(statuses.is_empty())
    }

    /// Get the current branch name.
    ///
    /// A branch that has no commits yet still counts: HEAD names it
    /// symbolically. Returns `None` only for a detached HEAD.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                return Ok(head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(|s| s.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            // Detached HEAD
            Ok(None)
        }
    }
}

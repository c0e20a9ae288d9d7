//! History log repository operations

use std::path::{Path, PathBuf};

use git2::{Oid, Repository, RepositoryInitOptions};
use tracing::{info, instrument};

use strongroom_core::error::GitError;
use strongroom_core::METADATA_DIR;

/// Result type for git operations
pub type Result<T> = std::result::Result<T, GitError>;

/// Paths kept out of the history log
const EXCLUDES: &str = "/.vault/\n/.tmp*\n";

/// Git repository backing one vault's history log
pub struct GitRepo {
    pub(crate) repo: Repository,
    path: PathBuf,
}

impl GitRepo {
    /// Open the history log at the given path
    #[instrument(fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::RepositoryNotFound(path.to_path_buf())
            } else {
                GitError::OpenFailed(e.to_string())
            }
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            repo,
        })
    }

    /// Initialize an empty history log whose HEAD points at `branch`.
    ///
    /// The vault metadata directory and temporary files are excluded so
    /// they never show up as changes.
    #[instrument(fields(path = %path.display(), branch))]
    pub fn init(path: &Path, branch: &str) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(branch).mkpath(true);

        let repo = Repository::init_opts(path, &opts).map_err(|e| GitError::InitFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let exclude = repo.path().join("info").join("exclude");
        std::fs::create_dir_all(repo.path().join("info"))
            .and_then(|()| std::fs::write(&exclude, EXCLUDES))
            .map_err(|e| GitError::InitFailed {
                path: path.to_path_buf(),
                reason: format!("cannot write {}: {e}", exclude.display()),
            })?;

        info!(path = %path.display(), branch, metadata_dir = METADATA_DIR, "initialized history log");
        Ok(Self {
            path: path.to_path_buf(),
            repo,
        })
    }

    /// Whether a history log exists at `path`
    pub fn exists(path: &Path) -> bool {
        path.join(".git").is_dir()
    }

    /// Get the repository path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a reference to the inner git2 Repository
    pub fn inner(&self) -> &Repository {
        &self.repo
    }

    /// Entry HEAD currently points at, or `None` before the first commit
    pub fn head_oid(&self) -> Result<Option<Oid>> {
        match self.repo.head() {
            Ok(head) => Ok(head.target()),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                Ok(None)
            }
            Err(e) => Err(GitError::Git2(e)),
        }
    }

    /// Get the HEAD commit
    pub fn head_commit(&self) -> Result<Option<git2::Commit<'_>>> {
        match self.head_oid()? {
            Some(oid) => Ok(Some(self.repo.find_commit(oid)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_and_open() {
        let temp = TempDir::new().unwrap();
        let repo = GitRepo::init(temp.path(), "main").unwrap();
        assert!(GitRepo::exists(temp.path()));
        assert_eq!(repo.head_oid().unwrap(), None);

        let reopened = GitRepo::open(temp.path()).unwrap();
        assert!(!reopened.inner().is_bare());
    }

    #[test]
    fn test_init_writes_excludes() {
        let temp = TempDir::new().unwrap();
        let repo = GitRepo::init(temp.path(), "main").unwrap();

        std::fs::create_dir_all(temp.path().join(".vault")).unwrap();
        std::fs::write(temp.path().join(".vault/metadata.json"), "{}").unwrap();
        assert!(repo
            .inner()
            .status_should_ignore(Path::new(".vault/metadata.json"))
            .unwrap());
    }

    #[test]
    fn test_not_a_repo() {
        let temp = TempDir::new().unwrap();
        let result = GitRepo::open(temp.path());
        assert!(matches!(result, Err(GitError::RepositoryNotFound(_))));
    }
}

//! Applying fetched history

use std::io::Write;

use git2::build::CheckoutBuilder;
use git2::Oid;
use tracing::{info, instrument};

use crate::repository::{GitRepo, Result};
use strongroom_core::error::GitError;

/// What a fast-forward did to a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastForward {
    /// Branch already pointed at the target
    UpToDate,
    /// Branch moved forward
    Advanced { from: Option<Oid>, to: Oid },
}

impl GitRepo {
    /// Write a fetched pack into the object database
    #[instrument(skip(self, pack), fields(pack_bytes = pack.len()))]
    pub fn index_pack(&self, pack: &[u8]) -> Result<()> {
        let odb = self.repo.odb()?;
        let mut writer = odb.packwriter()?;
        writer
            .write_all(pack)
            .map_err(|e| GitError::TransferFailed(format!("cannot index pack: {e}")))?;
        writer.commit()?;
        Ok(())
    }

    /// Move `branch` forward to `target` without merging.
    ///
    /// Fails with [`GitError::NonFastForward`] unless the branch is unborn or
    /// `target` descends from its current tip. A branch already ahead of
    /// `target` is left alone. If HEAD is on `branch` the
    /// working tree is checked out to match, so files deleted upstream
    /// disappear locally.
    #[instrument(skip(self), fields(branch, target = %target))]
    pub fn fast_forward(&self, branch: &str, target: Oid) -> Result<FastForward> {
        let start = std::time::Instant::now();
        let ref_name = format!("refs/heads/{branch}");
        let current = match self.repo.find_reference(&ref_name) {
            Ok(reference) => reference.target(),
            Err(e) if e.code() == git2::ErrorCode::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if current == Some(target) {
            return Ok(FastForward::UpToDate);
        }
        if let Some(local) = current {
            if self.repo.graph_descendant_of(local, target)? {
                return Ok(FastForward::UpToDate);
            }
            if !self.repo.graph_descendant_of(target, local)? {
                return Err(GitError::NonFastForward {
                    branch: branch.to_string(),
                    local: local.to_string(),
                    remote: target.to_string(),
                });
            }
        }

        self.repo.find_commit(target)?;
        self.repo
            .reference(&ref_name, target, true, "pull: fast-forward")?;

        if self.current_branch()?.as_deref() == Some(branch) {
            self.repo
                .checkout_head(Some(CheckoutBuilder::new().force()))?;
        }

        info!(
            branch,
            from = ?current.map(|o| o.to_string()),
            to = %target,
            duration_ms = start.elapsed().as_millis(),
            "fast-forwarded branch"
        );
        Ok(FastForward::Advanced {
            from: current,
            to: target,
        })
    }
}

//! Branch operations

use git2::{build::CheckoutBuilder, BranchType};
use tracing::{info, instrument};

use monopub_core::error::GitError;

use crate::repository::{GitRepo, Result};

impl GitRepo {
    /// Get the current branch name, `None` when HEAD is detached or unborn
    pub fn branch_name(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(|s| s.to_string()))
        } else {
            // Detached HEAD
            Ok(None)
        }
    }

    /// Check out an existing local branch.
    ///
    /// Uses a safe checkout, so local modifications that would be
    /// overwritten make it fail instead of being discarded.
    #[instrument(skip(self))]
    pub fn checkout(&self, branch: &str) -> Result<()> {
        let failed = |reason: String| GitError::CheckoutFailed {
            branch: branch.to_string(),
            reason,
        };

        let local = self
            .repo
            .find_branch(branch, BranchType::Local)
            .map_err(|e| failed(e.message().to_string()))?;
        let reference = local.get();
        let refname = reference
            .name()
            .ok_or_else(|| failed("branch name is not valid UTF-8".to_string()))?
            .to_string();
        let commit = reference.peel_to_commit()?;

        let mut checkout = CheckoutBuilder::new();
        checkout.safe();
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut checkout))
            .map_err(|e| failed(e.message().to_string()))?;
        self.repo
            .set_head(&refname)
            .map_err(|e| failed(e.message().to_string()))?;

        info!(branch, "checked out branch");
        Ok(())
    }
}

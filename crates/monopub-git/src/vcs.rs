//! `VersionControl` implementation

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};

use monopub_core::traits::VersionControl;

use crate::repository::GitRepo;

impl VersionControl for GitRepo {
    fn current_branch(&self) -> monopub_core::Result<Option<String>> {
        Ok(self.branch_name()?)
    }

    fn count_commits(
        &self,
        path: &Path,
        since: Option<DateTime<FixedOffset>>,
        exclude: &[PathBuf],
        marker: &str,
    ) -> monopub_core::Result<usize> {
        Ok(self.count_commits_touching(path, since, exclude, marker)?)
    }

    fn checkout_branch(&self, branch: &str) -> monopub_core::Result<()> {
        Ok(self.checkout(branch)?)
    }

    fn commit_files(&self, files: &[PathBuf], message: &str) -> monopub_core::Result<String> {
        Ok(self.commit_paths(files, message)?)
    }

    fn create_tag(&self, name: &str, message: &str) -> monopub_core::Result<()> {
        self.tag_head(name, message)?;
        Ok(())
    }
}

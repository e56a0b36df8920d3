//! Tag operations

use tracing::{info, instrument};

use monopub_core::error::GitError;

use crate::repository::{GitRepo, Result};

impl GitRepo {
    /// Whether a tag with this name exists
    pub fn tag_exists(&self, name: &str) -> Result<bool> {
        let tag_ref = format!("refs/tags/{}", name);

        match self.repo.find_reference(&tag_ref) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
            Err(e) => Err(GitError::Git2(e)),
        }
    }

    /// Create an annotated tag on HEAD
    #[instrument(skip(self, message), fields(name))]
    pub fn tag_head(&self, name: &str, message: &str) -> Result<String> {
        if self.tag_exists(name)? {
            return Err(GitError::TagExists(name.to_string()));
        }

        let head = self.head_commit()?.ok_or(GitError::NoCommits)?;
        let sig = self.repo.signature()?;
        let oid = self
            .repo
            .tag(name, head.as_object(), &sig, message, false)
            .map_err(|e| GitError::TagCreationFailed {
                name: name.to_string(),
                reason: e.message().to_string(),
            })?;

        info!(name, target = %head.id(), "created tag");
        Ok(oid.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixture::{commit_file, init};

    #[test]
    fn test_annotated_tag() {
        let (temp, raw) = init();
        let head = commit_file(&raw, "packages/core/package.json", "{}", "release", 1_000);
        let repo = GitRepo::open(temp.path()).unwrap();

        repo.tag_head("@acme/core-v1.0.1-beta", "@acme/core: v1.0.1-beta").unwrap();
        assert!(repo.tag_exists("@acme/core-v1.0.1-beta").unwrap());

        let reference = raw.find_reference("refs/tags/@acme/core-v1.0.1-beta").unwrap();
        let tag = reference.peel_to_tag().unwrap();
        assert_eq!(tag.message().map(str::trim_end), Some("@acme/core: v1.0.1-beta"));
        assert_eq!(tag.target_id(), head);
    }

    #[test]
    fn test_tag_already_exists() {
        let (temp, raw) = init();
        commit_file(&raw, "a.txt", "a", "init", 1_000);
        let repo = GitRepo::open(temp.path()).unwrap();

        repo.tag_head("core-v1.0.0", "core: v1.0.0").unwrap();
        let result = repo.tag_head("core-v1.0.0", "core: v1.0.0");
        assert!(matches!(result, Err(GitError::TagExists(_))));
    }

    #[test]
    fn test_tag_needs_a_commit() {
        let (temp, _raw) = init();
        let repo = GitRepo::open(temp.path()).unwrap();
        assert!(matches!(repo.tag_head("v1", "v1"), Err(GitError::NoCommits)));
    }
}

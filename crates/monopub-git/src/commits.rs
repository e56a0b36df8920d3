//! Commit history and the release commit

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use git2::{DiffOptions, Sort};
use tracing::{debug, info, instrument};

use monopub_core::error::GitError;

use crate::repository::{GitRepo, Result};

impl GitRepo {
    /// Count commits reachable from HEAD that change something under `path`.
    ///
    /// Only commits made after `since` count. Commits whose message contains
    /// `marker` are ignored, and so are commits that only touch files in
    /// `exclude`. Each commit is compared against its first parent.
    #[instrument(skip(self, exclude), fields(path = %path.display()))]
    pub fn count_commits_touching(
        &self,
        path: &Path,
        since: Option<DateTime<FixedOffset>>,
        exclude: &[PathBuf],
        marker: &str,
    ) -> Result<usize> {
        let Some(head) = self.head_commit()? else {
            return Ok(0);
        };

        let prefix = self.relative_path(path)?;
        let excluded: HashSet<String> = exclude
            .iter()
            .map(|p| self.relative_path(p))
            .collect::<Result<_>>()?;
        let since = since.map(|t| t.timestamp());

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push(head.id())?;

        let mut count = 0;
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;

            if since.is_some_and(|since| commit.time().seconds() <= since) {
                continue;
            }
            if !marker.is_empty() && commit.message().is_some_and(|m| m.contains(marker)) {
                continue;
            }

            if self.touches(&commit, &prefix, &excluded)? {
                count += 1;
            }
        }

        debug!(path = %prefix, count, "counted commits");
        Ok(count)
    }

    fn touches(&self, commit: &git2::Commit<'_>, prefix: &str, excluded: &HashSet<String>) -> Result<bool> {
        let tree = commit.tree()?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };

        let mut opts = DiffOptions::new();
        if !prefix.is_empty() {
            opts.pathspec(prefix);
        }
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;

        let touched = diff.deltas().any(|delta| {
            [delta.new_file().path(), delta.old_file().path()]
                .into_iter()
                .flatten()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .any(|p| within(&p, prefix) && !excluded.contains(&p))
        });
        Ok(touched)
    }

    /// Stage `files` and commit them on HEAD; returns the new commit id
    #[instrument(skip(self, files, message), fields(files = files.len()))]
    pub fn commit_paths(&self, files: &[PathBuf], message: &str) -> Result<String> {
        let mut index = self.repo.index()?;
        for file in files {
            let rel = self.relative_path(file)?;
            index
                .add_path(Path::new(&rel))
                .map_err(|e| GitError::CommitFailed(format!("cannot stage {}: {}", rel, e.message())))?;
        }
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = self
            .repo
            .signature()
            .map_err(|e| GitError::CommitFailed(format!("no committer identity: {}", e.message())))?;

        let parent = self.head_commit()?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .map_err(|e| GitError::CommitFailed(e.message().to_string()))?;

        info!(commit = %oid, "created commit");
        Ok(oid.to_string())
    }
}

fn within(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixture::{commit_file, init};
    use chrono::TimeZone;

    const DAY: i64 = 86_400;

    fn open(temp: &tempfile::TempDir) -> GitRepo {
        GitRepo::open(temp.path()).unwrap()
    }

    #[test]
    fn test_empty_repo_has_no_commits() {
        let (temp, _repo) = init();
        let repo = open(&temp);
        let count = repo
            .count_commits_touching(Path::new("packages/core"), None, &[], "monopub release:")
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_count_scoped_to_package() {
        let (temp, raw) = init();
        commit_file(&raw, "packages/core/index.js", "1", "feat: core", DAY);
        commit_file(&raw, "packages/app/index.js", "1", "feat: app", 2 * DAY);
        commit_file(&raw, "packages/core/util.js", "1", "fix: core", 3 * DAY);
        // Sibling directory sharing the prefix
        commit_file(&raw, "packages/core-extra/index.js", "1", "feat: extra", 4 * DAY);
        let repo = open(&temp);

        let core = temp.path().join("packages/core");
        assert_eq!(repo.count_commits_touching(&core, None, &[], "monopub release:").unwrap(), 2);

        let since = FixedOffset::east_opt(0).unwrap().timestamp_opt(2 * DAY, 0).unwrap();
        assert_eq!(
            repo.count_commits_touching(&core, Some(since), &[], "monopub release:").unwrap(),
            1
        );
    }

    #[test]
    fn test_release_commits_and_manifest_are_ignored() {
        let (temp, raw) = init();
        commit_file(&raw, "packages/core/package.json", "{}", "chore: manifest", DAY);
        commit_file(&raw, "packages/core/index.js", "1", "monopub release: core: v1.0.1", 2 * DAY);
        let repo = open(&temp);

        let core = temp.path().join("packages/core");
        let exclude = vec![core.join("package.json")];
        assert_eq!(
            repo.count_commits_touching(&core, None, &exclude, "monopub release:").unwrap(),
            0
        );
        assert_eq!(repo.count_commits_touching(&core, None, &[], "").unwrap(), 2);
    }

    #[test]
    fn test_commit_paths() {
        let (temp, raw) = init();
        commit_file(&raw, "packages/core/package.json", "{}", "init", DAY);
        std::fs::write(temp.path().join("packages/core/package.json"), "{\"version\":\"1.0.1\"}").unwrap();
        std::fs::write(temp.path().join("untracked.txt"), "x").unwrap();
        let repo = open(&temp);

        let id = repo
            .commit_paths(
                &[temp.path().join("packages/core/package.json")],
                "monopub release: core: v1.0.1",
            )
            .unwrap();

        let head = raw.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.id().to_string(), id);
        assert_eq!(head.message(), Some("monopub release: core: v1.0.1"));
        assert_eq!(head.parent_count(), 1);
        // Only the listed file is committed
        assert!(head.tree().unwrap().get_path(Path::new("untracked.txt")).is_err());
    }

    #[test]
    fn test_within() {
        assert!(within("packages/core/a.js", "packages/core"));
        assert!(!within("packages/core-extra/a.js", "packages/core"));
        assert!(within("anything", ""));
    }
}

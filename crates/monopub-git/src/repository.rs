//! Git repository operations

use std::path::{Path, PathBuf};

use git2::Repository;
use tracing::{debug, info, instrument};

use monopub_core::error::GitError;

/// Result type for git operations
pub type Result<T> = std::result::Result<T, GitError>;

/// Git repository wrapper
pub struct GitRepo {
    pub(crate) repo: Repository,
    path: PathBuf,
}

impl GitRepo {
    /// Open a repository at the given path
    #[instrument(fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "opening git repository");
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

    /// Discover and open a repository by searching parent directories
    #[instrument(fields(start_path = %start_path.display()))]
    pub fn discover(start_path: &Path) -> Result<Self> {
        info!(start_path = %start_path.display(), "discovering git repository");
        let repo = Repository::discover(start_path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::NotARepository(start_path.to_path_buf())
            } else {
                GitError::OpenFailed(e.to_string())
            }
        })?;

        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();

        Ok(Self { repo, path })
    }

    /// Get the repository path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the HEAD commit, `None` before the first commit
    pub fn head_commit(&self) -> Result<Option<git2::Commit<'_>>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(head.peel_to_commit()?))
    }

    /// Path relative to the working tree, with forward slashes.
    ///
    /// Relative inputs are taken as already relative to the working tree.
    pub fn relative_path(&self, path: &Path) -> Result<String> {
        if path.is_relative() {
            return Ok(normalize(path));
        }

        let workdir = self
            .repo
            .workdir()
            .ok_or_else(|| GitError::OutsideWorkTree(path.to_path_buf()))?;

        if let Ok(rel) = path.strip_prefix(workdir) {
            return Ok(normalize(rel));
        }

        // Symlinked temp directories (e.g. /var -> /private/var)
        let canonical_workdir = workdir.canonicalize().map_err(|_| GitError::OutsideWorkTree(path.to_path_buf()))?;
        let canonical = path
            .canonicalize()
            .map_err(|_| GitError::OutsideWorkTree(path.to_path_buf()))?;
        let rel = canonical
            .strip_prefix(&canonical_workdir)
            .map_err(|_| GitError::OutsideWorkTree(path.to_path_buf()))?;
        debug!(path = %path.display(), relative = %rel.display(), "resolved through canonical paths");
        Ok(normalize(rel))
    }
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
pub(crate) mod fixture {
    use std::path::Path;

    use git2::{Repository, Signature, Time};
    use tempfile::TempDir;

    /// Fresh repository with a committer identity configured
    pub fn init() -> (TempDir, Repository) {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Test").unwrap();
        config.set_str("user.email", "test@example.com").unwrap();
        (temp, repo)
    }

    /// Write `rel` and commit it at `seconds` since the epoch
    pub fn commit_file(repo: &Repository, rel: &str, content: &str, message: &str, seconds: i64) -> git2::Oid {
        let workdir = repo.workdir().unwrap();
        let path = workdir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(rel)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();

        let sig = Signature::new("Test", "test@example.com", &Time::new(seconds, 0)).unwrap();
        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => Vec::new(),
        };
        let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }
}

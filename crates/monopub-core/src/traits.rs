//! Collaborator traits
//!
//! The release logic only talks to git, the registry and the package
//! manager through these traits. Every call gets its working directory or
//! path explicitly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::ReleaseKind;

/// Version-control operations used during a release
pub trait VersionControl {
    /// Currently checked-out branch, `None` when HEAD is detached
    fn current_branch(&self) -> Result<Option<String>>;

    /// Count commits touching `path` after `since` (all history when `None`).
    ///
    /// Commits whose only changes under `path` are to files in `exclude`,
    /// and commits whose message contains `marker`, are not counted.
    fn count_commits(
        &self,
        path: &Path,
        since: Option<DateTime<FixedOffset>>,
        exclude: &[PathBuf],
        marker: &str,
    ) -> Result<usize>;

    /// Check out an existing local branch
    fn checkout_branch(&self, branch: &str) -> Result<()>;

    /// Stage the given files and commit them; returns the commit id
    fn commit_files(&self, files: &[PathBuf], message: &str) -> Result<String>;

    /// Create an annotated tag on HEAD
    fn create_tag(&self, name: &str, message: &str) -> Result<()>;
}

/// Registry metadata for a published package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Package name
    pub name: String,
    /// Highest published version
    pub version: Option<String>,
    /// Distribution tags and the versions they point to
    pub dist_tags: BTreeMap<String, String>,
    /// License
    pub license: Option<String>,
    /// Author display name
    pub author: Option<String>,
    /// First publish time
    pub created: Option<DateTime<FixedOffset>>,
    /// Last modification (publish) time
    pub modified: Option<DateTime<FixedOffset>>,
    /// Unpacked size of the latest tarball in bytes
    pub unpacked_size: Option<u64>,
}

impl ReleaseInfo {
    /// Version behind the `latest` tag, falling back to the highest version
    pub fn latest_version(&self) -> Option<&str> {
        self.dist_tags
            .get("latest")
            .map(String::as_str)
            .or(self.version.as_deref())
    }
}

/// Package registry queries
pub trait Registry {
    /// Look up a package; `Ok(None)` when it was never published
    fn release_info(&self, name: &str) -> Result<Option<ReleaseInfo>>;
}

/// Options for a single publish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// `--tag <dist-tag>`
    pub dist_tag: Option<String>,
    /// `--dry-run`
    pub dry_run: bool,
    /// Appended verbatim
    pub extra_args: Vec<String>,
}

impl PublishOptions {
    /// Arguments following `publish`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--no-git-checks".to_string(),
            "--access".to_string(),
            "public".to_string(),
        ];
        if let Some(tag) = &self.dist_tag {
            args.push("--tag".to_string());
            args.push(tag.clone());
        }
        if self.dry_run {
            args.push("--dry-run".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Package manager operations run inside a package directory
pub trait PackageTool {
    /// Increment the manifest version without touching git
    fn bump_version(&self, dir: &Path, kind: ReleaseKind) -> Result<()>;

    /// Run a script declared in the manifest
    fn run_script(&self, dir: &Path, script: &str) -> Result<()>;

    /// Publish the package
    fn publish(&self, dir: &Path, options: &PublishOptions) -> Result<()>;
}

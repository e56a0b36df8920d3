//! Workspace root detection

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{DiscoveryError, Result};
use crate::manifest::MANIFEST_FILE;

/// File marking the root of a pnpm workspace
pub const WORKSPACE_MARKER: &str = "pnpm-workspace.yaml";

/// A located workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Root path of the workspace
    pub root: PathBuf,
    /// Absolute packages directory
    pub packages_dir: PathBuf,
    /// Scan nested directories under `packages_dir`
    pub include_descendants: bool,
}

impl Workspace {
    /// Create a workspace rooted at `root`
    pub fn new(root: PathBuf, config: &Config) -> Self {
        let packages_dir = root.join(&config.packages_dir);
        Self {
            root,
            packages_dir,
            include_descendants: config.include_descendants,
        }
    }

    /// Walk up from `start` to the first directory containing the marker file
    pub fn find_root(start: &Path) -> Result<PathBuf> {
        debug!(start = %start.display(), "searching for workspace root");
        let mut current = start.to_path_buf();

        loop {
            if current.join(WORKSPACE_MARKER).is_file() {
                debug!(root = %current.display(), "found workspace root");
                return Ok(current);
            }
            if !current.pop() {
                break;
            }
        }

        Err(DiscoveryError::WorkspaceNotFound(start.to_path_buf()).into())
    }

    /// Path of the root package.json
    pub fn root_manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Package globs declared in the marker file
    pub fn declared_patterns(&self) -> Vec<String> {
        #[derive(Deserialize)]
        struct PnpmWorkspace {
            packages: Option<Vec<String>>,
        }

        let path = self.root.join(WORKSPACE_MARKER);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read workspace marker");
                return Vec::new();
            }
        };

        match serde_yaml::from_str::<Option<PnpmWorkspace>>(&content) {
            Ok(parsed) => parsed.and_then(|ws| ws.packages).unwrap_or_default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot parse workspace marker");
                Vec::new()
            }
        }
    }

    /// Packages directory relative to the root, with forward slashes
    pub fn relative_packages_dir(&self) -> String {
        self.packages_dir
            .strip_prefix(&self.root)
            .unwrap_or(&self.packages_dir)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Warn when the marker file doesn't mention the packages directory
    pub fn check_declared_patterns(&self) {
        let patterns = self.declared_patterns();
        if patterns.is_empty() {
            return;
        }
        let dir = self.relative_packages_dir();
        let covered = patterns
            .iter()
            .any(|p| p.trim_start_matches("./").starts_with(dir.as_str()));
        if !covered {
            warn!(
                packages_dir = %dir,
                patterns = ?patterns,
                "packages directory is not listed in {}", WORKSPACE_MARKER
            );
        }
    }
}

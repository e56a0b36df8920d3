//! Package discovery in the workspace

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use glob::glob;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ExcludeRule;
use crate::error::{ConfigError, DiscoveryError, Result};
use crate::manifest::{PackageManifest, MANIFEST_FILE};

use super::changes::ChangeState;
use super::workspace::Workspace;

/// A discovered package and the state derived for it during this run
#[derive(Debug, Clone, Serialize)]
pub struct PackageRecord {
    /// Package name
    pub name: String,
    /// Directory relative to the packages directory, `/`-separated
    pub dir_name: String,
    /// Absolute package directory
    pub full_path: PathBuf,
    /// Version as read from the manifest
    pub version: String,
    /// Package description
    pub description: Option<String>,
    /// Declared scripts
    #[serde(skip)]
    pub scripts: HashMap<String, String>,
    /// Workspace packages this one depends on
    pub dependencies: Vec<String>,
    /// Whether this is a private package
    pub private: bool,
    /// Last publish time
    pub last_publish: Option<DateTime<FixedOffset>>,
    /// Change state, recomputed every run
    pub change_state: ChangeState,
    /// Commits since the last publish
    pub new_commits: Option<usize>,
    /// Commits over the whole history
    pub total_commits: Option<usize>,
}

impl PackageRecord {
    /// Build a record from a loaded manifest; `None` when the manifest has no name
    pub fn from_manifest(manifest: &PackageManifest, dir_name: &str) -> Option<Self> {
        let name = manifest.name()?.to_string();
        let full_path = manifest
            .path()
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();

        let version = match manifest.version() {
            Some(v) => v.to_string(),
            None => {
                debug!(package = %name, "manifest has no version, assuming 0.0.0");
                "0.0.0".to_string()
            }
        };

        Some(Self {
            name,
            dir_name: dir_name.to_string(),
            full_path,
            version,
            description: manifest.description().map(str::to_string),
            scripts: manifest.scripts(),
            dependencies: manifest.workspace_dependencies(),
            private: manifest.is_private(),
            last_publish: manifest.last_publish(),
            change_state: ChangeState::default(),
            new_commits: None,
            total_commits: None,
        })
    }

    /// Path to the package manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.full_path.join(MANIFEST_FILE)
    }

    /// Whether the package needs a release
    pub fn is_dirty(&self) -> bool {
        self.change_state.is_dirty()
    }
}

/// Package discovery for a workspace
pub struct PackageDiscovery {
    workspace: Workspace,
    excludes: Vec<ExcludeRule>,
}

impl PackageDiscovery {
    /// Create a new package discovery instance
    pub fn new(workspace: Workspace, excludes: &[String]) -> Result<Self> {
        let excludes = excludes
            .iter()
            .map(|entry| {
                ExcludeRule::parse(entry).map_err(|message| ConfigError::InvalidValue {
                    field: "excludes".to_string(),
                    message,
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            workspace,
            excludes,
        })
    }

    /// The workspace being scanned
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Discover all packages, in directory order
    pub fn discover(&self) -> Result<Vec<PackageRecord>> {
        debug!(
            packages_dir = %self.workspace.packages_dir.display(),
            descendants = self.workspace.include_descendants,
            "discovering packages"
        );

        let mut packages: Vec<PackageRecord> = Vec::new();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        for dir in self.package_dirs()? {
            let dir_name = self.dir_name(&dir);
            if self.is_excluded(None, &dir_name) {
                debug!(dir = %dir_name, "directory excluded");
                continue;
            }

            let manifest_path = dir.join(MANIFEST_FILE);
            let manifest = match PackageManifest::load(&manifest_path) {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %manifest_path.display(), error = %e, "skipping package");
                    continue;
                }
            };

            let Some(record) = PackageRecord::from_manifest(&manifest, &dir_name) else {
                debug!(dir = %dir_name, "manifest has no name, skipping");
                continue;
            };

            if self.is_excluded(Some(&record.name), &dir_name) {
                debug!(package = %record.name, "package excluded");
                continue;
            }

            if let Some(first) = seen.get(&record.name) {
                let err = DiscoveryError::DuplicateName {
                    name: record.name.clone(),
                    first: first.clone(),
                    second: record.full_path.clone(),
                };
                warn!(error = %err, "skipping package");
                continue;
            }

            seen.insert(record.name.clone(), record.full_path.clone());
            packages.push(record);
        }

        // Only keep edges to packages that were actually discovered
        let names: HashSet<String> = packages.iter().map(|p| p.name.clone()).collect();
        for pkg in &mut packages {
            let own = pkg.name.clone();
            pkg.dependencies.retain(|dep| {
                let keep = *dep != own && names.contains(dep);
                if !keep {
                    debug!(package = %own, dependency = %dep, "dropping unresolved workspace dependency");
                }
                keep
            });
        }

        info!(count = packages.len(), "discovered packages");
        Ok(packages)
    }

    fn is_excluded(&self, name: Option<&str>, dir_name: &str) -> bool {
        self.excludes.iter().any(|rule| rule.matches(name, dir_name))
    }

    fn dir_name(&self, dir: &Path) -> String {
        dir.strip_prefix(&self.workspace.packages_dir)
            .unwrap_or(dir)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Directories under the packages directory that hold a manifest
    fn package_dirs(&self) -> Result<Vec<PathBuf>> {
        let root = &self.workspace.packages_dir;
        if !root.is_dir() {
            warn!(path = %root.display(), "packages directory does not exist");
            return Ok(Vec::new());
        }

        if self.workspace.include_descendants {
            return Ok(Self::nested_package_dirs(root));
        }

        let pattern = format!(
            "{}/*/{}",
            glob::Pattern::escape(&root.to_string_lossy()),
            MANIFEST_FILE
        );

        let mut dirs = Vec::new();
        let entries = glob(&pattern).map_err(|e| ConfigError::InvalidValue {
            field: "packages_dir".to_string(),
            message: e.to_string(),
        })?;
        for entry in entries {
            match entry {
                Ok(manifest) => {
                    if let Some(dir) = manifest.parent() {
                        dirs.push(dir.to_path_buf());
                    }
                }
                Err(e) => warn!(error = %e, "unreadable path while scanning packages"),
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    fn nested_package_dirs(root: &Path) -> Vec<PathBuf> {
        WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !(e.file_type().is_dir() && (name == "node_modules" || name.starts_with('.')))
            })
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(error = %err, "unreadable path while scanning packages");
                    None
                }
            })
            .filter(|e| e.file_type().is_dir() && e.path().join(MANIFEST_FILE).is_file())
            .map(|e| e.into_path())
            .collect()
    }
}

/// Write a package manifest under `<root>/packages/<dir>` for tests
#[cfg(test)]
pub(crate) fn write_package(root: &Path, dir: &str, manifest: serde_json::Value) -> PathBuf {
    let path = root.join("packages").join(dir);
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(
        path.join(MANIFEST_FILE),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
    path
}

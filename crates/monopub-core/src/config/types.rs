//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::ReleaseKind;

use super::defaults::{DEFAULT_BUILD_SCRIPT, DEFAULT_PACKAGES_DIR, DEFAULT_RELEASE_SCRIPT, DEFAULT_REPORT};

/// Main configuration for monopub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the packages, relative to the workspace root
    pub packages_dir: PathBuf,

    /// Scan nested package directories instead of only direct children
    pub include_descendants: bool,

    /// Packages to leave alone; `name:<pkg>`, `dir:<dir>` or a bare entry matching either
    pub excludes: Vec<String>,

    /// Run the build script before publishing
    pub build: bool,

    /// Script run by the build step when the package declares it
    pub build_script: String,

    /// Script name `init` adds to each package
    pub release_script: String,

    /// Version increment applied to each released package
    pub release_kind: ReleaseKind,

    /// Distribution tag passed to `pnpm publish --tag`
    pub dist_tag: Option<String>,

    /// Branch to release from
    pub release_branch: Option<String>,

    /// Create an annotated tag after the release commit
    pub git_tag: bool,

    /// Report file; the extension picks Markdown or JSON
    pub report: PathBuf,

    /// Extra arguments appended to `pnpm publish`
    pub publish_args: Vec<String>,

    /// Publish packages even when nothing changed
    pub force: bool,

    /// Simulate the release and restore every manifest afterwards
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            packages_dir: PathBuf::from(DEFAULT_PACKAGES_DIR),
            include_descendants: false,
            excludes: Vec::new(),
            build: true,
            build_script: DEFAULT_BUILD_SCRIPT.to_string(),
            release_script: DEFAULT_RELEASE_SCRIPT.to_string(),
            release_kind: ReleaseKind::default(),
            dist_tag: None,
            release_branch: None,
            git_tag: false,
            report: PathBuf::from(DEFAULT_REPORT),
            publish_args: Vec::new(),
            force: false,
            dry_run: false,
        }
    }
}

/// Settings for one release run, fixed once the run starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseConfig {
    /// Version increment
    pub release_kind: ReleaseKind,
    /// Whether the build step may run
    pub build: bool,
    /// Build script name
    pub build_script: String,
    /// Distribution tag; `latest` is the registry default and is stored as `None`
    pub dist_tag: Option<String>,
    /// Simulation mode
    pub dry_run: bool,
    /// Publish clean and unknown packages too
    pub force: bool,
    /// Extra publish arguments
    pub publish_args: Vec<String>,
    /// Create a tag after the release commit
    pub git_tag: bool,
}

impl ReleaseConfig {
    /// Derive the run settings from a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        let dist_tag = config
            .dist_tag
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty() && *tag != "latest")
            .map(str::to_string);

        Self {
            release_kind: config.release_kind,
            build: config.build,
            build_script: config.build_script.clone(),
            dist_tag,
            dry_run: config.dry_run,
            force: config.force,
            publish_args: config.publish_args.clone(),
            git_tag: config.git_tag,
        }
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One entry of `excludes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExcludeRule {
    /// `name:<package name>`
    Name(String),
    /// `dir:<directory relative to the packages dir>`
    Dir(String),
    /// Bare entry, matching a package name or a directory
    Any(String),
}

impl ExcludeRule {
    /// Parse an `excludes` entry
    pub fn parse(entry: &str) -> std::result::Result<Self, String> {
        let entry = entry.trim();
        let rule = match entry.split_once(':') {
            Some(("name", value)) => Self::Name(value.trim().to_string()),
            Some(("dir", value)) => Self::Dir(value.trim().trim_end_matches('/').to_string()),
            Some((prefix, _)) => {
                return Err(format!("unknown prefix '{}' in '{}' (expected name: or dir:)", prefix, entry))
            }
            None => Self::Any(entry.trim_end_matches('/').to_string()),
        };

        if rule.value().is_empty() {
            return Err(format!("empty exclusion entry '{}'", entry));
        }
        Ok(rule)
    }

    /// The name or directory this rule matches
    pub fn value(&self) -> &str {
        match self {
            Self::Name(v) | Self::Dir(v) | Self::Any(v) => v,
        }
    }

    /// Whether the rule matches a package with this name and directory
    pub fn matches(&self, name: Option<&str>, dir: &str) -> bool {
        match self {
            Self::Name(v) => name == Some(v.as_str()),
            Self::Dir(v) => dir == v,
            Self::Any(v) => dir == v || name == Some(v.as_str()),
        }
    }
}

//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{ConfigError, Result};
use crate::manifest::{PackageManifest, MANIFEST_FILE};

use super::defaults::{config_file_names, MANIFEST_CONFIG_KEY};
use super::types::Config;
use super::validation::validate_config;

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A monopub.toml / monopub.yaml file
    File(PathBuf),
    /// The `"monopub"` key of the workspace root package.json
    WorkspaceManifest(PathBuf),
    /// Nothing found
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::WorkspaceManifest(path) => write!(f, "{} (\"{}\" key)", path.display(), MANIFEST_CONFIG_KEY),
            Self::Defaults => write!(f, "defaults"),
        }
    }
}

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<Config> {
    let format = if path.extension().is_some_and(|e| e == "toml") {
        "TOML"
    } else {
        "YAML"
    };
    info!(path = %path.display(), format, "loading config");

    let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

    let config: Config = if format == "TOML" {
        toml::from_str(&content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(&content).map_err(ConfigError::YamlError)?
    };

    validate_config(&config)?;
    debug!(path = %path.display(), "config loaded and validated");
    Ok(config)
}

/// Find configuration file in directory or parent directories.
///
/// The first match wins. Parents are walked until the filesystem root.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for config file");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.is_file() {
                info!(path = %config_path.display(), "found config file");
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    debug!("no config file found");
    None
}

/// Read the `"monopub"` key of the package.json in `root`, if there is one
pub fn load_manifest_config(root: &Path) -> Result<Option<Config>> {
    let manifest_path = root.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Ok(None);
    }

    let manifest = PackageManifest::load(&manifest_path)?;
    let Some(value) = manifest.get(MANIFEST_CONFIG_KEY) else {
        return Ok(None);
    };

    let config: Config = serde_json::from_value(value.clone()).map_err(|e| {
        ConfigError::ParseError(format!("{} in {}: {}", MANIFEST_CONFIG_KEY, manifest_path.display(), e))
    })?;
    validate_config(&config)?;
    info!(path = %manifest_path.display(), "loaded config from workspace manifest");
    Ok(Some(config))
}

/// Load the configuration for a workspace.
///
/// A config file found from `start_dir` upward wins over the root
/// package.json key, which wins over the defaults.
pub fn load_workspace_config(start_dir: &Path, workspace_root: &Path) -> Result<(Config, ConfigSource)> {
    if let Some(path) = find_config(start_dir) {
        let config = load_config(&path)?;
        return Ok((config, ConfigSource::File(path)));
    }

    if let Some(config) = load_manifest_config(workspace_root)? {
        return Ok((config, ConfigSource::WorkspaceManifest(workspace_root.join(MANIFEST_FILE))));
    }

    debug!(root = %workspace_root.display(), "no config found, using defaults");
    Ok((Config::default(), ConfigSource::Defaults))
}

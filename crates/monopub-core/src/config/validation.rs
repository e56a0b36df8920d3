//! Configuration validation

use regex::Regex;
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::{Config, ExcludeRule};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_packages(config)?;
    validate_build(config)?;
    validate_report(config)?;
    validate_release(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

fn validate_packages(config: &Config) -> Result<()> {
    if config.packages_dir.as_os_str().is_empty() {
        return Err(invalid("packages_dir", "packages directory cannot be empty").into());
    }

    if config.packages_dir.is_absolute() {
        return Err(invalid("packages_dir", "must be relative to the workspace root").into());
    }

    for entry in &config.excludes {
        ExcludeRule::parse(entry).map_err(|message| invalid("excludes", message))?;
    }

    Ok(())
}

fn validate_build(config: &Config) -> Result<()> {
    if config.build && config.build_script.trim().is_empty() {
        return Err(invalid("build_script", "build script cannot be empty when build is enabled").into());
    }

    if config.release_script.trim().is_empty() {
        return Err(invalid("release_script", "release script name cannot be empty").into());
    }

    Ok(())
}

fn validate_report(config: &Config) -> Result<()> {
    let extension = config
        .report
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("md") | Some("json") => Ok(()),
        _ => Err(invalid("report", "report file must end in .md or .json").into()),
    }
}

fn validate_release(config: &Config) -> Result<()> {
    if let Some(tag) = &config.dist_tag {
        validate_dist_tag(tag)?;
    }

    if let Some(branch) = &config.release_branch {
        if branch.trim().is_empty() {
            return Err(invalid("release_branch", "release branch cannot be empty").into());
        }
    }

    Ok(())
}

/// Check a distribution tag the way the registry would
pub fn validate_dist_tag(tag: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$")
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    if !pattern.is_match(tag) {
        return Err(invalid("dist_tag", format!("'{}' is not a valid distribution tag", tag)).into());
    }

    // The registry refuses tags that could be mistaken for a version
    if semver::Version::parse(tag.trim_start_matches('v')).is_ok() {
        return Err(invalid("dist_tag", format!("'{}' looks like a version", tag)).into());
    }

    Ok(())
}

//! npm registry metadata via `npm view`

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use monopub_core::error::{RegistryError, Result};
use monopub_core::traits::{Registry, ReleaseInfo};

use crate::command::ToolCommand;

/// Reads package metadata with `npm view <name> --json`.
///
/// The command runs in the workspace root so that `.npmrc` registry
/// settings apply.
#[derive(Debug, Clone)]
pub struct NpmRegistry {
    npm: String,
    dir: PathBuf,
}

impl NpmRegistry {
    /// Query through `npm` from PATH, running in `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            npm: "npm".to_string(),
            dir: dir.into(),
        }
    }

    /// Use another npm executable
    pub fn with_program(mut self, npm: impl Into<String>) -> Self {
        self.npm = npm.into();
        self
    }
}

impl Registry for NpmRegistry {
    #[instrument(skip(self))]
    fn release_info(&self, name: &str) -> Result<Option<ReleaseInfo>> {
        let output = ToolCommand::new(&self.npm)
            .args(["view", name, "--json"])
            .output(&self.dir)?;

        if is_not_found(&output.stdout) || is_not_found(&output.stderr) {
            debug!(package = name, "not on the registry");
            return Ok(None);
        }
        if !output.success() {
            return Err(RegistryError::QueryFailed {
                package: name.to_string(),
                reason: output.combined(),
            }
            .into());
        }

        parse_view(name, &output.stdout)
    }
}

fn is_not_found(text: &str) -> bool {
    text.contains("E404")
}

#[derive(Debug, Deserialize)]
struct ViewDocument {
    name: Option<String>,
    version: Option<String>,
    #[serde(rename = "dist-tags", default)]
    dist_tags: BTreeMap<String, String>,
    license: Option<Value>,
    author: Option<Value>,
    #[serde(default)]
    time: BTreeMap<String, Value>,
    dist: Option<ViewDist>,
}

#[derive(Debug, Deserialize)]
struct ViewDist {
    #[serde(rename = "unpackedSize")]
    unpacked_size: Option<u64>,
}

/// Turn `npm view --json` output into release info.
///
/// Empty output means the package exists but has nothing published. When
/// several versions match, npm prints an array; the last entry wins.
pub fn parse_view(name: &str, stdout: &str) -> Result<Option<ReleaseInfo>> {
    let invalid = |reason: String| RegistryError::InvalidResponse {
        package: name.to_string(),
        reason,
    };

    if stdout.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(stdout).map_err(|e| invalid(e.to_string()))?;
    let value = match value {
        Value::Array(mut items) => match items.pop() {
            Some(last) => last,
            None => return Ok(None),
        },
        other => other,
    };
    if value.get("error").is_some() {
        return Err(invalid(value["error"].to_string()).into());
    }

    let doc: ViewDocument = serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;

    Ok(Some(ReleaseInfo {
        name: doc.name.unwrap_or_else(|| name.to_string()),
        version: doc.version,
        dist_tags: doc.dist_tags,
        license: doc.license.as_ref().and_then(text_or_field("type")),
        author: doc.author.as_ref().and_then(text_or_field("name")),
        created: timestamp(&doc.time, "created"),
        modified: timestamp(&doc.time, "modified"),
        unpacked_size: doc.dist.and_then(|d| d.unpacked_size),
    }))
}

/// A plain string, or the given field of an object (`{"name": ...}`)
fn text_or_field(field: &'static str) -> impl Fn(&Value) -> Option<String> {
    move |value| match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get(field).and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn timestamp(time: &BTreeMap<String, Value>, key: &str) -> Option<DateTime<FixedOffset>> {
    time.get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

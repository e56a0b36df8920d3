//! package.json handling
//!
//! The manifest is kept as an ordered JSON object so that saving it only
//! changes the fields monopub owns (`version`, `lastPublish`, `scripts`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{DiscoveryError, Result};

/// Manifest file name
pub const MANIFEST_FILE: &str = "package.json";

/// Tool-owned field holding the last publish time
pub const LAST_PUBLISH_FIELD: &str = "lastPublish";

/// Specifier prefix of intra-workspace dependencies
pub const WORKSPACE_PROTOCOL: &str = "workspace:";

/// Dependency maps scanned for workspace references
pub const DEPENDENCY_FIELDS: [&str; 4] = [
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

/// A package.json document
#[derive(Debug, Clone)]
pub struct PackageManifest {
    path: PathBuf,
    doc: Map<String, Value>,
}

impl PackageManifest {
    /// Load package.json from path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| DiscoveryError::ManifestNotFound(path.to_path_buf()))?;
        Self::parse(path, &content)
    }

    /// Parse manifest content that was read from `path`
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| DiscoveryError::ManifestParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        match value {
            Value::Object(doc) => Ok(Self {
                path: path.to_path_buf(),
                doc,
            }),
            _ => Err(DiscoveryError::ManifestParseError {
                path: path.to_path_buf(),
                reason: "top-level value is not an object".to_string(),
            }
            .into()),
        }
    }

    /// Save package.json back to the path it was loaded from
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.doc).map_err(|e| {
            DiscoveryError::ManifestUpdateError {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;

        std::fs::write(&self.path, format!("{}\n", content)).map_err(|e| {
            DiscoveryError::ManifestUpdateError {
                path: self.path.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Path of the manifest file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Package name
    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    /// Package version
    pub fn version(&self) -> Option<&str> {
        self.str_field("version")
    }

    /// Package description
    pub fn description(&self) -> Option<&str> {
        self.str_field("description")
    }

    /// Whether `"private": true` is set
    pub fn is_private(&self) -> bool {
        self.doc
            .get("private")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Declared scripts; non-string entries are ignored
    pub fn scripts(&self) -> HashMap<String, String> {
        self.doc
            .get("scripts")
            .and_then(Value::as_object)
            .map(|scripts| {
                scripts
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|cmd| (k.clone(), cmd.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up a single script
    pub fn script(&self, name: &str) -> Option<&str> {
        self.doc
            .get("scripts")
            .and_then(Value::as_object)
            .and_then(|scripts| scripts.get(name))
            .and_then(Value::as_str)
    }

    /// Names referenced with a `workspace:` specifier, in declaration order
    pub fn workspace_dependencies(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for field in DEPENDENCY_FIELDS {
            let Some(deps) = self.doc.get(field).and_then(Value::as_object) else {
                continue;
            };
            for (name, spec) in deps {
                let is_workspace = spec
                    .as_str()
                    .is_some_and(|s| s.starts_with(WORKSPACE_PROTOCOL));
                if is_workspace && !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Last publish time; an unparseable value counts as unknown
    pub fn last_publish(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.str_field(LAST_PUBLISH_FIELD)?;
        match DateTime::parse_from_rfc3339(raw) {
            Ok(time) => Some(time),
            Err(e) => {
                debug!(path = %self.path.display(), value = raw, error = %e, "ignoring unparseable lastPublish");
                None
            }
        }
    }

    /// Set the package version
    pub fn set_version(&mut self, version: &str) {
        self.doc
            .insert("version".to_string(), Value::String(version.to_string()));
    }

    /// Set `lastPublish`, formatted as RFC 3339 with the given offset
    pub fn set_last_publish(&mut self, time: DateTime<FixedOffset>) {
        self.doc.insert(
            LAST_PUBLISH_FIELD.to_string(),
            Value::String(time.to_rfc3339_opts(SecondsFormat::Secs, false)),
        );
    }

    /// Add or replace a script, creating the `scripts` map when missing
    pub fn set_script(&mut self, name: &str, command: &str) {
        let scripts = self
            .doc
            .entry("scripts")
            .or_insert_with(|| Value::Object(Map::new()));
        if !scripts.is_object() {
            *scripts = Value::Object(Map::new());
        }
        if let Value::Object(map) = scripts {
            map.insert(name.to_string(), Value::String(command.to_string()));
        }
    }

    /// Raw top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.doc.get(key)
    }

    /// Set a raw top-level field, keeping its position when it already exists
    pub fn set(&mut self, key: &str, value: Value) {
        self.doc.insert(key.to_string(), value);
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.doc.get(key).and_then(Value::as_str)
    }
}

/// Raw bytes of a manifest captured before a release, used for rollback
#[derive(Debug, Clone)]
pub struct ManifestSnapshot {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl ManifestSnapshot {
    /// Capture the current contents of `path`
    pub fn capture(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|_| DiscoveryError::ManifestNotFound(path.to_path_buf()))?;
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
        })
    }

    /// Write the captured bytes back
    pub fn restore(&self) -> Result<()> {
        debug!(path = %self.path.display(), "restoring manifest snapshot");
        std::fs::write(&self.path, &self.bytes).map_err(|e| {
            DiscoveryError::ManifestUpdateError {
                path: self.path.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

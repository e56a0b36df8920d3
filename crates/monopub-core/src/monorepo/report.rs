//! Version report written after each publish run

use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use tracing::info;

use crate::error::{ConfigError, Result};

use super::discovery::PackageRecord;

/// Output format of the report file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Markdown table
    Markdown,
    /// JSON object keyed by package name
    Json,
}

impl ReportFormat {
    /// Pick the format from the file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
            Some("md") => Ok(Self::Markdown),
            Some("json") => Ok(Self::Json),
            _ => Err(ConfigError::InvalidValue {
                field: "report".to_string(),
                message: format!("{} must end in .md or .json", path.display()),
            }
            .into()),
        }
    }
}

/// Where the report goes; simulations write `<stem>.test.<ext>` next to it
pub fn report_path(root: &Path, report: &Path, dry_run: bool) -> PathBuf {
    let path = if report.is_absolute() {
        report.to_path_buf()
    } else {
        root.join(report)
    };

    if !dry_run {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{}.test.{}", stem, ext.to_string_lossy()),
        None => format!("{}.test", stem),
    };
    path.with_file_name(file_name)
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Render the report for every package
pub fn render_report(packages: &[PackageRecord], format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Markdown => {
            let mut out = String::from("# Package Versions\n\n");
            out.push_str("| Package | Version | Last Publish | Description |\n");
            out.push_str("| --- | :---: | :---: | --- |\n");
            for pkg in packages {
                let last = pkg
                    .last_publish
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                out.push_str(&format!(
                    "| **{}** | {} | {} | {} |\n",
                    escape_cell(&pkg.name),
                    pkg.version,
                    last,
                    escape_cell(pkg.description.as_deref().unwrap_or(""))
                ));
            }
            Ok(out)
        }
        ReportFormat::Json => {
            let mut map = Map::new();
            for pkg in packages {
                map.insert(
                    pkg.name.clone(),
                    json!({
                        "name": pkg.name,
                        "version": pkg.version,
                        "description": pkg.description,
                        "lastPublish": pkg.last_publish.map(|t| t.to_rfc3339()),
                    }),
                );
            }
            let mut out = serde_json::to_string_pretty(&Value::Object(map))?;
            out.push('\n');
            Ok(out)
        }
    }
}

/// Render and write the report; returns the path written
pub fn write_report(root: &Path, report: &Path, packages: &[PackageRecord], dry_run: bool) -> Result<PathBuf> {
    let format = ReportFormat::from_path(report)?;
    let path = report_path(root, report, dry_run);
    let content = render_report(packages, format)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, content)?;
    info!(path = %path.display(), packages = packages.len(), "report written");
    Ok(path)
}

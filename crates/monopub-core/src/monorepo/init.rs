//! Script injection for `monopub init`

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{default_manifest_config, MANIFEST_CONFIG_KEY};
use crate::error::Result;
use crate::manifest::PackageManifest;

use super::discovery::PackageRecord;
use super::workspace::Workspace;

/// Command the injected scripts run
pub const RELEASE_COMMAND: &str = "monopub publish";

/// What happened to a package's release script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptChange {
    /// Script did not exist and was added
    Added,
    /// Appended to an existing script with `&&`
    Merged,
    /// Already runs monopub
    Unchanged,
}

/// Summary of an `init` run
#[derive(Debug, Default, Serialize)]
pub struct InitSummary {
    /// Per-package script changes
    pub packages: Vec<(String, ScriptChange)>,
    /// Packages whose manifest could not be updated
    pub failed: Vec<(String, String)>,
    /// Root scripts written
    pub root_scripts: Vec<String>,
    /// Whether the default configuration key was added to the root manifest
    pub config_added: bool,
}

/// Point `script_name` at monopub, keeping whatever the script already does
pub fn install_release_script(manifest: &mut PackageManifest, script_name: &str) -> ScriptChange {
    match manifest.script(script_name).map(str::trim) {
        Some(existing) if existing.contains("monopub") => ScriptChange::Unchanged,
        Some(existing) if !existing.is_empty() => {
            let merged = format!("{} && {}", existing, RELEASE_COMMAND);
            manifest.set_script(script_name, &merged);
            ScriptChange::Merged
        }
        _ => {
            manifest.set_script(script_name, RELEASE_COMMAND);
            ScriptChange::Added
        }
    }
}

/// Scripts added to the workspace root manifest
pub fn root_scripts(packages: &[PackageRecord]) -> Vec<(String, String)> {
    let mut scripts = vec![
        ("publish:test".to_string(), format!("{} --dry-run", RELEASE_COMMAND)),
        ("publish:auto".to_string(), RELEASE_COMMAND.to_string()),
    ];
    scripts.extend(
        packages
            .iter()
            .filter(|p| !p.private)
            .map(|p| (format!("publish:{}", p.name), format!("{} {}", RELEASE_COMMAND, p.name))),
    );
    scripts
}

/// Inject release scripts into every package and the workspace root
pub fn init_workspace(workspace: &Workspace, packages: &[PackageRecord], script_name: &str) -> Result<InitSummary> {
    let mut summary = InitSummary::default();

    for pkg in packages {
        let result = PackageManifest::load(&pkg.manifest_path()).and_then(|mut manifest| {
            let change = install_release_script(&mut manifest, script_name);
            if change != ScriptChange::Unchanged {
                manifest.save()?;
            }
            Ok(change)
        });
        match result {
            Ok(change) => {
                debug!(package = %pkg.name, change = ?change, "release script");
                summary.packages.push((pkg.name.clone(), change));
            }
            Err(e) => {
                warn!(package = %pkg.name, error = %e, "cannot inject release script");
                summary.failed.push((pkg.name.clone(), e.to_string()));
            }
        }
    }

    let mut root = PackageManifest::load(&workspace.root_manifest())?;
    for (name, command) in root_scripts(packages) {
        root.set_script(&name, &command);
        summary.root_scripts.push(name);
    }
    if root.get(MANIFEST_CONFIG_KEY).is_none() {
        root.set(MANIFEST_CONFIG_KEY, default_manifest_config());
        summary.config_added = true;
    }
    root.save()?;

    info!(
        packages = summary.packages.len(),
        failed = summary.failed.len(),
        config_added = summary.config_added,
        "workspace initialised"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_manifest_config, Config};
    use crate::monorepo::discovery::{write_package, PackageDiscovery};
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    fn manifest(path: &Path) -> PackageManifest {
        PackageManifest::load(&path.join("package.json")).unwrap()
    }

    #[test]
    fn test_install_release_script() {
        let mut fresh = PackageManifest::parse(Path::new("package.json"), r#"{"name": "a"}"#).unwrap();
        assert_eq!(install_release_script(&mut fresh, "release"), ScriptChange::Added);
        assert_eq!(fresh.script("release"), Some("monopub publish"));

        let mut existing = PackageManifest::parse(
            Path::new("package.json"),
            r#"{"name": "a", "scripts": {"release": "pnpm test"}}"#,
        )
        .unwrap();
        assert_eq!(install_release_script(&mut existing, "release"), ScriptChange::Merged);
        assert_eq!(existing.script("release"), Some("pnpm test && monopub publish"));

        // Running twice does not stack the command
        assert_eq!(install_release_script(&mut existing, "release"), ScriptChange::Unchanged);
        assert_eq!(existing.script("release"), Some("pnpm test && monopub publish"));
    }

    #[test]
    fn test_init_workspace() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("package.json"),
            r#"{"name": "root", "private": true, "scripts": {"lint": "eslint ."}}"#,
        )
        .unwrap();
        let core = write_package(temp.path(), "core", json!({"name": "@acme/core", "version": "1.0.0"}));
        write_package(
            temp.path(),
            "internal",
            json!({"name": "internal", "version": "0.1.0", "private": true}),
        );

        let config = Config::default();
        let workspace = Workspace::new(temp.path().to_path_buf(), &config);
        let packages = PackageDiscovery::new(workspace.clone(), &[]).unwrap().discover().unwrap();

        let summary = init_workspace(&workspace, &packages, "release").unwrap();
        assert_eq!(summary.packages.len(), 2);
        assert!(summary.config_added);
        assert_eq!(manifest(&core).script("release"), Some("monopub publish"));

        let root = manifest(temp.path());
        assert_eq!(root.script("lint"), Some("eslint ."));
        assert_eq!(root.script("publish:test"), Some("monopub publish --dry-run"));
        assert_eq!(root.script("publish:@acme/core"), Some("monopub publish @acme/core"));
        assert_eq!(root.script("publish:internal"), None);

        let loaded = load_manifest_config(temp.path()).unwrap().unwrap();
        assert_eq!(loaded, Config::default());

        // A second run keeps the existing configuration key
        let summary = init_workspace(&workspace, &packages, "release").unwrap();
        assert!(!summary.config_added);
        assert!(summary.packages.iter().all(|(_, c)| *c == ScriptChange::Unchanged));
    }
}

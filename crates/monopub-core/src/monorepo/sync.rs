//! Filling manifest fields from the registry

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::manifest::PackageManifest;
use crate::traits::Registry;

use super::discovery::PackageRecord;

/// Fill in `last_publish` for packages that have none, using the registry's
/// modification time. Written back to the manifest when `persist` is set.
///
/// Returns the packages whose lookup failed, keyed by name.
pub fn backfill_last_publish(
    packages: &mut [PackageRecord],
    registry: &dyn Registry,
    persist: bool,
) -> HashMap<String, String> {
    let mut failures = HashMap::new();

    for pkg in packages.iter_mut().filter(|p| p.last_publish.is_none() && !p.private) {
        let info = match registry.release_info(&pkg.name) {
            Ok(Some(info)) => info,
            Ok(None) => {
                debug!(package = %pkg.name, "never published");
                continue;
            }
            Err(e) => {
                warn!(package = %pkg.name, error = %e, "registry lookup failed");
                failures.insert(pkg.name.clone(), e.to_string());
                continue;
            }
        };

        let Some(modified) = info.modified else {
            continue;
        };
        pkg.last_publish = Some(modified);
        debug!(package = %pkg.name, last_publish = %modified, "last publish taken from registry");

        if persist {
            let result = PackageManifest::load(&pkg.manifest_path()).and_then(|mut manifest| {
                manifest.set_last_publish(modified);
                manifest.save()
            });
            if let Err(e) = result {
                warn!(package = %pkg.name, error = %e, "cannot record last publish time");
            }
        }
    }

    failures
}

/// What `sync` did to one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    /// Manifest updated from the registry
    Updated {
        /// `lastPublish` written
        last_publish: Option<String>,
        /// Version change, when the registry is ahead or behind
        version: Option<(String, String)>,
    },
    /// Already matching the registry
    UpToDate,
    /// Not on the registry
    NotPublished,
    /// Lookup or write failed
    Failed {
        /// Error message
        message: String,
    },
}

/// Copy `lastPublish` and the `latest` version from the registry into every manifest
pub fn sync_with_registry(packages: &mut [PackageRecord], registry: &dyn Registry) -> Vec<(String, SyncStatus)> {
    let mut results = Vec::with_capacity(packages.len());

    for pkg in packages.iter_mut() {
        let status = sync_one(pkg, registry);
        info!(package = %pkg.name, status = ?status, "synced");
        results.push((pkg.name.clone(), status));
    }

    results
}

fn sync_one(pkg: &mut PackageRecord, registry: &dyn Registry) -> SyncStatus {
    let info = match registry.release_info(&pkg.name) {
        Ok(Some(info)) => info,
        Ok(None) => return SyncStatus::NotPublished,
        Err(e) => {
            return SyncStatus::Failed {
                message: e.to_string(),
            }
        }
    };

    let mut manifest = match PackageManifest::load(&pkg.manifest_path()) {
        Ok(m) => m,
        Err(e) => {
            return SyncStatus::Failed {
                message: e.to_string(),
            }
        }
    };

    let mut last_publish = None;
    if let Some(modified) = info.modified {
        if pkg.last_publish != Some(modified) {
            manifest.set_last_publish(modified);
            pkg.last_publish = Some(modified);
            last_publish = Some(modified.to_rfc3339());
        }
    }

    let mut version = None;
    if let Some(latest) = info.latest_version() {
        if latest != pkg.version && semver::Version::parse(latest).is_ok() {
            manifest.set_version(latest);
            version = Some((pkg.version.clone(), latest.to_string()));
            pkg.version = latest.to_string();
        }
    }

    if last_publish.is_none() && version.is_none() {
        return SyncStatus::UpToDate;
    }

    match manifest.save() {
        Ok(()) => SyncStatus::Updated { last_publish, version },
        Err(e) => SyncStatus::Failed {
            message: e.to_string(),
        },
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeRegistry;
    use super::*;
    use crate::config::Config;
    use crate::monorepo::discovery::{write_package, PackageDiscovery};
    use crate::monorepo::workspace::Workspace;
    use crate::traits::ReleaseInfo;
    use chrono::DateTime;
    use serde_json::json;
    use tempfile::TempDir;

    fn scan(temp: &TempDir) -> Vec<PackageRecord> {
        let config = Config::default();
        PackageDiscovery::new(Workspace::new(temp.path().to_path_buf(), &config), &[])
            .unwrap()
            .discover()
            .unwrap()
    }

    fn registry() -> FakeRegistry {
        let mut registry = FakeRegistry::default();
        registry.packages.insert(
            "core".to_string(),
            ReleaseInfo {
                name: "core".to_string(),
                version: Some("1.1.0".to_string()),
                modified: Some(DateTime::parse_from_rfc3339("2024-02-03T04:05:06+00:00").unwrap()),
                ..ReleaseInfo::default()
            },
        );
        registry
    }

    #[test]
    fn test_backfill_persists() {
        let temp = TempDir::new().unwrap();
        let core = write_package(temp.path(), "core", json!({"name": "core", "version": "1.0.0"}));
        write_package(temp.path(), "fresh", json!({"name": "fresh", "version": "0.1.0"}));
        let mut packages = scan(&temp);

        let failures = backfill_last_publish(&mut packages, &registry(), true);
        assert!(packages[0].last_publish.is_some());
        // Never published is not a failure
        assert!(packages[1].last_publish.is_none());
        assert!(failures.is_empty());

        let manifest = PackageManifest::load(&core.join("package.json")).unwrap();
        assert_eq!(manifest.last_publish(), packages[0].last_publish);
        // Version is left alone by the backfill
        assert_eq!(manifest.version(), Some("1.0.0"));
    }

    #[test]
    fn test_backfill_without_persist_leaves_manifest() {
        let temp = TempDir::new().unwrap();
        let core = write_package(temp.path(), "core", json!({"name": "core", "version": "1.0.0"}));
        let before = std::fs::read(core.join("package.json")).unwrap();
        let mut packages = scan(&temp);

        backfill_last_publish(&mut packages, &registry(), false);
        assert!(packages[0].last_publish.is_some());
        assert_eq!(std::fs::read(core.join("package.json")).unwrap(), before);
    }

    #[test]
    fn test_backfill_survives_registry_errors() {
        let temp = TempDir::new().unwrap();
        write_package(temp.path(), "core", json!({"name": "core", "version": "1.0.0"}));
        let mut packages = scan(&temp);
        let registry = FakeRegistry {
            failing: vec!["core".to_string()],
            ..registry()
        };

        let failures = backfill_last_publish(&mut packages, &registry, true);
        assert!(packages[0].last_publish.is_none());
        assert!(failures["core"].contains("ETIMEDOUT"));
    }

    #[test]
    fn test_sync_updates_version_and_timestamp() {
        let temp = TempDir::new().unwrap();
        let core = write_package(temp.path(), "core", json!({"name": "core", "version": "1.0.0"}));
        write_package(temp.path(), "fresh", json!({"name": "fresh", "version": "0.1.0"}));
        let mut packages = scan(&temp);

        let results = sync_with_registry(&mut packages, &registry());
        assert_eq!(results.len(), 2);
        assert!(matches!(
            &results[0].1,
            SyncStatus::Updated { version: Some((from, to)), .. } if from == "1.0.0" && to == "1.1.0"
        ));
        assert_eq!(results[1].1, SyncStatus::NotPublished);

        let manifest = PackageManifest::load(&core.join("package.json")).unwrap();
        assert_eq!(manifest.version(), Some("1.1.0"));
        assert!(manifest.last_publish().is_some());

        // A second run has nothing left to do
        let mut packages = scan(&temp);
        let results = sync_with_registry(&mut packages, &registry());
        assert_eq!(results[0].1, SyncStatus::UpToDate);
    }
}

//! Scan, order and classify the packages of a workspace

use tracing::{info, instrument};

use crate::config::Config;
use crate::error::Result;
use crate::traits::{Registry, VersionControl};

use super::changes::ChangeDetector;
use super::discovery::{PackageDiscovery, PackageRecord};
use super::graph::DependencyGraph;
use super::publishing::RunContext;
use super::sync::backfill_last_publish;
use super::workspace::Workspace;

/// Packages in publish order with their change state
#[derive(Debug)]
pub struct WorkspaceAnalysis {
    /// Ordered package records
    pub packages: Vec<PackageRecord>,
    /// Dependency graph over the same packages
    pub graph: DependencyGraph,
}

/// Discover packages, order them, backfill missing publish times and
/// detect which ones need a release.
///
/// Cycles become warnings on `ctx`. The backfill only writes manifests
/// outside of dry runs. A package whose registry lookup failed ends up
/// `Unknown`, so it is only released when forced.
#[instrument(skip_all, fields(root = %workspace.root.display()))]
pub fn analyze_workspace(
    workspace: &Workspace,
    config: &Config,
    vcs: &dyn VersionControl,
    registry: &dyn Registry,
    ctx: &mut RunContext,
) -> Result<WorkspaceAnalysis> {
    workspace.check_declared_patterns();

    let discovery = PackageDiscovery::new(workspace.clone(), &config.excludes)?;
    let packages = discovery.discover()?;

    let graph = DependencyGraph::build(&packages);
    for cycle in graph.cycle_descriptions() {
        ctx.warn(format!("dependency cycle: {}", cycle));
    }

    let mut packages = graph.order_packages(packages);
    let lookup_failures = backfill_last_publish(&mut packages, registry, !config.dry_run);
    ChangeDetector::new(vcs)
        .with_lookup_failures(lookup_failures)
        .detect_and_propagate(&mut packages, &graph);

    info!(
        packages = packages.len(),
        dirty = packages.iter().filter(|p| p.is_dirty()).count(),
        "workspace analysed"
    );
    Ok(WorkspaceAnalysis { packages, graph })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monorepo::changes::fake::FakeVcs;
    use crate::monorepo::changes::ChangeState;
    use crate::monorepo::discovery::write_package;
    use crate::monorepo::sync::fake::FakeRegistry;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_analysis_orders_and_propagates() {
        let temp = TempDir::new().unwrap();
        write_package(
            temp.path(),
            "app",
            json!({"name": "app", "version": "1.0.0", "dependencies": {"core": "workspace:^"}}),
        );
        let core = write_package(temp.path(), "core", json!({"name": "core", "version": "1.0.0"}));
        let config = Config::default();
        let workspace = Workspace::new(temp.path().to_path_buf(), &config);
        let vcs = FakeVcs::default().with_count(core, 4);
        let mut ctx = RunContext::new(temp.path().to_path_buf());

        let analysis = analyze_workspace(&workspace, &config, &vcs, &FakeRegistry::default(), &mut ctx).unwrap();
        let names: Vec<&str> = analysis.packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["core", "app"]);
        assert!(analysis.packages.iter().all(|p| p.is_dirty()));
        assert!(ctx.warnings.is_empty());
    }

    #[test]
    fn test_registry_failure_leaves_package_unknown() {
        let temp = TempDir::new().unwrap();
        let core = write_package(temp.path(), "core", json!({"name": "core", "version": "1.0.0"}));
        write_package(
            temp.path(),
            "app",
            json!({"name": "app", "version": "1.0.0", "dependencies": {"core": "workspace:*"}}),
        );
        let config = Config::default();
        let workspace = Workspace::new(temp.path().to_path_buf(), &config);
        let vcs = FakeVcs::default().with_count(core, 5);
        let registry = FakeRegistry {
            failing: vec!["core".to_string()],
            ..FakeRegistry::default()
        };
        let mut ctx = RunContext::new(temp.path().to_path_buf());

        let analysis = analyze_workspace(&workspace, &config, &vcs, &registry, &mut ctx).unwrap();
        let core = &analysis.packages[0];
        assert_eq!(core.name, "core");
        assert!(
            matches!(&core.change_state, ChangeState::Unknown(msg) if msg.contains("ETIMEDOUT")),
            "got {:?}",
            core.change_state
        );
        assert_eq!(core.new_commits, Some(5));
        // Unknown does not make dependents dirty
        assert_eq!(analysis.packages[1].change_state, ChangeState::Clean);
    }

    #[test]
    fn test_cycles_become_warnings() {
        let temp = TempDir::new().unwrap();
        write_package(
            temp.path(),
            "a",
            json!({"name": "a", "version": "1.0.0", "dependencies": {"b": "workspace:*"}}),
        );
        write_package(
            temp.path(),
            "b",
            json!({"name": "b", "version": "1.0.0", "devDependencies": {"a": "workspace:*"}}),
        );
        let config = Config::default();
        let workspace = Workspace::new(temp.path().to_path_buf(), &config);
        let mut ctx = RunContext::new(temp.path().to_path_buf());

        let analysis =
            analyze_workspace(&workspace, &config, &FakeVcs::default(), &FakeRegistry::default(), &mut ctx).unwrap();
        assert_eq!(analysis.packages.len(), 2);
        assert!(analysis.graph.has_cycles());
        assert_eq!(ctx.warnings.len(), 1);
        assert!(ctx.warnings[0].contains("dependency cycle"));
    }
}

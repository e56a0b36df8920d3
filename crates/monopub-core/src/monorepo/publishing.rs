//! Batch publishing across the workspace

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{ReleaseConfig, RELEASE_COMMIT_MARKER};
use crate::error::{DiscoveryError, PipelineError, Result};
use crate::traits::{PackageTool, VersionControl};

use super::changes::ChangeState;
use super::discovery::PackageRecord;
use super::pipeline::{PipelineOutcome, ReleasePipeline};

/// Mutable state shared by the steps of one command run
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Workspace root
    pub workspace_root: PathBuf,
    /// Branch checked out before switching to the release branch
    pub original_branch: Option<String>,
    /// Problems worth showing the user at the end of the run
    pub warnings: Vec<String>,
}

impl RunContext {
    /// Create a context for a workspace
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            workspace_root,
            original_branch: None,
            warnings: Vec::new(),
        }
    }

    /// Log a warning and keep it for the end-of-run summary
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Reason why a package is skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Package is marked as private
    Private,
    /// Nothing changed since the last publish
    NoChanges,
    /// Commit history could not be read
    UnknownState(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Private => write!(f, "package is private"),
            Self::NoChanges => write!(f, "no changes"),
            Self::UnknownState(msg) => write!(f, "unknown change state: {}", msg),
        }
    }
}

/// Result for one package in the batch
#[derive(Debug)]
pub enum PackageStatus {
    /// Released
    Published(PipelineOutcome),
    /// Not attempted
    Skipped(SkipReason),
    /// A pipeline step failed
    Failed(PipelineError),
}

/// A package and what happened to it
#[derive(Debug)]
pub struct PackageOutcome {
    /// Package name
    pub package: String,
    /// What happened
    pub status: PackageStatus,
}

/// The aggregate release commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseCommit {
    /// Commit id
    pub id: String,
    /// Commit message
    pub message: String,
    /// Tag created on the commit
    pub tag: Option<String>,
}

/// Overall result of a batch
#[derive(Debug, Default)]
pub struct BatchResult {
    /// One entry per package, in publish order
    pub outcomes: Vec<PackageOutcome>,
    /// Release commit, when one was made
    pub commit: Option<ReleaseCommit>,
    /// Commit or tag failure; packages stay published
    pub commit_error: Option<String>,
    /// Whether this was a simulation
    pub dry_run: bool,
}

impl BatchResult {
    /// Successful pipeline runs
    pub fn published(&self) -> Vec<&PipelineOutcome> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                PackageStatus::Published(outcome) => Some(outcome),
                _ => None,
            })
            .collect()
    }

    /// Failed pipeline runs
    pub fn failed(&self) -> Vec<&PipelineError> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                PackageStatus::Failed(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    /// Skipped packages and why
    pub fn skipped(&self) -> Vec<(&str, &SkipReason)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                PackageStatus::Skipped(reason) => Some((o.package.as_str(), reason)),
                _ => None,
            })
            .collect()
    }

    /// No package failed and the commit went through
    pub fn success(&self) -> bool {
        self.failed().is_empty() && self.commit_error.is_none()
    }
}

/// Callback for publish events
pub trait PublishCallback {
    /// Called before releasing a package
    fn on_publish_start(&self, package: &str, version: &str);

    /// Called after a package's pipeline finished
    fn on_publish_complete(&self, package: &str, status: &PackageStatus);

    /// Called when a package is skipped
    fn on_skip(&self, package: &str, reason: &SkipReason);
}

/// Default no-op callback
pub struct NoOpCallback;

impl PublishCallback for NoOpCallback {
    fn on_publish_start(&self, _package: &str, _version: &str) {}
    fn on_publish_complete(&self, _package: &str, _status: &PackageStatus) {}
    fn on_skip(&self, _package: &str, _reason: &SkipReason) {}
}

/// Runs the release pipeline over an ordered package list
pub struct PublishCoordinator<'a> {
    config: &'a ReleaseConfig,
    tool: &'a dyn PackageTool,
    vcs: &'a dyn VersionControl,
    forced: HashSet<String>,
}

impl<'a> PublishCoordinator<'a> {
    /// Create a new publish coordinator
    pub fn new(config: &'a ReleaseConfig, tool: &'a dyn PackageTool, vcs: &'a dyn VersionControl) -> Self {
        Self {
            config,
            tool,
            vcs,
            forced: HashSet::new(),
        }
    }

    /// Release these packages even when they are clean
    pub fn with_forced(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.forced.extend(names);
        self
    }

    fn skip_reason(&self, pkg: &PackageRecord) -> Option<SkipReason> {
        if pkg.private {
            return Some(SkipReason::Private);
        }
        if self.config.force || self.forced.contains(&pkg.name) {
            return None;
        }
        match &pkg.change_state {
            ChangeState::Dirty(_) => None,
            ChangeState::Clean => Some(SkipReason::NoChanges),
            ChangeState::Unknown(msg) => Some(SkipReason::UnknownState(msg.clone())),
        }
    }

    /// Release every eligible package, then commit the touched manifests once
    pub fn execute(
        &self,
        packages: &mut [PackageRecord],
        ctx: &mut RunContext,
        callback: &dyn PublishCallback,
    ) -> BatchResult {
        info!(
            packages = packages.len(),
            dry_run = self.config.dry_run,
            force = self.config.force,
            "executing release batch"
        );

        let mut result = BatchResult {
            dry_run: self.config.dry_run,
            ..BatchResult::default()
        };
        let mut released: Vec<(PathBuf, String, String)> = Vec::new();
        let mut pipeline = ReleasePipeline::new(self.config, self.tool);

        for pkg in packages.iter_mut() {
            if let Some(reason) = self.skip_reason(pkg) {
                debug!(package = %pkg.name, reason = %reason, "skipping package");
                callback.on_skip(&pkg.name, &reason);
                result.outcomes.push(PackageOutcome {
                    package: pkg.name.clone(),
                    status: PackageStatus::Skipped(reason),
                });
                continue;
            }

            callback.on_publish_start(&pkg.name, &pkg.version);
            let status = match pipeline.run(pkg) {
                Ok(outcome) => {
                    released.push((pkg.manifest_path(), outcome.package.clone(), outcome.version.clone()));
                    PackageStatus::Published(outcome)
                }
                Err(err) => {
                    error!(package = %pkg.name, error = %err, "package release failed");
                    PackageStatus::Failed(err)
                }
            };
            callback.on_publish_complete(&pkg.name, &status);
            result.outcomes.push(PackageOutcome {
                package: pkg.name.clone(),
                status,
            });
        }

        if released.is_empty() {
            info!("nothing was published");
            return result;
        }

        if self.config.dry_run {
            debug!(count = released.len(), "dry run: skipping release commit");
            return result;
        }

        let dist_tag = self.config.dist_tag.as_deref();
        let entries: Vec<(&str, &str)> = released
            .iter()
            .map(|(_, name, version)| (name.as_str(), version.as_str()))
            .collect();
        let message = release_commit_message(&entries, dist_tag);
        let files: Vec<PathBuf> = released.iter().map(|(path, _, _)| path.clone()).collect();

        match self.vcs.commit_files(&files, &message) {
            Ok(id) => {
                info!(commit = %id, packages = files.len(), "release commit created");
                let mut commit = ReleaseCommit {
                    id,
                    message,
                    tag: None,
                };

                if self.config.git_tag {
                    let (name, version) = entries[0];
                    let tag = release_tag_name(name, version, dist_tag);
                    match self.vcs.create_tag(&tag, &release_lines(&entries, dist_tag)) {
                        Ok(()) => {
                            info!(tag = %tag, "release tag created");
                            commit.tag = Some(tag);
                        }
                        Err(e) => {
                            ctx.warn(format!("release tag {} was not created: {}", tag, e));
                            result.commit_error = Some(e.to_string());
                        }
                    }
                }
                result.commit = Some(commit);
            }
            Err(e) => {
                ctx.warn(format!("release commit failed, published manifests are uncommitted: {}", e));
                result.commit_error = Some(e.to_string());
            }
        }

        result
    }
}

/// `<name>: v<version>[-<dist-tag>]`, one line per package
pub fn release_lines(entries: &[(&str, &str)], dist_tag: Option<&str>) -> String {
    let suffix = dist_tag.map(|t| format!("-{}", t)).unwrap_or_default();
    entries
        .iter()
        .map(|(name, version)| format!("{}: v{}{}", name, version, suffix))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Message of the aggregate release commit
pub fn release_commit_message(entries: &[(&str, &str)], dist_tag: Option<&str>) -> String {
    let separator = if entries.len() > 1 { "\n" } else { "" };
    format!(
        "{} {}{}",
        RELEASE_COMMIT_MARKER,
        separator,
        release_lines(entries, dist_tag)
    )
}

/// Tag for a release, named after the first package published
pub fn release_tag_name(name: &str, version: &str, dist_tag: Option<&str>) -> String {
    match dist_tag {
        Some(tag) => format!("{}-v{}-{}", name, version, tag),
        None => format!("{}-v{}", name, version),
    }
}

/// Restrict the batch to the named packages, keeping publish order
pub fn select_packages(packages: Vec<PackageRecord>, names: &[String]) -> Result<Vec<PackageRecord>> {
    if names.is_empty() {
        return Ok(packages);
    }

    let known: HashSet<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    if let Some(missing) = names.iter().find(|n| !known.contains(n.as_str())) {
        return Err(DiscoveryError::UnknownPackage(missing.clone()).into());
    }

    Ok(packages
        .into_iter()
        .filter(|p| names.contains(&p.name))
        .collect())
}

/// Check out the release branch, remembering where we came from
pub fn switch_to_release_branch(vcs: &dyn VersionControl, branch: Option<&str>, ctx: &mut RunContext) -> Result<()> {
    let Some(branch) = branch else {
        return Ok(());
    };

    let current = vcs.current_branch()?;
    if current.as_deref() == Some(branch) {
        debug!(branch, "already on release branch");
        return Ok(());
    }

    info!(from = ?current, to = branch, "switching to release branch");
    vcs.checkout_branch(branch)?;
    ctx.original_branch = current;
    Ok(())
}

/// Go back to the branch recorded by [`switch_to_release_branch`]
pub fn restore_branch(vcs: &dyn VersionControl, ctx: &mut RunContext) {
    let Some(branch) = ctx.original_branch.take() else {
        return;
    };

    match vcs.checkout_branch(&branch) {
        Ok(()) => info!(branch = %branch, "restored original branch"),
        Err(e) => ctx.warn(format!("could not switch back to {}: {}", branch, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::manifest::PackageManifest;
    use crate::monorepo::changes::fake::FakeVcs;
    use crate::monorepo::changes::ChangeDetector;
    use crate::monorepo::discovery::{write_package, PackageDiscovery};
    use crate::monorepo::graph::DependencyGraph;
    use crate::monorepo::pipeline::fake::FakeTool;
    use crate::monorepo::report::{render_report, ReportFormat};
    use crate::monorepo::workspace::Workspace;
    use crate::types::ReleaseStep;
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    /// `core` at 1.0.0 and `app` at 1.2.0 depending on it
    fn workspace(temp: &TempDir) -> (PathBuf, PathBuf) {
        let core = write_package(temp.path(), "core", json!({"name": "core", "version": "1.0.0"}));
        let app = write_package(
            temp.path(),
            "app",
            json!({"name": "app", "version": "1.2.0", "dependencies": {"core": "workspace:*"}}),
        );
        (core, app)
    }

    fn scan(root: &Path, vcs: &FakeVcs) -> Vec<PackageRecord> {
        let config = Config::default();
        let discovery = PackageDiscovery::new(Workspace::new(root.to_path_buf(), &config), &config.excludes).unwrap();
        let packages = discovery.discover().unwrap();
        let graph = DependencyGraph::build(&packages);
        let mut packages = graph.order_packages(packages);
        ChangeDetector::new(vcs).detect_and_propagate(&mut packages, &graph);
        packages
    }

    fn manifest_version(dir: &Path) -> String {
        PackageManifest::load(&dir.join("package.json"))
            .unwrap()
            .version()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_clean_workspace_publishes_nothing() {
        let temp = TempDir::new().unwrap();
        workspace(&temp);
        let vcs = FakeVcs::default();
        let tool = FakeTool::default();
        let config = ReleaseConfig::default();
        let mut packages = scan(temp.path(), &vcs);
        let mut ctx = RunContext::new(temp.path().to_path_buf());

        let result = PublishCoordinator::new(&config, &tool, &vcs).execute(&mut packages, &mut ctx, &NoOpCallback);

        assert!(result.published().is_empty());
        assert_eq!(result.skipped().len(), 2);
        assert!(result.skipped().iter().all(|(_, r)| **r == SkipReason::NoChanges));
        assert!(vcs.commits.borrow().is_empty());
        assert!(tool.calls.borrow().is_empty());

        let report = render_report(&packages, ReportFormat::Markdown).unwrap();
        assert!(report.contains("| **core** | 1.0.0 |"));
        assert!(report.contains("| **app** | 1.2.0 |"));
    }

    #[test]
    fn test_dependency_change_publishes_both_in_order() {
        let temp = TempDir::new().unwrap();
        let (core, app) = workspace(&temp);
        let vcs = FakeVcs::default().with_count(core.clone(), 2);
        let tool = FakeTool::default();
        let config = ReleaseConfig::default();
        let mut packages = scan(temp.path(), &vcs);
        let mut ctx = RunContext::new(temp.path().to_path_buf());

        assert!(packages.iter().all(|p| p.is_dirty()));

        let result = PublishCoordinator::new(&config, &tool, &vcs).execute(&mut packages, &mut ctx, &NoOpCallback);

        let published: Vec<&str> = result.published().iter().map(|o| o.package.as_str()).collect();
        assert_eq!(published, vec!["core", "app"]);
        assert!(result.success());
        assert_eq!(manifest_version(&core), "1.0.1");
        assert_eq!(manifest_version(&app), "1.2.1");

        let commits = vcs.commits.borrow();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].0, vec![core.join("package.json"), app.join("package.json")]);
        assert_eq!(commits[0].1, "monopub release: \ncore: v1.0.1\napp: v1.2.1");
    }

    #[test]
    fn test_failed_package_is_rolled_back_and_batch_continues() {
        let temp = TempDir::new().unwrap();
        let (core, app) = workspace(&temp);
        let vcs = FakeVcs::default().with_count(core.clone(), 1);
        let tool = FakeTool::failing(app.clone(), ReleaseStep::Publish);
        let config = ReleaseConfig::default();
        let mut packages = scan(temp.path(), &vcs);
        let mut ctx = RunContext::new(temp.path().to_path_buf());

        let result = PublishCoordinator::new(&config, &tool, &vcs).execute(&mut packages, &mut ctx, &NoOpCallback);

        assert_eq!(result.published().len(), 1);
        assert_eq!(result.failed().len(), 1);
        assert!(!result.success());

        let failure = result.failed()[0];
        assert_eq!(failure.package, "app");
        assert_eq!(failure.step, ReleaseStep::Publish);
        assert!(failure.rolled_back);

        assert_eq!(manifest_version(&app), "1.2.0");
        assert_eq!(manifest_version(&core), "1.0.1");

        // Only the successful package is committed
        let commits = vcs.commits.borrow();
        assert_eq!(commits[0].0, vec![core.join("package.json")]);
        assert_eq!(commits[0].1, "monopub release: core: v1.0.1");
    }

    #[test]
    fn test_dist_tag_in_commit_and_tag() {
        let temp = TempDir::new().unwrap();
        let (core, _) = workspace(&temp);
        let vcs = FakeVcs::default().with_count(core, 1);
        let tool = FakeTool::default();
        let config = ReleaseConfig::from_config(&Config {
            dist_tag: Some("beta".to_string()),
            git_tag: true,
            ..Config::default()
        });
        let mut packages = scan(temp.path(), &vcs);
        let mut ctx = RunContext::new(temp.path().to_path_buf());

        let result = PublishCoordinator::new(&config, &tool, &vcs).execute(&mut packages, &mut ctx, &NoOpCallback);

        let commit = result.commit.unwrap();
        assert_eq!(commit.message, "monopub release: \ncore: v1.0.1-beta\napp: v1.2.1-beta");
        assert_eq!(commit.tag.as_deref(), Some("core-v1.0.1-beta"));

        let tags = vcs.tags.borrow();
        assert_eq!(tags[0].0, "core-v1.0.1-beta");
        assert_eq!(tags[0].1, "core: v1.0.1-beta\napp: v1.2.1-beta");
    }

    #[test]
    fn test_private_and_unknown_are_skipped_unless_forced() {
        let temp = TempDir::new().unwrap();
        let internal = write_package(
            temp.path(),
            "internal",
            json!({"name": "internal", "version": "0.1.0", "private": true}),
        );
        let flaky = write_package(temp.path(), "flaky", json!({"name": "flaky", "version": "0.1.0"}));
        let vcs = FakeVcs {
            failing: vec![flaky.clone()],
            ..FakeVcs::default()
        }
        .with_count(internal, 3);
        let tool = FakeTool::default();
        let mut ctx = RunContext::new(temp.path().to_path_buf());

        let config = ReleaseConfig::default();
        let mut packages = scan(temp.path(), &vcs);
        let result = PublishCoordinator::new(&config, &tool, &vcs).execute(&mut packages, &mut ctx, &NoOpCallback);
        let skipped = result.skipped();
        assert_eq!(skipped.len(), 2);
        assert!(skipped.iter().any(|(n, r)| *n == "internal" && **r == SkipReason::Private));
        assert!(skipped.iter().any(|(n, r)| *n == "flaky" && matches!(r, SkipReason::UnknownState(_))));

        let forced = ReleaseConfig::from_config(&Config {
            force: true,
            ..Config::default()
        });
        let mut packages = scan(temp.path(), &vcs);
        let result = PublishCoordinator::new(&forced, &tool, &vcs).execute(&mut packages, &mut ctx, &NoOpCallback);
        assert_eq!(result.published().len(), 1);
        assert_eq!(result.published()[0].package, "flaky");
        assert_eq!(result.skipped().len(), 1);
    }

    #[test]
    fn test_selection_forces_named_packages() {
        let temp = TempDir::new().unwrap();
        workspace(&temp);
        let vcs = FakeVcs::default();
        let tool = FakeTool::default();
        let config = ReleaseConfig::default();
        let packages = scan(temp.path(), &vcs);
        let mut ctx = RunContext::new(temp.path().to_path_buf());

        let names = vec!["app".to_string()];
        let mut selected = select_packages(packages, &names).unwrap();
        assert_eq!(selected.len(), 1);

        let result = PublishCoordinator::new(&config, &tool, &vcs)
            .with_forced(names)
            .execute(&mut selected, &mut ctx, &NoOpCallback);
        assert_eq!(result.published().len(), 1);
        assert_eq!(result.published()[0].version, "1.2.1");
    }

    #[test]
    fn test_unknown_selection_is_an_error() {
        let temp = TempDir::new().unwrap();
        workspace(&temp);
        let packages = scan(temp.path(), &FakeVcs::default());
        assert!(select_packages(packages, &["nope".to_string()]).is_err());
    }

    #[test]
    fn test_dry_run_makes_no_commit() {
        let temp = TempDir::new().unwrap();
        let (core, app) = workspace(&temp);
        let before_core = std::fs::read(core.join("package.json")).unwrap();
        let before_app = std::fs::read(app.join("package.json")).unwrap();
        let vcs = FakeVcs::default().with_count(core.clone(), 1);
        let tool = FakeTool::default();
        let config = ReleaseConfig::from_config(&Config {
            dry_run: true,
            ..Config::default()
        });
        let mut packages = scan(temp.path(), &vcs);
        let mut ctx = RunContext::new(temp.path().to_path_buf());

        let result = PublishCoordinator::new(&config, &tool, &vcs).execute(&mut packages, &mut ctx, &NoOpCallback);

        assert!(result.dry_run);
        assert_eq!(result.published().len(), 2);
        assert!(result.commit.is_none());
        assert!(vcs.commits.borrow().is_empty());
        assert_eq!(std::fs::read(core.join("package.json")).unwrap(), before_core);
        assert_eq!(std::fs::read(app.join("package.json")).unwrap(), before_app);
    }

    #[test]
    fn test_commit_failure_is_recorded() {
        let temp = TempDir::new().unwrap();
        let (core, _) = workspace(&temp);
        let vcs = FakeVcs {
            fail_commit: true,
            ..FakeVcs::default()
        }
        .with_count(core, 1);
        let tool = FakeTool::default();
        let config = ReleaseConfig::default();
        let mut packages = scan(temp.path(), &vcs);
        let mut ctx = RunContext::new(temp.path().to_path_buf());

        let result = PublishCoordinator::new(&config, &tool, &vcs).execute(&mut packages, &mut ctx, &NoOpCallback);

        assert_eq!(result.published().len(), 2);
        assert!(result.commit.is_none());
        assert!(result.commit_error.is_some());
        assert!(!result.success());
        assert_eq!(ctx.warnings.len(), 1);
    }

    #[test]
    fn test_release_branch_switch_and_restore() {
        let vcs = FakeVcs::default();
        *vcs.branch.borrow_mut() = Some("feature".to_string());
        let mut ctx = RunContext::default();

        switch_to_release_branch(&vcs, Some("release"), &mut ctx).unwrap();
        assert_eq!(vcs.branch.borrow().as_deref(), Some("release"));
        assert_eq!(ctx.original_branch.as_deref(), Some("feature"));

        restore_branch(&vcs, &mut ctx);
        assert_eq!(vcs.branch.borrow().as_deref(), Some("feature"));
        assert!(ctx.original_branch.is_none());
    }

    #[test]
    fn test_release_branch_checkout_failure_aborts() {
        let vcs = FakeVcs {
            fail_checkout: true,
            ..FakeVcs::default()
        };
        let mut ctx = RunContext::default();
        assert!(switch_to_release_branch(&vcs, Some("release"), &mut ctx).is_err());
        assert!(ctx.original_branch.is_none());

        // Nothing to do without a release branch
        assert!(switch_to_release_branch(&vcs, None, &mut ctx).is_ok());
    }

    #[test]
    fn test_commit_message_format() {
        assert_eq!(
            release_commit_message(&[("core", "1.0.1")], None),
            "monopub release: core: v1.0.1"
        );
        assert_eq!(release_tag_name("@acme/core", "2.0.0", None), "@acme/core-v2.0.0");
    }
}

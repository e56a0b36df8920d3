//! Publish command

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use serde_json::json;
use tracing::info;

use monopub_adapters::{NpmRegistry, PnpmTool};
use monopub_core::config::{Config, ReleaseConfig};
use monopub_core::monorepo::{
    analyze_workspace, restore_branch, select_packages, switch_to_release_branch, write_report,
    BatchResult, DependencyGraph, PackageDiscovery, PackageStatus, PublishCallback,
    PublishCoordinator, RunContext, SkipReason, Workspace,
};
use monopub_core::types::ReleaseKind;
use monopub_git::GitRepo;

use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Release every package that changed since its last publish
#[derive(Debug, Args)]
pub struct PublishCommand {
    /// Only release these packages (they are released even when unchanged)
    pub names: Vec<String>,

    /// Release packages even when nothing changed
    #[arg(short, long)]
    pub force: bool,

    /// Run every step but restore the manifests and skip the commit
    #[arg(long, visible_alias = "test")]
    pub dry_run: bool,

    /// Skip the build script
    #[arg(long)]
    pub no_build: bool,

    /// Version increment (major, minor, patch, premajor, preminor, prepatch, prerelease, none)
    #[arg(short = 'i', long)]
    pub release_kind: Option<ReleaseKind>,

    /// Distribution tag to publish under
    #[arg(long)]
    pub dist_tag: Option<String>,

    /// Branch to release from
    #[arg(short = 'b', long)]
    pub release_branch: Option<String>,

    /// Leave a package out (`name:<pkg>`, `dir:<dir>` or either)
    #[arg(short, long = "exclude")]
    pub excludes: Vec<String>,

    /// Tag the release commit
    #[arg(long)]
    pub git_tag: bool,

    /// Report file (.md or .json)
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl PublishCommand {
    /// Apply command-line flags on top of the loaded configuration
    fn apply(&self, config: &mut Config) {
        config.force |= self.force;
        config.dry_run |= self.dry_run;
        config.git_tag |= self.git_tag;
        if self.no_build {
            config.build = false;
        }
        if let Some(kind) = self.release_kind {
            config.release_kind = kind;
        }
        if let Some(tag) = &self.dist_tag {
            config.dist_tag = Some(tag.clone());
        }
        if let Some(branch) = &self.release_branch {
            config.release_branch = Some(branch.clone());
        }
        if let Some(report) = &self.report {
            config.report = report.clone();
        }
        config.excludes.extend(self.excludes.iter().cloned());
    }

    /// Execute the publish command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<u8> {
        info!(
            names = ?self.names,
            force = self.force,
            dry_run = self.dry_run,
            release_kind = ?self.release_kind,
            dist_tag = ?self.dist_tag,
            "executing publish command"
        );

        let ws = cli.open_workspace(|config| self.apply(config))?;
        let config = ws.config;
        let workspace = ws.workspace;
        let root = workspace.root.clone();

        let repo = GitRepo::discover(&root)?;
        let registry = NpmRegistry::new(&root);
        let tool = PnpmTool::new();
        let release = ReleaseConfig::from_config(&config);
        let mut run = RunContext::new(root.clone());

        if cli.is_text() {
            output::info(&format!(
                "Workspace {} ({})",
                output::path_style().apply_to(root.display()),
                ws.source
            ));
            if release.dry_run {
                println!("  {}", style("[DRY RUN - manifests will be restored]").yellow().bold());
            }
        }

        switch_to_release_branch(&repo, config.release_branch.as_deref(), &mut run)?;
        let released = self.release(cli, &workspace, &config, &release, &repo, &registry, &tool, &mut run);
        restore_branch(&repo, &mut run);
        let (result, report) = released?;

        match cli.format {
            OutputFormat::Json => output::print_json(&summary_json(&result, report.as_deref(), &run.warnings))?,
            OutputFormat::Text if !cli.quiet => print_summary(&result, report.as_deref(), &run.warnings),
            OutputFormat::Text => {}
        }

        Ok(if !result.failed().is_empty() {
            exit_codes::PUBLISH_FAILED
        } else if result.commit_error.is_some() {
            exit_codes::GIT_ERROR
        } else {
            exit_codes::SUCCESS
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn release(
        &self,
        cli: &Cli,
        workspace: &Workspace,
        config: &Config,
        release: &ReleaseConfig,
        repo: &GitRepo,
        registry: &NpmRegistry,
        tool: &PnpmTool,
        run: &mut RunContext,
    ) -> anyhow::Result<(BatchResult, Option<PathBuf>)> {
        let analysis = analyze_workspace(workspace, config, repo, registry, run)?;
        let mut packages = select_packages(analysis.packages, &self.names)?;

        let callback = ConsoleCallback {
            enabled: cli.is_text(),
            verbose: cli.verbose,
        };
        let result = PublishCoordinator::new(release, tool, repo)
            .with_forced(self.names.iter().cloned())
            .execute(&mut packages, run, &callback);

        // Rescan so the report shows what the manifests hold now
        let report = PackageDiscovery::new(workspace.clone(), &config.excludes)
            .and_then(|discovery| discovery.discover())
            .and_then(|fresh| {
                let fresh = DependencyGraph::build(&fresh).order_packages(fresh);
                write_report(&workspace.root, &config.report, &fresh, config.dry_run)
            });
        let report = match report {
            Ok(path) => Some(path),
            Err(e) => {
                run.warn(format!("report was not written: {}", e));
                None
            }
        };

        Ok((result, report))
    }
}

/// Prints progress as packages are released
struct ConsoleCallback {
    enabled: bool,
    verbose: bool,
}

impl PublishCallback for ConsoleCallback {
    fn on_publish_start(&self, package: &str, version: &str) {
        if self.enabled {
            output::info(&format!(
                "Releasing {} {}",
                output::package_style().apply_to(package),
                style(version).dim()
            ));
        }
    }

    fn on_publish_complete(&self, package: &str, status: &PackageStatus) {
        if !self.enabled {
            return;
        }
        match status {
            PackageStatus::Published(outcome) => output::success(&format!(
                "{} {} -> {}",
                package,
                outcome.previous_version,
                output::version_style().apply_to(&outcome.version)
            )),
            PackageStatus::Failed(err) => output::error(&err.to_string()),
            PackageStatus::Skipped(reason) => output::skipped(&format!("{}: {}", package, reason)),
        }
    }

    fn on_skip(&self, package: &str, reason: &SkipReason) {
        if self.enabled && (self.verbose || !matches!(reason, SkipReason::NoChanges)) {
            output::skipped(&format!("{}: {}", package, reason));
        }
    }
}

fn print_summary(result: &BatchResult, report: Option<&Path>, warnings: &[String]) {
    println!();
    println!("{}", output::header("Summary"));
    println!("{}", output::key_value("Published", &result.published().len().to_string()));
    println!("{}", output::key_value("Skipped", &result.skipped().len().to_string()));
    println!("{}", output::key_value("Failed", &result.failed().len().to_string()));
    if let Some(commit) = &result.commit {
        let short = commit.id.get(..7).unwrap_or(&commit.id);
        println!("{}", output::key_value("Commit", short));
        if let Some(tag) = &commit.tag {
            println!("{}", output::key_value("Tag", tag));
        }
    }
    if let Some(path) = report {
        println!(
            "{}",
            output::key_value("Report", &output::path_style().apply_to(path.display()).to_string())
        );
    }

    for warning in warnings {
        output::warning(warning);
    }
    for failure in result.failed() {
        output::error(&failure.to_string());
    }
}

fn summary_json(result: &BatchResult, report: Option<&Path>, warnings: &[String]) -> serde_json::Value {
    json!({
        "dry_run": result.dry_run,
        "published": result.published(),
        "skipped": result
            .skipped()
            .iter()
            .map(|(package, reason)| json!({"package": package, "reason": reason.to_string()}))
            .collect::<Vec<_>>(),
        "failed": result
            .failed()
            .iter()
            .map(|err| json!({
                "package": err.package,
                "step": err.step,
                "message": err.message,
                "rolled_back": err.rolled_back,
                "rollback_error": err.rollback_error,
            }))
            .collect::<Vec<_>>(),
        "commit": result.commit,
        "commit_error": result.commit_error,
        "report": report.map(|p| p.display().to_string()),
        "warnings": warnings,
    })
}

//! List command

use chrono::{DateTime, FixedOffset, Local};
use clap::Args;
use console::style;
use serde_json::json;
use tracing::info;

use monopub_adapters::NpmRegistry;
use monopub_core::monorepo::{analyze_workspace, PackageRecord, RunContext};
use monopub_git::GitRepo;

use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Show packages with their versions and pending commits
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Include private packages
    #[arg(short, long)]
    pub all: bool,
}

impl ListCommand {
    /// Execute the list command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<u8> {
        info!(all = self.all, "executing list command");
        // Listing never writes backfilled publish times
        let ws = cli.open_workspace(|config| config.dry_run = true)?;
        let root = ws.workspace.root.clone();
        let repo = GitRepo::discover(&root)?;
        let registry = NpmRegistry::new(&root);
        let mut run = RunContext::new(root);

        let analysis = analyze_workspace(&ws.workspace, &ws.config, &repo, &registry, &mut run)?;
        let packages: Vec<&PackageRecord> = analysis
            .packages
            .iter()
            .filter(|p| self.all || !p.private)
            .collect();
        let now: DateTime<FixedOffset> = Local::now().into();

        match cli.format {
            OutputFormat::Json => {
                let rows: Vec<_> = packages.iter().map(|p| package_json(p, now)).collect();
                output::print_json(&json!({ "packages": rows, "warnings": run.warnings }))?;
            }
            OutputFormat::Text => {
                println!("{}", output::header(&format!("Packages ({})", packages.len())));
                println!();
                for pkg in &packages {
                    print_package(pkg, now);
                }
                for warning in &run.warnings {
                    output::warning(warning);
                }
            }
        }

        Ok(exit_codes::SUCCESS)
    }
}

fn last_publish_text(pkg: &PackageRecord, now: DateTime<FixedOffset>) -> String {
    match pkg.last_publish {
        Some(time) => format!("{} ({})", output::short_date(time), output::relative_time(time, now)),
        None => "never".to_string(),
    }
}

fn count_text(count: Option<usize>) -> String {
    count.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string())
}

fn print_package(pkg: &PackageRecord, now: DateTime<FixedOffset>) {
    let marker = if pkg.is_dirty() {
        style("*").yellow().bold()
    } else {
        style(" ")
    };
    println!(
        "{} {} {}{}",
        marker,
        output::package_style().apply_to(&pkg.name),
        output::version_style().apply_to(&pkg.version),
        if pkg.private { style(" (private)").dim().to_string() } else { String::new() }
    );
    println!("{}", output::key_value("Last publish", &last_publish_text(pkg, now)));
    println!(
        "{}",
        output::key_value(
            "Commits",
            &format!("{} new / {} total", count_text(pkg.new_commits), count_text(pkg.total_commits))
        )
    );
    println!("{}", output::key_value("State", &pkg.change_state.to_string()));
}

fn package_json(pkg: &PackageRecord, now: DateTime<FixedOffset>) -> serde_json::Value {
    json!({
        "name": pkg.name,
        "dir": pkg.dir_name,
        "version": pkg.version,
        "private": pkg.private,
        "last_publish": pkg.last_publish.map(|t| t.to_rfc3339()),
        "last_publish_relative": pkg.last_publish.map(|t| output::relative_time(t, now)),
        "new_commits": pkg.new_commits,
        "total_commits": pkg.total_commits,
        "dependencies": pkg.dependencies,
        "change_state": pkg.change_state,
    })
}

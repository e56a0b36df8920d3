//! Sync command

use clap::Args;
use serde_json::json;
use tracing::info;

use monopub_adapters::NpmRegistry;
use monopub_core::monorepo::{sync_with_registry, PackageDiscovery, SyncStatus};

use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Copy publish times and versions from the registry into the manifests
#[derive(Debug, Args)]
pub struct SyncCommand {}

impl SyncCommand {
    /// Execute the sync command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<u8> {
        info!("executing sync command");
        let ws = cli.open_workspace(|_| {})?;
        let registry = NpmRegistry::new(&ws.workspace.root);

        let mut packages = PackageDiscovery::new(ws.workspace.clone(), &ws.config.excludes)?.discover()?;
        packages.retain(|p| !p.private);
        let results = sync_with_registry(&mut packages, &registry);

        let failed = results
            .iter()
            .filter(|(_, status)| matches!(status, SyncStatus::Failed { .. }))
            .count();

        match cli.format {
            OutputFormat::Json => {
                let rows: Vec<_> = results
                    .iter()
                    .map(|(name, status)| json!({"package": name, "result": status}))
                    .collect();
                output::print_json(&rows)?;
            }
            OutputFormat::Text if !cli.quiet => {
                for (name, status) in &results {
                    print_status(name, status);
                }
            }
            OutputFormat::Text => {}
        }

        Ok(if failed > 0 { exit_codes::ERROR } else { exit_codes::SUCCESS })
    }
}

fn print_status(name: &str, status: &SyncStatus) {
    match status {
        SyncStatus::Updated { last_publish, version } => {
            let mut changes = Vec::new();
            if let Some((from, to)) = version {
                changes.push(format!("{} -> {}", from, output::version_style().apply_to(to)));
            }
            if let Some(time) = last_publish {
                changes.push(format!("lastPublish {}", time));
            }
            output::success(&format!("{}: {}", name, changes.join(", ")));
        }
        SyncStatus::UpToDate => output::skipped(&format!("{}: up to date", name)),
        SyncStatus::NotPublished => output::skipped(&format!("{}: never published, skipped", name)),
        SyncStatus::Failed { message } => output::error(&format!("{}: {}", name, message)),
    }
}

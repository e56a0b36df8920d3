//! Init command

use clap::Args;
use tracing::info;

use monopub_core::monorepo::{init_workspace, PackageDiscovery, ScriptChange};

use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes;

/// Add release scripts to the workspace
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Name of the per-package release script
    #[arg(short = 's', long)]
    pub release_script: Option<String>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<u8> {
        info!(release_script = ?self.release_script, "executing init command");
        let ws = cli.open_workspace(|config| {
            if let Some(script) = &self.release_script {
                config.release_script = script.clone();
            }
        })?;

        let packages = PackageDiscovery::new(ws.workspace.clone(), &ws.config.excludes)?.discover()?;
        let summary = init_workspace(&ws.workspace, &packages, &ws.config.release_script)?;

        match cli.format {
            OutputFormat::Json => output::print_json(&summary)?,
            OutputFormat::Text if !cli.quiet => {
                for (name, change) in &summary.packages {
                    let text = match change {
                        ScriptChange::Added => "release script added",
                        ScriptChange::Merged => "release script extended",
                        ScriptChange::Unchanged => "already set up",
                    };
                    output::success(&format!("{}: {}", name, text));
                }
                for (name, err) in &summary.failed {
                    output::error(&format!("{}: {}", name, err));
                }
                if summary.config_added {
                    output::info("Added default \"monopub\" configuration to package.json");
                }
                println!();
                println!("{}", output::header("Usage"));
                println!("{}", output::key_value("Simulate", "pnpm publish:test"));
                println!("{}", output::key_value("Release", "pnpm publish:auto"));
            }
            OutputFormat::Text => {}
        }

        Ok(if summary.failed.is_empty() {
            exit_codes::SUCCESS
        } else {
            exit_codes::ERROR
        })
    }
}

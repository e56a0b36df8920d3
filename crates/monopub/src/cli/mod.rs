//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use monopub_core::config::{load_workspace_config, validate_config, Config, ConfigSource};
use monopub_core::monorepo::Workspace;

use commands::{InitCommand, ListCommand, PublishCommand, SyncCommand};

/// monopub - release packages of a pnpm workspace
#[derive(Debug, Parser)]
#[command(name = "monopub")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Run as if started in this directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Release every package that changed since its last publish
    Publish(PublishCommand),

    /// Show packages with their versions and pending commits
    List(ListCommand),

    /// Copy publish times and versions from the registry into the manifests
    Sync(SyncCommand),

    /// Add release scripts to the workspace
    Init(InitCommand),
}

/// Workspace located for a command, with its configuration
pub struct WorkspaceContext {
    /// The workspace
    pub workspace: Workspace,
    /// Effective configuration, before command-line overrides
    pub config: Config,
    /// Where the configuration came from
    pub source: ConfigSource,
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub fn execute(&self) -> anyhow::Result<u8> {
        match &self.command {
            Commands::Publish(cmd) => cmd.execute(self),
            Commands::List(cmd) => cmd.execute(self),
            Commands::Sync(cmd) => cmd.execute(self),
            Commands::Init(cmd) => cmd.execute(self),
        }
    }

    /// Directory the command acts on; the process working directory is never changed
    pub fn start_dir(&self) -> anyhow::Result<PathBuf> {
        let cwd = std::env::current_dir().context("cannot read the current directory")?;
        Ok(match &self.directory {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => cwd,
        })
    }

    /// Find the workspace root and load its configuration.
    ///
    /// `overrides` applies command-line flags before validation.
    pub fn open_workspace(&self, overrides: impl FnOnce(&mut Config)) -> anyhow::Result<WorkspaceContext> {
        let start = self.start_dir()?;
        let root = Workspace::find_root(&start)?;
        let (mut config, source) = load_workspace_config(&start, &root)?;
        info!(root = %root.display(), source = %source, "workspace located");

        overrides(&mut config);
        validate_config(&config)?;
        debug!(config = ?config, "effective configuration");

        let workspace = Workspace::new(root, &config);
        Ok(WorkspaceContext {
            workspace,
            config,
            source,
        })
    }

    /// Whether to print human-readable progress
    pub fn is_text(&self) -> bool {
        self.format == OutputFormat::Text && !self.quiet
    }
}

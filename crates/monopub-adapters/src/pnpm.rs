//! pnpm package tool

use std::path::Path;

use tracing::{debug, info};

use monopub_core::error::Result;
use monopub_core::traits::{PackageTool, PublishOptions};
use monopub_core::types::ReleaseKind;

use crate::command::ToolCommand;

/// Bumps with `npm version`, runs scripts and publishes with `pnpm`
#[derive(Debug, Clone)]
pub struct PnpmTool {
    npm: String,
    pnpm: String,
}

impl PnpmTool {
    /// Use `npm` and `pnpm` from PATH
    pub fn new() -> Self {
        Self {
            npm: "npm".to_string(),
            pnpm: "pnpm".to_string(),
        }
    }

    /// Use other executables, e.g. a pinned pnpm
    pub fn with_programs(npm: impl Into<String>, pnpm: impl Into<String>) -> Self {
        Self {
            npm: npm.into(),
            pnpm: pnpm.into(),
        }
    }

    /// `npm version <kind> --no-git-tag-version`
    pub fn version_command(&self, kind: ReleaseKind) -> ToolCommand {
        ToolCommand::new(&self.npm)
            .arg("version")
            .arg(kind.as_str())
            .arg("--no-git-tag-version")
    }

    /// `pnpm run <script>`
    pub fn script_command(&self, script: &str) -> ToolCommand {
        ToolCommand::new(&self.pnpm).arg("run").arg(script)
    }

    /// `pnpm publish <options>`
    pub fn publish_command(&self, options: &PublishOptions) -> ToolCommand {
        ToolCommand::new(&self.pnpm).arg("publish").args(options.to_args())
    }
}

impl Default for PnpmTool {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageTool for PnpmTool {
    fn bump_version(&self, dir: &Path, kind: ReleaseKind) -> Result<()> {
        if !kind.bumps() {
            debug!(dir = %dir.display(), "release kind is none, version left alone");
            return Ok(());
        }
        let output = self.version_command(kind).run(dir)?;
        info!(dir = %dir.display(), version = %output.stdout.trim(), "version bumped");
        Ok(())
    }

    fn run_script(&self, dir: &Path, script: &str) -> Result<()> {
        self.script_command(script).run(dir)?;
        info!(dir = %dir.display(), script, "script finished");
        Ok(())
    }

    fn publish(&self, dir: &Path, options: &PublishOptions) -> Result<()> {
        self.publish_command(options).run(dir)?;
        info!(dir = %dir.display(), dry_run = options.dry_run, "package published");
        Ok(())
    }
}

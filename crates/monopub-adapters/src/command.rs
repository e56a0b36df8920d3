//! Running external programs in an explicit directory

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, instrument};

use monopub_core::error::{Result, ToolError};

/// Captured output of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, _) => self.stderr.trim_end().to_string(),
        }
    }
}

/// A program invocation, e.g. `pnpm run build`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
}

impl ToolCommand {
    /// Create a command for `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The full command line, for messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn resolve(&self) -> Result<PathBuf> {
        which::which(&self.program).map_err(|_| ToolError::NotInstalled(self.program.clone()).into())
    }

    /// Run in `dir` and capture the output, whatever the exit status
    #[instrument(skip(self), fields(command = %self.display(), dir = %dir.display()))]
    pub fn output(&self, dir: &Path) -> Result<CommandOutput> {
        let program = self.resolve()?;
        let output = Command::new(program)
            .args(&self.args)
            .current_dir(dir)
            .output()
            .map_err(|e| ToolError::SpawnFailed {
                command: self.display(),
                reason: e.to_string(),
            })?;

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(code = ?output.code, "command finished");
        Ok(output)
    }

    /// Run in `dir`; a non-zero exit is an error carrying the output
    pub fn run(&self, dir: &Path) -> Result<CommandOutput> {
        let output = self.output(dir)?;
        if !output.success() {
            return Err(ToolError::CommandFailed {
                command: self.display(),
                code: output.code,
                output: output.combined(),
            }
            .into());
        }
        Ok(output)
    }
}

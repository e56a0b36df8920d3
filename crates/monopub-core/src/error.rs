//! Error types for monopub

use std::path::PathBuf;
use thiserror::Error;

use crate::types::ReleaseStep;

/// Result type alias using MonopubError
pub type Result<T> = std::result::Result<T, MonopubError>;

/// Main error type for monopub operations
#[derive(Debug, Error)]
pub enum MonopubError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Workspace and package discovery errors
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Git-related errors
    #[error(transparent)]
    Git(#[from] GitError),

    /// Registry query errors
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// External tool errors (npm, pnpm)
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Release pipeline errors
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Workspace and package discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No `pnpm-workspace.yaml` between the start directory and the filesystem root
    #[error("No workspace root found from {0}")]
    WorkspaceNotFound(PathBuf),

    /// Package manifest not found
    #[error("Package manifest not found at {0}")]
    ManifestNotFound(PathBuf),

    /// Failed to parse manifest
    #[error("Failed to parse manifest {path}: {reason}")]
    ManifestParseError { path: PathBuf, reason: String },

    /// Failed to write manifest
    #[error("Failed to update manifest {path}: {reason}")]
    ManifestUpdateError { path: PathBuf, reason: String },

    /// Required manifest field is missing
    #[error("Manifest {path} is missing field '{field}'")]
    MissingField { path: PathBuf, field: String },

    /// Two packages declare the same name
    #[error("Duplicate package name '{name}' in {second} (first seen in {first})")]
    DuplicateName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// A package name given on the command line does not exist
    #[error("Unknown package: {0}")]
    UnknownPackage(String),
}

/// Git-related errors
#[derive(Debug, Error)]
pub enum GitError {
    /// Repository not found
    #[error("Git repository not found at {0}")]
    RepositoryNotFound(PathBuf),

    /// Not a git repository
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    /// Failed to open repository
    #[error("Failed to open repository: {0}")]
    OpenFailed(String),

    /// No commits found
    #[error("No commits found in repository")]
    NoCommits,

    /// A path lies outside the repository working tree
    #[error("Path {0} is outside the repository working tree")]
    OutsideWorkTree(PathBuf),

    /// Branch checkout failed
    #[error("Failed to check out branch {branch}: {reason}")]
    CheckoutFailed { branch: String, reason: String },

    /// Commit creation failed
    #[error("Failed to create commit: {0}")]
    CommitFailed(String),

    /// Tag already exists
    #[error("Tag already exists: {0}")]
    TagExists(String),

    /// Failed to create tag
    #[error("Failed to create tag {name}: {reason}")]
    TagCreationFailed { name: String, reason: String },

    /// Git2 library error
    #[error("Git error: {0}")]
    Git2(#[from] git2::Error),
}

/// Registry query errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Registry command failed
    #[error("Registry query for {package} failed: {reason}")]
    QueryFailed { package: String, reason: String },

    /// Registry returned something that isn't package metadata
    #[error("Invalid registry response for {package}: {reason}")]
    InvalidResponse { package: String, reason: String },
}

/// External tool errors
#[derive(Debug, Error)]
pub enum ToolError {
    /// Program not found on PATH
    #[error("{0} is not installed or not on PATH")]
    NotInstalled(String),

    /// Process could not be started
    #[error("Failed to run {command}: {reason}")]
    SpawnFailed { command: String, reason: String },

    /// Process exited unsuccessfully
    #[error("Command failed: {command} (exit code {code:?}){}", format_output(.output))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

/// A release pipeline step failed for one package
#[derive(Debug, Error)]
#[error("{step} failed for {package}: {message}{}", rollback_note(.rolled_back, .rollback_error))]
pub struct PipelineError {
    /// Package name
    pub package: String,
    /// Step that failed
    pub step: ReleaseStep,
    /// Underlying failure
    pub message: String,
    /// Whether the manifest was restored to its pre-release bytes
    pub rolled_back: bool,
    /// Set when restoring the manifest itself failed
    pub rollback_error: Option<String>,
}

impl PipelineError {
    /// Create a pipeline error that has not been rolled back
    pub fn new(package: impl Into<String>, step: ReleaseStep, message: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            step,
            message: message.into(),
            rolled_back: false,
            rollback_error: None,
        }
    }
}

fn rollback_note(rolled_back: &bool, rollback_error: &Option<String>) -> String {
    match (*rolled_back, rollback_error) {
        (true, _) => " (manifest rolled back)".to_string(),
        (false, Some(err)) => format!(" (rollback failed: {})", err),
        (false, None) => String::new(),
    }
}

impl MonopubError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}

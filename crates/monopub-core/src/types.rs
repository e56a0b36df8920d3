//! Core types for monopub

use serde::{Deserialize, Serialize};

/// Version increment applied by the release pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseKind {
    /// Major version bump (breaking changes)
    Major,
    /// Minor version bump (new features)
    Minor,
    /// Patch version bump (bug fixes)
    #[default]
    Patch,
    /// Major bump into a pre-release
    Premajor,
    /// Minor bump into a pre-release
    Preminor,
    /// Patch bump into a pre-release
    Prepatch,
    /// Next pre-release number
    Prerelease,
    /// Publish the current version as-is
    None,
}

impl ReleaseKind {
    /// All kinds, in the order they are offered to users
    pub const ALL: [ReleaseKind; 8] = [
        Self::Major,
        Self::Minor,
        Self::Patch,
        Self::Premajor,
        Self::Preminor,
        Self::Prepatch,
        Self::Prerelease,
        Self::None,
    ];

    /// Returns the string representation understood by `npm version`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Patch => "patch",
            Self::Premajor => "premajor",
            Self::Preminor => "preminor",
            Self::Prepatch => "prepatch",
            Self::Prerelease => "prerelease",
            Self::None => "none",
        }
    }

    /// Whether this kind changes the version at all
    pub fn bumps(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for ReleaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReleaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "major" => Ok(Self::Major),
            "minor" => Ok(Self::Minor),
            "patch" => Ok(Self::Patch),
            "premajor" => Ok(Self::Premajor),
            "preminor" => Ok(Self::Preminor),
            "prepatch" => Ok(Self::Prepatch),
            "prerelease" | "pre" => Ok(Self::Prerelease),
            "none" | "current" => Ok(Self::None),
            _ => Err(format!("Unknown release kind: {}", s)),
        }
    }
}

/// A step of the per-package release pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStep {
    /// Capturing the manifest before any step runs
    Prepare,
    /// `npm version <kind>`
    VersionBump,
    /// The package's own build script
    Build,
    /// `pnpm publish`
    Publish,
    /// Writing `lastPublish` back into the manifest
    RecordTimestamp,
}

impl ReleaseStep {
    /// Returns a human readable step name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::VersionBump => "version bump",
            Self::Build => "build",
            Self::Publish => "publish",
            Self::RecordTimestamp => "record timestamp",
        }
    }
}

impl std::fmt::Display for ReleaseStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

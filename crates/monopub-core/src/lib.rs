//! monopub core - release management for pnpm workspaces
//!
//! This crate provides the types, error handling, configuration and the
//! release workflow. Version control, the registry and the package manager
//! are reached through the traits in [`traits`].

pub mod config;
pub mod error;
pub mod manifest;
pub mod monorepo;
pub mod traits;
pub mod types;

pub use config::{Config, ReleaseConfig};
pub use error::{MonopubError, Result};
pub use manifest::{ManifestSnapshot, PackageManifest};
pub use traits::{PackageTool, PublishOptions, Registry, ReleaseInfo, VersionControl};
pub use types::{ReleaseKind, ReleaseStep};

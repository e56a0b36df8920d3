//! monopub git - Git operations for workspace releases
//!
//! This crate implements the [`VersionControl`](monopub_core::VersionControl)
//! collaborator on top of libgit2: branch switching, per-package commit
//! counting, the aggregate release commit and annotated tags.

mod branch;
mod commits;
mod repository;
mod tags;
mod vcs;

pub use repository::{GitRepo, Result};

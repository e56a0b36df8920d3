//! Monorepo release support
//!
//! This module covers the whole release flow for a pnpm workspace:
//! - Workspace root detection and package discovery
//! - Dependency graph analysis with topological sorting
//! - Change detection and dirty propagation
//! - The per-package release pipeline with rollback
//! - Batch publishing, the release commit and the version report

pub mod analysis;
pub mod changes;
pub mod discovery;
pub mod graph;
pub mod init;
pub mod pipeline;
pub mod publishing;
pub mod report;
pub mod sync;
pub mod workspace;

pub use analysis::{analyze_workspace, WorkspaceAnalysis};
pub use changes::{propagate, ChangeDetector, ChangeReason, ChangeState};
pub use discovery::{PackageDiscovery, PackageRecord};
pub use graph::{DependencyGraph, PackageNode};
pub use init::{init_workspace, install_release_script, InitSummary, ScriptChange};
pub use pipeline::{PipelineOutcome, PipelineState, ReleasePipeline};
pub use publishing::{
    release_commit_message, release_tag_name, restore_branch, select_packages,
    switch_to_release_branch, BatchResult, NoOpCallback, PackageOutcome, PackageStatus,
    PublishCallback, PublishCoordinator, ReleaseCommit, RunContext, SkipReason,
};
pub use report::{render_report, report_path, write_report, ReportFormat};
pub use sync::{backfill_last_publish, sync_with_registry, SyncStatus};
pub use workspace::{Workspace, WORKSPACE_MARKER};

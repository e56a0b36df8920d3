//! Per-package release pipeline
//!
//! `VersionBump -> [Build] -> Publish -> RecordTimestamp -> Done`. A failure
//! after the version bump puts the manifest back to the bytes captured before
//! the first step; a successful simulated run does the same.

use chrono::{DateTime, FixedOffset, Local};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::ReleaseConfig;
use crate::error::{DiscoveryError, MonopubError, PipelineError};
use crate::manifest::{ManifestSnapshot, PackageManifest};
use crate::traits::{PackageTool, PublishOptions};
use crate::types::ReleaseStep;

use super::discovery::PackageRecord;

/// Where a pipeline run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Not started
    Pending,
    /// Bumping the version
    VersionBump,
    /// Running the build script
    Build,
    /// Publishing to the registry
    Publish,
    /// Writing `lastPublish`
    RecordTimestamp,
    /// Finished successfully
    Done,
    /// A step failed before anything needed undoing
    Failed(ReleaseStep),
    /// A step failed and the manifest was restored
    RolledBack(ReleaseStep),
}

impl From<ReleaseStep> for PipelineState {
    fn from(step: ReleaseStep) -> Self {
        match step {
            ReleaseStep::Prepare => Self::Pending,
            ReleaseStep::VersionBump => Self::VersionBump,
            ReleaseStep::Build => Self::Build,
            ReleaseStep::Publish => Self::Publish,
            ReleaseStep::RecordTimestamp => Self::RecordTimestamp,
        }
    }
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    /// Package name
    pub package: String,
    /// Version before the run
    pub previous_version: String,
    /// Version that was published
    pub version: String,
    /// Time written to `lastPublish`
    pub published_at: DateTime<FixedOffset>,
    /// Whether the build script ran
    pub built: bool,
    /// Whether this was a simulation whose manifest changes were undone
    pub dry_run: bool,
}

type StepResult<T> = std::result::Result<T, (ReleaseStep, MonopubError)>;

/// Runs the release steps for one package at a time
pub struct ReleasePipeline<'a> {
    config: &'a ReleaseConfig,
    tool: &'a dyn PackageTool,
    state: PipelineState,
}

impl<'a> ReleasePipeline<'a> {
    /// Create a new pipeline
    pub fn new(config: &'a ReleaseConfig, tool: &'a dyn PackageTool) -> Self {
        Self {
            config,
            tool,
            state: PipelineState::Pending,
        }
    }

    /// State reached by the last run
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Release one package.
    ///
    /// On success the record carries the new version and publish time
    /// (unless this is a simulation). On failure the record and, when a bump
    /// happened, the manifest are back where they started.
    pub fn run(&mut self, package: &mut PackageRecord) -> std::result::Result<PipelineOutcome, PipelineError> {
        self.state = PipelineState::Pending;
        let manifest_path = package.manifest_path();

        let snapshot = ManifestSnapshot::capture(&manifest_path).map_err(|e| {
            self.state = PipelineState::Failed(ReleaseStep::Prepare);
            PipelineError::new(&package.name, ReleaseStep::Prepare, e.to_string())
        })?;

        let previous_version = package.version.clone();
        let previous_last_publish = package.last_publish;
        let mut bumped = false;

        match self.execute(package, &mut bumped) {
            Ok(outcome) => {
                if self.config.dry_run {
                    if let Err(e) = snapshot.restore() {
                        error!(package = %package.name, error = %e, "cannot restore manifest after dry run");
                        self.state = PipelineState::Failed(ReleaseStep::RecordTimestamp);
                        let mut err = PipelineError::new(
                            &package.name,
                            ReleaseStep::RecordTimestamp,
                            "dry run finished but the manifest could not be restored",
                        );
                        err.rollback_error = Some(e.to_string());
                        return Err(err);
                    }
                    package.version = previous_version;
                    package.last_publish = previous_last_publish;
                    debug!(package = %package.name, "dry run: manifest restored");
                }
                self.state = PipelineState::Done;
                info!(
                    package = %outcome.package,
                    from = %outcome.previous_version,
                    to = %outcome.version,
                    dry_run = outcome.dry_run,
                    "package released"
                );
                Ok(outcome)
            }
            Err((step, cause)) => {
                error!(package = %package.name, step = %step, error = %cause, "release step failed");
                self.state = PipelineState::Failed(step);
                let mut err = PipelineError::new(&package.name, step, cause.to_string());

                if bumped {
                    match snapshot.restore() {
                        Ok(()) => {
                            self.state = PipelineState::RolledBack(step);
                            err.rolled_back = true;
                            warn!(package = %package.name, version = %previous_version, "manifest rolled back");
                        }
                        Err(e) => {
                            error!(package = %package.name, error = %e, "rollback failed");
                            err.rollback_error = Some(e.to_string());
                        }
                    }
                }
                package.version = previous_version;
                package.last_publish = previous_last_publish;
                Err(err)
            }
        }
    }

    fn execute(&mut self, package: &mut PackageRecord, bumped: &mut bool) -> StepResult<PipelineOutcome> {
        let previous_version = package.version.clone();
        let manifest_path = package.manifest_path();

        self.enter(ReleaseStep::VersionBump);
        if self.config.release_kind.bumps() {
            info!(package = %package.name, kind = %self.config.release_kind, "bumping version");
            self.tool
                .bump_version(&package.full_path, self.config.release_kind)
                .map_err(|e| (ReleaseStep::VersionBump, e))?;
            *bumped = true;

            let manifest = PackageManifest::load(&manifest_path).map_err(|e| (ReleaseStep::VersionBump, e))?;
            let version = manifest
                .version()
                .ok_or_else(|| {
                    let err: MonopubError = DiscoveryError::MissingField {
                        path: manifest_path.clone(),
                        field: "version".to_string(),
                    }
                    .into();
                    (ReleaseStep::VersionBump, err)
                })?
                .to_string();
            semver::Version::parse(&version).map_err(|e| {
                (
                    ReleaseStep::VersionBump,
                    MonopubError::other(format!("bumped version '{}' is not valid semver: {}", version, e)),
                )
            })?;
            package.version = version;
        } else {
            debug!(package = %package.name, "release kind is none, keeping version");
        }

        let built = self.config.build && package.scripts.contains_key(&self.config.build_script);
        if built {
            self.enter(ReleaseStep::Build);
            info!(package = %package.name, script = %self.config.build_script, "building");
            self.tool
                .run_script(&package.full_path, &self.config.build_script)
                .map_err(|e| (ReleaseStep::Build, e))?;
        }

        self.enter(ReleaseStep::Publish);
        let options = PublishOptions {
            dist_tag: self.config.dist_tag.clone(),
            dry_run: self.config.dry_run,
            extra_args: self.config.publish_args.clone(),
        };
        info!(package = %package.name, version = %package.version, tag = ?options.dist_tag, "publishing package");
        self.tool
            .publish(&package.full_path, &options)
            .map_err(|e| (ReleaseStep::Publish, e))?;

        self.enter(ReleaseStep::RecordTimestamp);
        let now: DateTime<FixedOffset> = Local::now().into();
        if self.config.dry_run {
            debug!(package = %package.name, "dry run: lastPublish not written");
        } else {
            let mut manifest =
                PackageManifest::load(&manifest_path).map_err(|e| (ReleaseStep::RecordTimestamp, e))?;
            manifest.set_last_publish(now);
            manifest.save().map_err(|e| (ReleaseStep::RecordTimestamp, e))?;
        }
        package.last_publish = Some(now);

        Ok(PipelineOutcome {
            package: package.name.clone(),
            previous_version,
            version: package.version.clone(),
            published_at: now,
            built,
            dry_run: self.config.dry_run,
        })
    }

    fn enter(&mut self, step: ReleaseStep) {
        self.state = step.into();
        debug!(state = ?self.state, "pipeline state");
    }
}

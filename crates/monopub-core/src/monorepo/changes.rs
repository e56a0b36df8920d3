//! Change detection and dirty propagation

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RELEASE_COMMIT_MARKER;
use crate::traits::VersionControl;

use super::discovery::PackageRecord;
use super::graph::DependencyGraph;

/// Reason why a package is considered changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Commits touched the package since its last publish
    DirectChanges,
    /// A workspace dependency needs a release
    DependencyChanged(String),
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DirectChanges => write!(f, "direct changes"),
            Self::DependencyChanged(dep) => write!(f, "dependency '{}' changed", dep),
        }
    }
}

/// Whether a package needs a release
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ChangeState {
    /// Nothing to release
    #[default]
    Clean,
    /// Needs a release
    Dirty(ChangeReason),
    /// The commit query failed
    Unknown(String),
}

impl ChangeState {
    /// Whether the package needs a release
    pub fn is_dirty(&self) -> bool {
        matches!(self, Self::Dirty(_))
    }
}

impl std::fmt::Display for ChangeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Dirty(reason) => write!(f, "dirty ({})", reason),
            Self::Unknown(message) => write!(f, "unknown ({})", message),
        }
    }
}

/// Change detector backed by version control
pub struct ChangeDetector<'a> {
    vcs: &'a dyn VersionControl,
    lookup_failures: HashMap<String, String>,
}

impl<'a> ChangeDetector<'a> {
    /// Create a new change detector
    pub fn new(vcs: &'a dyn VersionControl) -> Self {
        Self {
            vcs,
            lookup_failures: HashMap::new(),
        }
    }

    /// Packages whose registry lookup failed, with the error message.
    ///
    /// Without a known publish time their commit count covers the whole
    /// history, so they are reported as unknown instead of dirty.
    pub fn with_lookup_failures(mut self, failures: HashMap<String, String>) -> Self {
        self.lookup_failures = failures;
        self
    }

    /// Set each package's change state from its own commits
    pub fn detect(&self, packages: &mut [PackageRecord]) {
        for pkg in packages.iter_mut() {
            let exclude = [pkg.manifest_path()];

            let new_commits =
                self.vcs
                    .count_commits(&pkg.full_path, pkg.last_publish, &exclude, RELEASE_COMMIT_MARKER);

            pkg.change_state = match &new_commits {
                Ok(0) => ChangeState::Clean,
                Ok(_) => ChangeState::Dirty(ChangeReason::DirectChanges),
                Err(e) => {
                    warn!(package = %pkg.name, error = %e, "cannot count commits, change state unknown");
                    ChangeState::Unknown(e.to_string())
                }
            };
            pkg.new_commits = new_commits.ok();

            if let Some(message) = self.lookup_failures.get(&pkg.name) {
                warn!(package = %pkg.name, error = %message, "registry lookup failed, change state unknown");
                pkg.change_state = ChangeState::Unknown(format!("registry lookup failed: {}", message));
            }

            pkg.total_commits = if pkg.last_publish.is_none() {
                pkg.new_commits
            } else {
                self.vcs
                    .count_commits(&pkg.full_path, None, &exclude, RELEASE_COMMIT_MARKER)
                    .map_err(|e| debug!(package = %pkg.name, error = %e, "cannot count total commits"))
                    .ok()
            };

            debug!(
                package = %pkg.name,
                state = %pkg.change_state,
                new_commits = ?pkg.new_commits,
                "change state detected"
            );
        }
    }

    /// Detect direct changes, then propagate them to dependents
    pub fn detect_and_propagate(&self, packages: &mut [PackageRecord], graph: &DependencyGraph) {
        self.detect(packages);
        propagate(packages, graph);
    }
}

/// Mark every package that transitively depends on a dirty package as dirty.
///
/// One pass in publish order settles acyclic graphs; a worklist over
/// dependents finishes the job when the graph has cycles. `Unknown` never
/// spreads, but a package in that state still becomes dirty when one of
/// its dependencies is.
pub fn propagate(packages: &mut [PackageRecord], graph: &DependencyGraph) {
    let index: HashMap<String, usize> = packages
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.clone(), i))
        .collect();

    for name in graph.sorted() {
        let Some(&i) = index.get(name) else { continue };
        if packages[i].is_dirty() {
            continue;
        }
        let dirty_dep = graph
            .dependencies(name)
            .iter()
            .find(|dep| index.get(*dep).is_some_and(|&j| packages[j].is_dirty()))
            .cloned();
        if let Some(dep) = dirty_dep {
            packages[i].change_state = ChangeState::Dirty(ChangeReason::DependencyChanged(dep));
        }
    }

    if graph.has_cycles() {
        let mut queue: VecDeque<String> = packages
            .iter()
            .filter(|p| p.is_dirty())
            .map(|p| p.name.clone())
            .collect();

        while let Some(current) = queue.pop_front() {
            for dependent in graph.dependents(&current) {
                let Some(&j) = index.get(dependent) else { continue };
                if !packages[j].is_dirty() {
                    packages[j].change_state =
                        ChangeState::Dirty(ChangeReason::DependencyChanged(current.clone()));
                    queue.push_back(dependent.clone());
                }
            }
        }
    }

    let dirty = packages.iter().filter(|p| p.is_dirty()).count();
    info!(dirty, total = packages.len(), "change propagation complete");
}

#[cfg(test)]
pub(crate) mod fake {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use chrono::{DateTime, FixedOffset};

    use crate::error::{GitError, Result};
    use crate::traits::VersionControl;

    /// In-memory version control with preset commit counts per package directory
    #[derive(Default)]
    pub struct FakeVcs {
        pub counts: HashMap<PathBuf, usize>,
        pub failing: Vec<PathBuf>,
        pub branch: RefCell<Option<String>>,
        pub commits: RefCell<Vec<(Vec<PathBuf>, String)>>,
        pub tags: RefCell<Vec<(String, String)>>,
        pub fail_commit: bool,
        pub fail_checkout: bool,
    }

    impl FakeVcs {
        pub fn with_count(mut self, dir: impl Into<PathBuf>, count: usize) -> Self {
            self.counts.insert(dir.into(), count);
            self
        }
    }

    impl VersionControl for FakeVcs {
        fn current_branch(&self) -> Result<Option<String>> {
            Ok(self.branch.borrow().clone())
        }

        fn count_commits(
            &self,
            path: &Path,
            _since: Option<DateTime<FixedOffset>>,
            _exclude: &[PathBuf],
            _marker: &str,
        ) -> Result<usize> {
            if self.failing.iter().any(|p| p == path) {
                return Err(GitError::OpenFailed("object database unavailable".to_string()).into());
            }
            Ok(self.counts.get(path).copied().unwrap_or(0))
        }

        fn checkout_branch(&self, branch: &str) -> Result<()> {
            if self.fail_checkout {
                return Err(GitError::CheckoutFailed {
                    branch: branch.to_string(),
                    reason: "uncommitted changes".to_string(),
                }
                .into());
            }
            *self.branch.borrow_mut() = Some(branch.to_string());
            Ok(())
        }

        fn commit_files(&self, files: &[PathBuf], message: &str) -> Result<String> {
            if self.fail_commit {
                return Err(GitError::CommitFailed("index locked".to_string()).into());
            }
            self.commits
                .borrow_mut()
                .push((files.to_vec(), message.to_string()));
            Ok(format!("{:07x}", self.commits.borrow().len()))
        }

        fn create_tag(&self, name: &str, message: &str) -> Result<()> {
            self.tags
                .borrow_mut()
                .push((name.to_string(), message.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeVcs;
    use super::*;
    use crate::monorepo::graph::record;

    fn states(packages: &[PackageRecord]) -> Vec<(&str, bool)> {
        packages.iter().map(|p| (p.name.as_str(), p.is_dirty())).collect()
    }

    #[test]
    fn test_detect_direct_changes() {
        let mut packages = vec![record("core", &[]), record("app", &["core"])];
        let vcs = FakeVcs::default().with_count(packages[0].full_path.clone(), 2);

        ChangeDetector::new(&vcs).detect(&mut packages);
        assert_eq!(
            packages[0].change_state,
            ChangeState::Dirty(ChangeReason::DirectChanges)
        );
        assert_eq!(packages[0].new_commits, Some(2));
        assert_eq!(packages[1].change_state, ChangeState::Clean);
    }

    #[test]
    fn test_query_failure_is_unknown() {
        let mut packages = vec![record("core", &[]), record("app", &["core"])];
        let vcs = FakeVcs {
            failing: vec![packages[0].full_path.clone()],
            ..FakeVcs::default()
        };
        let graph = DependencyGraph::build(&packages);

        ChangeDetector::new(&vcs).detect_and_propagate(&mut packages, &graph);
        assert!(matches!(packages[0].change_state, ChangeState::Unknown(_)));
        assert_eq!(packages[0].new_commits, None);
        // Unknown does not spread
        assert_eq!(packages[1].change_state, ChangeState::Clean);
    }

    #[test]
    fn test_propagation_is_transitive() {
        let mut packages = vec![
            record("core", &[]),
            record("utils", &["core"]),
            record("cli", &["utils"]),
            record("standalone", &[]),
        ];
        let vcs = FakeVcs::default().with_count(packages[0].full_path.clone(), 1);
        let graph = DependencyGraph::build(&packages);

        ChangeDetector::new(&vcs).detect_and_propagate(&mut packages, &graph);
        assert_eq!(
            states(&packages),
            vec![("core", true), ("utils", true), ("cli", true), ("standalone", false)]
        );
        assert_eq!(
            packages[2].change_state,
            ChangeState::Dirty(ChangeReason::DependencyChanged("utils".to_string()))
        );
    }

    #[test]
    fn test_propagation_independent_of_slice_order() {
        // Records deliberately listed dependents-first
        let mut packages = vec![
            record("cli", &["utils"]),
            record("utils", &["core"]),
            record("core", &[]),
        ];
        packages[2].change_state = ChangeState::Dirty(ChangeReason::DirectChanges);
        let graph = DependencyGraph::build(&packages);

        propagate(&mut packages, &graph);
        assert!(packages.iter().all(|p| p.is_dirty()));
    }

    #[test]
    fn test_unknown_becomes_dirty_from_dependency() {
        let mut packages = vec![record("core", &[]), record("app", &["core"])];
        packages[0].change_state = ChangeState::Dirty(ChangeReason::DirectChanges);
        packages[1].change_state = ChangeState::Unknown("boom".to_string());
        let graph = DependencyGraph::build(&packages);

        propagate(&mut packages, &graph);
        assert!(packages[1].is_dirty());
    }

    #[test]
    fn test_lookup_failure_overrides_direct_changes() {
        let mut packages = vec![
            record("core", &[]),
            record("utils", &[]),
            record("app", &["core", "utils"]),
        ];
        let vcs = FakeVcs::default()
            .with_count(packages[0].full_path.clone(), 3)
            .with_count(packages[2].full_path.clone(), 1);
        let failures: HashMap<String, String> = [
            ("core".to_string(), "ETIMEDOUT".to_string()),
            ("app".to_string(), "ETIMEDOUT".to_string()),
        ]
        .into_iter()
        .collect();
        let graph = DependencyGraph::build(&packages);
        packages = graph.order_packages(packages);

        ChangeDetector::new(&vcs)
            .with_lookup_failures(failures)
            .detect_and_propagate(&mut packages, &graph);
        assert_eq!(
            packages[0].change_state,
            ChangeState::Unknown("registry lookup failed: ETIMEDOUT".to_string())
        );
        assert_eq!(packages[0].new_commits, Some(3));
        assert_eq!(packages[1].change_state, ChangeState::Clean);
        assert!(matches!(packages[2].change_state, ChangeState::Unknown(_)));
    }

    #[test]
    fn test_propagation_through_cycle() {
        let mut packages = vec![
            record("a", &["b"]),
            record("b", &["a"]),
            record("c", &["b"]),
            record("d", &[]),
        ];
        packages[1].change_state = ChangeState::Dirty(ChangeReason::DirectChanges);
        let graph = DependencyGraph::build(&packages);
        assert!(graph.has_cycles());

        propagate(&mut packages, &graph);
        assert_eq!(
            states(&packages),
            vec![("a", true), ("b", true), ("c", true), ("d", false)]
        );
    }
}

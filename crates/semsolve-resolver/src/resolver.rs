//! Fixpoint pass scheduler: fetch versions, resolve versions, fetch
//! dependencies, install constraints, and repeat until no library is left
//! waiting for a decision.

use std::collections::{BTreeMap, HashSet};

use semver::Version;

use crate::cache::RegistryCache;
use crate::config::ResolverConfig;
use crate::conflict::{self, BacktrackReport, Outcome};
use crate::error::{OracleError, ResolveError};
use crate::graph::{find_cycle, DepEdge, DependencyGraph, ResolvedNode};
use crate::oracle::VersionOracle;
use crate::store::{ConstraintStore, Constraints, DependencyConstraint};
use crate::version::VersionRange;

/// Display name of the root node in [`Resolution::graph`].
const ROOT_NAME: &str = "root";

/// Resolves a set of root requirements to one version per library.
///
/// ```no_run
/// # async fn example() -> Result<(), semsolve_resolver::error::ResolveError> {
/// use semsolve_resolver::oracle::Registry;
/// use semsolve_resolver::resolver::SemverResolver;
///
/// let registry = Registry::new().with_version("left-pad", "1.3.0", &[]);
/// let resolution = SemverResolver::new([("left-pad", "^1.0.0")], registry)?
///     .resolve()
///     .await?;
/// assert_eq!(resolution.get("left-pad").unwrap().to_string(), "1.3.0");
/// # Ok(())
/// # }
/// ```
pub struct SemverResolver<O> {
    oracle: O,
    config: ResolverConfig,
    store: ConstraintStore,
    cache: RegistryCache,
    /// Libraries waiting for a version decision.
    queued_calculations: Vec<String>,
    /// Resolved libraries whose dependency ranges still need installing.
    queued_constraint_updates: Vec<String>,
    backtracks: BacktrackReport,
    passes: usize,
}

impl<O: VersionOracle> SemverResolver<O> {
    /// Create a resolver for the root requirements `name -> range`.
    ///
    /// Fails if a root range cannot be parsed.
    pub fn new<I, K, R>(requirements: I, oracle: O) -> Result<Self, ResolveError>
    where
        I: IntoIterator<Item = (K, R)>,
        K: Into<String>,
        R: AsRef<str>,
    {
        let mut root = Constraints::new();
        for (name, range) in requirements {
            let name = name.into();
            let range = parse_range(&name, range.as_ref(), ROOT_NAME)?;
            root.insert(name, DependencyConstraint::declared(range));
        }
        let queued_calculations = root.keys().cloned().collect();

        Ok(Self {
            oracle,
            config: ResolverConfig::default(),
            store: ConstraintStore::new(root),
            cache: RegistryCache::new(),
            queued_calculations,
            queued_constraint_updates: Vec::new(),
            backtracks: BacktrackReport::new(),
            passes: 0,
        })
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Run passes until a fixpoint is reached.
    pub async fn resolve(mut self) -> Result<Resolution, ResolveError> {
        while !self.queued_calculations.is_empty() {
            if self.config.max_passes.is_some_and(|max| self.passes >= max) {
                return Err(self.pass_limit_exceeded());
            }
            self.passes += 1;
            tracing::debug!(
                "Pass {}: {} libraries to calculate",
                self.passes,
                self.queued_calculations.len()
            );

            self.fetch_versions().await?;
            self.resolve_versions()?;
            self.fetch_dependencies().await?;
            self.install_constraints()?;
        }

        tracing::debug!(
            "Resolution reached a fixpoint after {} passes ({} backtracks)",
            self.passes,
            self.backtracks.len()
        );
        Ok(self.into_resolution())
    }

    /// Step 1: make sure every queued library has its version list cached.
    async fn fetch_versions(&mut self) -> Result<(), ResolveError> {
        self.cache
            .prefetch_versions(&self.oracle, &self.queued_calculations)
            .await?;
        Ok(())
    }

    /// Step 2: pick a version for every queued library.
    fn resolve_versions(&mut self) -> Result<(), ResolveError> {
        let queued = std::mem::take(&mut self.queued_calculations);
        for library in queued {
            // Requeued by a backtrack earlier in this step; it may have been
            // orphaned and waits for the next pass.
            if self.queued_calculations.contains(&library) {
                continue;
            }

            let versions = self
                .cache
                .versions(&library)
                .ok_or_else(|| OracleError::UnknownLibrary(library.clone()))?;
            match conflict::resolve_library(&mut self.store, versions, &library)? {
                Outcome::Resolved(version) => {
                    self.store.insert_resolved(&library, version);
                    self.queued_constraint_updates.push(library);
                }
                Outcome::NoDemand => {}
                Outcome::Backtracked { backtrack, requeue } => {
                    self.queued_calculations.extend(requeue);
                    self.backtracks.add(backtrack);
                }
            }
        }

        let store = &self.store;
        let mut seen = HashSet::new();
        self.queued_constraint_updates
            .retain(|library| store.contains(library) && seen.insert(library.clone()));
        Ok(())
    }

    /// Step 3: make sure every newly resolved release has its dependency
    /// ranges cached.
    async fn fetch_dependencies(&mut self) -> Result<(), ResolveError> {
        let pairs: Vec<(String, Version)> = self
            .queued_constraint_updates
            .iter()
            .filter_map(|library| {
                let version = self.store.version_of(library)?;
                Some((library.clone(), version.clone()))
            })
            .collect();
        self.cache
            .prefetch_dependencies(&self.oracle, &pairs)
            .await?;
        Ok(())
    }

    /// Step 4: attach dependency ranges to their owners and queue every
    /// dependency for calculation.
    fn install_constraints(&mut self) -> Result<(), ResolveError> {
        let updates = std::mem::take(&mut self.queued_constraint_updates);
        for library in updates {
            self.update_constraints(&library)?;
        }

        let requeue = self.store.prune_orphans();
        self.queued_calculations.extend(requeue);
        let store = &self.store;
        let mut seen = HashSet::new();
        self.queued_calculations
            .retain(|library| store.is_referenced(library) && seen.insert(library.clone()));
        Ok(())
    }

    fn update_constraints(&mut self, library: &str) -> Result<(), ResolveError> {
        // Dropped by an earlier update in this step.
        let Some(version) = self.store.version_of(library).cloned() else {
            return Ok(());
        };
        let owner = format!("{library}@{version}");

        let mut dependencies = Constraints::new();
        if let Some(ranges) = self.cache.dependencies(library, &version) {
            for (dep, range) in ranges {
                let range = parse_range(dep, range, &owner)?;
                dependencies.insert(dep.clone(), DependencyConstraint::declared(range));
            }
        }
        let names: Vec<String> = dependencies.keys().cloned().collect();
        self.store.install_dependencies(library, dependencies);

        // Any earlier resolution of a dependency was made without these
        // constraints.
        for dep in names {
            let requeue = self.store.drop_library(&dep);
            self.queued_calculations.extend(requeue);
            self.queued_calculations.push(dep);
        }
        Ok(())
    }

    fn pass_limit_exceeded(&self) -> ResolveError {
        let cycle = find_cycle(self.cache.declared_edges());
        tracing::warn!(
            "Giving up after {} passes with {} libraries still queued",
            self.passes,
            self.queued_calculations.len()
        );
        ResolveError::PassLimitExceeded {
            passes: self.passes,
            cycle,
        }
    }

    fn into_resolution(self) -> Resolution {
        let versions = self
            .store
            .resolved_versions()
            .map(|(name, version)| (name.to_string(), version.clone()))
            .collect();

        let mut edges = Vec::new();
        for (owner, state) in self.store.owners() {
            let Some(dependencies) = &state.dependencies else {
                continue;
            };
            for (dep, constraint) in dependencies {
                if let Some(range) = constraint.declared_range() {
                    edges.push(ResolvedEdge {
                        from: owner.name().map(str::to_string),
                        to: dep.clone(),
                        range: range.to_string(),
                    });
                }
            }
        }

        Resolution {
            versions,
            edges,
            passes: self.passes,
            backtracks: self.backtracks,
        }
    }
}

fn parse_range(library: &str, range: &str, owner: &str) -> Result<VersionRange, ResolveError> {
    VersionRange::parse(range).map_err(|source| ResolveError::InvalidRange {
        library: library.to_string(),
        range: range.to_string(),
        owner: owner.to_string(),
        source,
    })
}

/// A declared dependency edge in the final state. `from` is `None` for the
/// root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEdge {
    pub from: Option<String>,
    pub to: String,
    pub range: String,
}

/// The output of a successful resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    versions: BTreeMap<String, Version>,
    edges: Vec<ResolvedEdge>,
    passes: usize,
    backtracks: BacktrackReport,
}

impl Resolution {
    /// Every transitively required library and its version.
    pub fn versions(&self) -> &BTreeMap<String, Version> {
        &self.versions
    }

    pub fn into_versions(self) -> BTreeMap<String, Version> {
        self.versions
    }

    pub fn get(&self, library: &str) -> Option<&Version> {
        self.versions.get(library)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Number of fixpoint passes it took.
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn backtracks(&self) -> &BacktrackReport {
        &self.backtracks
    }

    /// Declared dependency edges, root edges first.
    pub fn edges(&self) -> &[ResolvedEdge] {
        &self.edges
    }

    /// The resolution as a dependency graph rooted at the requirements.
    pub fn graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        let root = graph.add_root(ROOT_NAME);
        for (name, version) in &self.versions {
            graph.add_node(ResolvedNode {
                name: name.clone(),
                version: Some(version.clone()),
            });
        }
        for edge in &self.edges {
            let from = match &edge.from {
                Some(name) => graph.find(name),
                None => Some(root),
            };
            if let (Some(from), Some(to)) = (from, graph.find(&edge.to)) {
                graph.add_edge(
                    from,
                    to,
                    DepEdge {
                        range: edge.range.clone(),
                    },
                );
            }
        }
        graph
    }
}

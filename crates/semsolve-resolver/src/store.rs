//! The constraint store: which owner places which range on which library,
//! and which version each library currently resolves to.
//!
//! All mutation goes through [`ConstraintStore`] so the structural
//! invariants hold centrally:
//! - a non-root owner is present exactly while it holds a resolved version
//! - dropping an owner drops, transitively, every library it constrained

use std::fmt;

use indexmap::IndexMap;
use semver::Version;

use crate::version::VersionRange;

/// Identity of an entity that can impose constraints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerKey {
    /// The synthetic root holding the caller's requirements.
    Root,
    /// A resolved library.
    Library(String),
}

impl OwnerKey {
    pub fn library(name: &str) -> Self {
        OwnerKey::Library(name.to_string())
    }

    /// The library name, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        match self {
            OwnerKey::Root => None,
            OwnerKey::Library(name) => Some(name),
        }
    }
}

/// A range one owner places on one library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyConstraint {
    /// A range the owner declared itself.
    Declared { range: VersionRange },
    /// A range narrowed so that the constrained library moves below a
    /// version that conflicted while resolving `due_to`. `declared` keeps the
    /// owner's own range on the same library, if it had one.
    Backtrack {
        range: VersionRange,
        declared: Option<VersionRange>,
        due_to: String,
    },
}

impl DependencyConstraint {
    pub fn declared(range: VersionRange) -> Self {
        DependencyConstraint::Declared { range }
    }

    /// The effective range checked during resolution.
    pub fn range(&self) -> &VersionRange {
        match self {
            DependencyConstraint::Declared { range } => range,
            DependencyConstraint::Backtrack { range, .. } => range,
        }
    }

    /// The range the owner declared, ignoring any backtrack narrowing.
    pub fn declared_range(&self) -> Option<&VersionRange> {
        match self {
            DependencyConstraint::Declared { range } => Some(range),
            DependencyConstraint::Backtrack { declared, .. } => declared.as_ref(),
        }
    }

    /// The library whose conflict produced this narrowing, if any.
    pub fn backtracked_due_to(&self) -> Option<&str> {
        match self {
            DependencyConstraint::Declared { .. } => None,
            DependencyConstraint::Backtrack { due_to, .. } => Some(due_to),
        }
    }
}

/// Dependency constraints of one owner, in declaration order.
pub type Constraints = IndexMap<String, DependencyConstraint>;

/// State of one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerState {
    /// `None` for the root, which is never resolved.
    pub version: Option<Version>,
    /// `None` until the owner's dependency ranges are installed.
    pub dependencies: Option<Constraints>,
}

impl OwnerState {
    fn constraint_on(&self, library: &str) -> Option<&DependencyConstraint> {
        self.dependencies.as_ref()?.get(library)
    }

    fn dependency_names(&self) -> Vec<String> {
        self.dependencies
            .as_ref()
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Renders an owner as it appears in error messages: `root` or `name@version`.
pub struct OwnerDisplay<'a>(pub &'a OwnerKey, pub &'a OwnerState);

impl fmt::Display for OwnerDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.0, &self.1.version) {
            (OwnerKey::Library(name), Some(version)) => write!(f, "{name}@{version}"),
            _ => f.write_str("root"),
        }
    }
}

/// One owner's constraint on a library, as returned by
/// [`ConstraintStore::constrainers_of`].
#[derive(Debug)]
pub struct Constrainer<'a> {
    pub owner: &'a OwnerKey,
    pub state: &'a OwnerState,
    pub constraint: &'a DependencyConstraint,
}

/// Owners keyed by identity. Iteration follows insertion order: the root
/// first, then libraries in the order they were resolved.
#[derive(Debug, Clone)]
pub struct ConstraintStore {
    owners: IndexMap<OwnerKey, OwnerState>,
}

impl ConstraintStore {
    /// Create a store holding only the root and its requirements.
    pub fn new(root_requirements: Constraints) -> Self {
        let mut owners = IndexMap::new();
        owners.insert(
            OwnerKey::Root,
            OwnerState {
                version: None,
                dependencies: Some(root_requirements),
            },
        );
        Self { owners }
    }

    pub fn get(&self, owner: &OwnerKey) -> Option<&OwnerState> {
        self.owners.get(owner)
    }

    /// Whether `library` currently holds a resolved version.
    pub fn contains(&self, library: &str) -> bool {
        self.owners.contains_key(&OwnerKey::library(library))
    }

    /// The resolved version of `library`, if any.
    pub fn version_of(&self, library: &str) -> Option<&Version> {
        self.owners
            .get(&OwnerKey::library(library))?
            .version
            .as_ref()
    }

    /// All owners in iteration order.
    pub fn owners(&self) -> impl Iterator<Item = (&OwnerKey, &OwnerState)> {
        self.owners.iter()
    }

    /// Record `library` as resolved to `version`. Its dependencies are
    /// installed separately by [`install_dependencies`].
    ///
    /// [`install_dependencies`]: ConstraintStore::install_dependencies
    pub fn insert_resolved(&mut self, library: &str, version: Version) {
        tracing::trace!("Resolved {library}@{version}");
        self.owners.insert(
            OwnerKey::library(library),
            OwnerState {
                version: Some(version),
                dependencies: None,
            },
        );
    }

    /// Attach dependency constraints to a present owner. Returns `false` if
    /// the owner was dropped in the meantime.
    pub fn install_dependencies(&mut self, library: &str, dependencies: Constraints) -> bool {
        match self.owners.get_mut(&OwnerKey::library(library)) {
            Some(state) => {
                state.dependencies = Some(dependencies);
                true
            }
            None => false,
        }
    }

    /// Every present owner constraining `library`, in iteration order.
    pub fn constrainers_of<'a>(&'a self, library: &'a str) -> impl Iterator<Item = Constrainer<'a>> {
        self.owners.iter().filter_map(move |(owner, state)| {
            state.constraint_on(library).map(|constraint| Constrainer {
                owner,
                state,
                constraint,
            })
        })
    }

    /// Whether `library` is named as a dependency by some present owner.
    pub fn is_referenced(&self, library: &str) -> bool {
        self.owners
            .values()
            .any(|state| state.constraint_on(library).is_some())
    }

    /// Whether `owner` is the root or is referenced by some present owner.
    pub fn is_reachable(&self, owner: &OwnerKey) -> bool {
        match owner {
            OwnerKey::Root => true,
            OwnerKey::Library(name) => self.is_referenced(name),
        }
    }

    /// Narrow `owner`'s constraint on `library` to versions below `below`,
    /// because `below` conflicted while resolving `due_to`.
    ///
    /// Any range `owner` already places on `library` is kept and intersected
    /// with the new bound.
    pub fn narrow(&mut self, owner: &OwnerKey, library: &str, below: &Version, due_to: &str) {
        let Some(state) = self.owners.get_mut(owner) else {
            return;
        };
        let deps = state.dependencies.get_or_insert_with(Constraints::new);
        let declared = deps
            .get(library)
            .and_then(DependencyConstraint::declared_range)
            .cloned();
        let bound = VersionRange::below(below);
        let range = match &declared {
            Some(declared) => declared.intersect(&bound),
            None => bound,
        };
        tracing::trace!("Narrowed {library} to {range} due to {due_to}");
        deps.insert(
            library.to_string(),
            DependencyConstraint::Backtrack {
                range,
                declared,
                due_to: due_to.to_string(),
            },
        );
    }

    /// Remove `library`'s resolution, then transitively every library it
    /// constrained, since their constraint provider is gone.
    ///
    /// Returns the dependency names that need re-resolution, deepest first,
    /// in the order a depth-first walk finishes them. Dependency cycles
    /// terminate because an owner is removed before its dependencies are
    /// visited.
    pub fn drop_library(&mut self, library: &str) -> Vec<String> {
        let mut requeue = Vec::new();
        let Some(state) = self.owners.shift_remove(&OwnerKey::library(library)) else {
            return requeue;
        };
        tracing::trace!("Dropped {library}");

        // Each frame is a removed owner's name (None for `library` itself)
        // and its not yet visited dependencies.
        let mut stack: Vec<(Option<String>, std::vec::IntoIter<String>)> =
            vec![(None, state.dependency_names().into_iter())];
        while let Some((_, pending)) = stack.last_mut() {
            match pending.next() {
                Some(dep) => match self.owners.shift_remove(&OwnerKey::library(&dep)) {
                    Some(dep_state) => {
                        tracing::trace!("Dropped {dep}");
                        let children = dep_state.dependency_names().into_iter();
                        stack.push((Some(dep), children));
                    }
                    None => requeue.push(dep),
                },
                None => {
                    if let Some((Some(finished), _)) = stack.pop() {
                        requeue.push(finished);
                    }
                }
            }
        }
        requeue
    }

    /// Drop every library no present owner references any more, with the
    /// usual cascade. Returns the names that need re-resolution.
    pub fn prune_orphans(&mut self) -> Vec<String> {
        let mut requeue = Vec::new();
        loop {
            let orphan = self
                .owners
                .keys()
                .filter_map(OwnerKey::name)
                .find(|name| !self.is_referenced(name))
                .map(str::to_string);
            let Some(orphan) = orphan else {
                return requeue;
            };
            tracing::trace!("Pruning orphan {orphan}");
            requeue.extend(self.drop_library(&orphan));
        }
    }

    /// Resolved versions of every present library.
    pub fn resolved_versions(&self) -> impl Iterator<Item = (&str, &Version)> {
        self.owners
            .iter()
            .filter_map(|(owner, state)| Some((owner.name()?, state.version.as_ref()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(range: &str) -> DependencyConstraint {
        DependencyConstraint::declared(VersionRange::parse(range).unwrap())
    }

    fn constraints(pairs: &[(&str, &str)]) -> Constraints {
        pairs
            .iter()
            .map(|(name, range)| (name.to_string(), declared(range)))
            .collect()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    /// root -> a -> {b, c}, b -> d
    fn chain() -> ConstraintStore {
        let mut store = ConstraintStore::new(constraints(&[("a", "^1.0.0")]));
        store.insert_resolved("a", v("1.0.0"));
        store.install_dependencies("a", constraints(&[("b", "^1.0.0"), ("c", "^1.0.0")]));
        store.insert_resolved("b", v("1.0.0"));
        store.install_dependencies("b", constraints(&[("d", "^1.0.0")]));
        store.insert_resolved("c", v("1.0.0"));
        store.install_dependencies("c", Constraints::new());
        store.insert_resolved("d", v("1.0.0"));
        store
    }

    #[test]
    fn root_is_present_and_unresolved() {
        let store = ConstraintStore::new(constraints(&[("a", "^1.0.0")]));
        let root = store.get(&OwnerKey::Root).unwrap();
        assert!(root.version.is_none());
        assert!(store.is_reachable(&OwnerKey::Root));
        assert_eq!(store.resolved_versions().count(), 0);
    }

    #[test]
    fn constrainers_follow_insertion_order() {
        let mut store = ConstraintStore::new(constraints(&[("a", "^1.0.0"), ("x", "^1.0.0")]));
        store.insert_resolved("a", v("1.0.0"));
        store.install_dependencies("a", constraints(&[("x", "1.0.0")]));

        let owners: Vec<String> = store
            .constrainers_of("x")
            .map(|c| OwnerDisplay(c.owner, c.state).to_string())
            .collect();
        assert_eq!(owners, vec!["root", "a@1.0.0"]);
    }

    #[test]
    fn owners_without_dependencies_constrain_nothing() {
        let mut store = ConstraintStore::new(constraints(&[("a", "^1.0.0")]));
        store.insert_resolved("a", v("1.0.0"));
        assert_eq!(store.constrainers_of("b").count(), 0);
        assert!(!store.is_referenced("b"));
    }

    #[test]
    fn drop_cascades_through_all_levels() {
        let mut store = chain();
        let requeue = store.drop_library("a");

        assert_eq!(requeue, vec!["d", "b", "c"]);
        for lib in ["a", "b", "c", "d"] {
            assert!(!store.contains(lib), "{lib} should be dropped");
        }
        assert!(store.is_reachable(&OwnerKey::library("a")));
        assert!(!store.is_reachable(&OwnerKey::library("b")));
    }

    #[test]
    fn drop_of_absent_library_is_a_no_op() {
        let mut store = chain();
        assert!(store.drop_library("zzz").is_empty());
        assert_eq!(store.resolved_versions().count(), 4);
    }

    #[test]
    fn drop_terminates_on_cycles() {
        let mut store = ConstraintStore::new(constraints(&[("a", "^1.0.0")]));
        store.insert_resolved("a", v("1.0.0"));
        store.install_dependencies("a", constraints(&[("b", "^1.0.0")]));
        store.insert_resolved("b", v("1.0.0"));
        store.install_dependencies("b", constraints(&[("a", "^1.0.0")]));

        let requeue = store.drop_library("a");
        assert_eq!(requeue, vec!["a", "b"]);
        assert!(!store.contains("a"));
        assert!(!store.contains("b"));
    }

    #[test]
    fn narrow_adds_backtrack_constraint() {
        let mut store = chain();
        store.narrow(&OwnerKey::library("c"), "b", &v("1.0.0"), "d");

        let c = store.get(&OwnerKey::library("c")).unwrap();
        let constraint = c.dependencies.as_ref().unwrap().get("b").unwrap();
        assert_eq!(constraint.range().to_string(), "<1.0.0");
        assert_eq!(constraint.backtracked_due_to(), Some("d"));
        assert!(constraint.declared_range().is_none());
        assert!(store.is_referenced("b"));
    }

    #[test]
    fn narrow_keeps_declared_range() {
        let mut store = chain();
        store.narrow(&OwnerKey::library("a"), "b", &v("1.0.0"), "d");

        let a = store.get(&OwnerKey::library("a")).unwrap();
        let constraint = a.dependencies.as_ref().unwrap().get("b").unwrap();
        assert_eq!(constraint.range().to_string(), "^1.0.0 <1.0.0");
        assert_eq!(
            constraint.declared_range().map(ToString::to_string),
            Some("^1.0.0".to_string())
        );
    }

    #[test]
    fn prune_removes_unreferenced_subtrees() {
        let mut store = chain();
        // a no longer names b; b and its dependency d are orphans
        store.install_dependencies("a", constraints(&[("c", "^1.0.0")]));

        let requeue = store.prune_orphans();
        assert_eq!(requeue, vec!["d"]);
        assert!(!store.contains("b"));
        assert!(!store.contains("d"));
        assert!(store.contains("a"));
        assert!(store.contains("c"));
    }

    #[test]
    fn install_on_dropped_owner_is_ignored() {
        let mut store = chain();
        store.drop_library("c");
        assert!(!store.install_dependencies("c", Constraints::new()));
    }

    #[test]
    fn owner_display() {
        let store = chain();
        let root = store.get(&OwnerKey::Root).unwrap();
        assert_eq!(OwnerDisplay(&OwnerKey::Root, root).to_string(), "root");
        let key = OwnerKey::library("b");
        let b = store.get(&key).unwrap();
        assert_eq!(OwnerDisplay(&key, b).to_string(), "b@1.0.0");
    }
}

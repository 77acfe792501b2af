//! The version oracle: where available versions and declared dependency
//! ranges come from.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use semver::Version;
use semsolve_util::errors::SemsolveError;

use crate::error::OracleError;

/// Declared dependency ranges of one library version, in declaration order.
pub type DependencyRanges = IndexMap<String, String>;

/// Source of version and dependency data for resolution.
#[async_trait::async_trait]
pub trait VersionOracle: Send + Sync {
    /// All published versions of `library`, in any order.
    async fn versions(&self, library: &str) -> Result<Vec<String>, OracleError>;

    /// The dependency ranges declared by `library` at `version`.
    ///
    /// Oracles without dependency data can rely on the default, which treats
    /// every library as a leaf.
    async fn dependencies(
        &self,
        library: &str,
        version: &Version,
    ) -> Result<DependencyRanges, OracleError> {
        let _ = (library, version);
        Ok(DependencyRanges::new())
    }
}

#[async_trait::async_trait]
impl<T: VersionOracle + ?Sized> VersionOracle for Arc<T> {
    async fn versions(&self, library: &str) -> Result<Vec<String>, OracleError> {
        (**self).versions(library).await
    }

    async fn dependencies(
        &self,
        library: &str,
        version: &Version,
    ) -> Result<DependencyRanges, OracleError> {
        (**self).dependencies(library, version).await
    }
}

/// An in-memory registry: `library -> version -> {dependency: range}`.
///
/// The JSON form is the same nesting:
///
/// ```json
/// { "left-pad": { "1.0.0": {}, "1.1.0": { "pad-core": "^2.0.0" } } }
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    libraries: IndexMap<String, IndexMap<String, DependencyRanges>>,
    version_calls: AtomicUsize,
    dependency_calls: AtomicUsize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Registry::add_version`].
    pub fn with_version(mut self, library: &str, version: &str, deps: &[(&str, &str)]) -> Self {
        self.add_version(library, version, deps);
        self
    }

    /// Publish `library@version` with the given dependency ranges.
    pub fn add_version(&mut self, library: &str, version: &str, deps: &[(&str, &str)]) {
        let ranges = deps
            .iter()
            .map(|(name, range)| (name.to_string(), range.to_string()))
            .collect();
        self.libraries
            .entry(library.to_string())
            .or_default()
            .insert(version.to_string(), ranges);
    }

    /// Parse a registry from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, SemsolveError> {
        Self::parse(json).map_err(|e| SemsolveError::Registry {
            message: format!("Failed to parse registry: {e}"),
        })
    }

    /// Load a registry JSON file.
    pub fn from_path(path: &Path) -> Result<Self, SemsolveError> {
        let content = semsolve_util::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| SemsolveError::Registry {
            message: format!("Failed to parse {}: {e}", path.display()),
        })
    }

    fn parse(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            libraries: serde_json::from_str(json)?,
            ..Self::default()
        })
    }

    /// Number of `versions` lookups served so far.
    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::Relaxed)
    }

    /// Number of `dependencies` lookups served so far.
    pub fn dependency_calls(&self) -> usize {
        self.dependency_calls.load(Ordering::Relaxed)
    }

    fn find_version<'a>(
        releases: &'a IndexMap<String, DependencyRanges>,
        version: &Version,
    ) -> Option<&'a DependencyRanges> {
        let exact = version.to_string();
        releases.get(&exact).or_else(|| {
            releases.iter().find_map(|(raw, deps)| {
                let raw = raw.trim().strip_prefix('v').unwrap_or(raw.trim());
                (Version::parse(raw).ok().as_ref() == Some(version)).then_some(deps)
            })
        })
    }
}

#[async_trait::async_trait]
impl VersionOracle for Registry {
    async fn versions(&self, library: &str) -> Result<Vec<String>, OracleError> {
        self.version_calls.fetch_add(1, Ordering::Relaxed);
        self.libraries
            .get(library)
            .map(|releases| releases.keys().cloned().collect())
            .ok_or_else(|| OracleError::UnknownLibrary(library.to_string()))
    }

    async fn dependencies(
        &self,
        library: &str,
        version: &Version,
    ) -> Result<DependencyRanges, OracleError> {
        self.dependency_calls.fetch_add(1, Ordering::Relaxed);
        let releases = self
            .libraries
            .get(library)
            .ok_or_else(|| OracleError::UnknownLibrary(library.to_string()))?;
        Self::find_version(releases, version)
            .cloned()
            .ok_or_else(|| OracleError::UnknownVersion {
                library: library.to_string(),
                version: version.to_string(),
            })
    }
}

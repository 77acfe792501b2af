//! Resolution session cache for avoiding redundant oracle lookups.
//!
//! Version lists and dependency ranges are immutable upstream data, so
//! entries are never invalidated for the lifetime of a resolver. Failed
//! lookups are not stored: the next request asks the oracle again.

use std::collections::{HashMap, HashSet};

use futures_util::future::try_join_all;
use semver::Version;

use crate::error::OracleError;
use crate::oracle::{DependencyRanges, VersionOracle};
use crate::version::sort_descending;

/// Memoized oracle results for one resolution session.
#[derive(Debug, Default)]
pub struct RegistryCache {
    /// Library -> available versions, highest first.
    versions: HashMap<String, Vec<Version>>,
    /// Library -> version -> declared dependency ranges.
    dependencies: HashMap<String, HashMap<Version, DependencyRanges>>,
}

impl RegistryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_versions(&self, library: &str) -> bool {
        self.versions.contains_key(library)
    }

    pub fn has_dependencies(&self, library: &str, version: &Version) -> bool {
        self.dependencies
            .get(library)
            .is_some_and(|by_version| by_version.contains_key(version))
    }

    /// Cached versions of `library`, highest first, if fetched. A fetched
    /// library with no releases yields an empty slice.
    pub fn versions(&self, library: &str) -> Option<&[Version]> {
        self.versions.get(library).map(Vec::as_slice)
    }

    /// Cached dependency ranges of `library@version`, if fetched.
    pub fn dependencies(&self, library: &str, version: &Version) -> Option<&DependencyRanges> {
        self.dependencies.get(library)?.get(version)
    }

    /// Versions of `library`, asking the oracle on first access.
    pub async fn versions_cached<O: VersionOracle + ?Sized>(
        &mut self,
        oracle: &O,
        library: &str,
    ) -> Result<&[Version], OracleError> {
        if !self.has_versions(library) {
            let raw = oracle.versions(library).await?;
            self.store_versions(library, &raw);
        }
        self.versions(library)
            .ok_or_else(|| OracleError::UnknownLibrary(library.to_string()))
    }

    /// Dependency ranges of `library@version`, asking the oracle on first access.
    pub async fn dependencies_cached<O: VersionOracle + ?Sized>(
        &mut self,
        oracle: &O,
        library: &str,
        version: &Version,
    ) -> Result<&DependencyRanges, OracleError> {
        if !self.has_dependencies(library, version) {
            let ranges = oracle.dependencies(library, version).await?;
            self.store_dependencies(library, version, ranges);
        }
        Ok(&self.dependencies[library][version])
    }

    /// Fetch version lists for every uncached library concurrently.
    ///
    /// The first oracle failure aborts the batch; nothing from a failed batch
    /// is stored. Returns the number of libraries fetched.
    pub async fn prefetch_versions<O: VersionOracle + ?Sized>(
        &mut self,
        oracle: &O,
        libraries: &[String],
    ) -> Result<usize, OracleError> {
        let mut seen = HashSet::new();
        let mut pending: Vec<&str> = Vec::new();
        for library in libraries {
            if !self.has_versions(library) && seen.insert(library.as_str()) {
                pending.push(library);
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }

        tracing::debug!("Fetching versions for {} libraries", pending.len());
        let fetched =
            try_join_all(pending.iter().copied().map(|lib| oracle.versions(lib))).await?;
        for (library, raw) in pending.iter().zip(fetched) {
            self.store_versions(library, &raw);
        }
        Ok(pending.len())
    }

    /// Fetch dependency ranges for every uncached `library@version` pair
    /// concurrently, with the same failure rules as [`prefetch_versions`].
    ///
    /// [`prefetch_versions`]: RegistryCache::prefetch_versions
    pub async fn prefetch_dependencies<O: VersionOracle + ?Sized>(
        &mut self,
        oracle: &O,
        pairs: &[(String, Version)],
    ) -> Result<usize, OracleError> {
        let mut seen = HashSet::new();
        let mut pending: Vec<&(String, Version)> = Vec::new();
        for pair in pairs {
            if !self.has_dependencies(&pair.0, &pair.1) && seen.insert(pair) {
                pending.push(pair);
            }
        }
        if pending.is_empty() {
            return Ok(0);
        }

        tracing::debug!("Fetching dependencies for {} releases", pending.len());
        let fetched =
            try_join_all(pending.iter().copied().map(|(lib, ver)| oracle.dependencies(lib, ver)))
                .await?;
        for ((library, version), ranges) in pending.iter().copied().zip(fetched) {
            self.store_dependencies(library, version, ranges);
        }
        Ok(pending.len())
    }

    /// Every `library -> dependency` edge declared by any cached release.
    pub fn declared_edges(&self) -> Vec<(&str, &str)> {
        let mut edges: Vec<(&str, &str)> = self
            .dependencies
            .iter()
            .flat_map(|(library, by_version)| {
                by_version
                    .values()
                    .flat_map(|ranges| ranges.keys())
                    .map(move |dep| (library.as_str(), dep.as_str()))
            })
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    fn store_versions(&mut self, library: &str, raw: &[String]) {
        let sorted = sort_descending(library, raw);
        tracing::trace!("Cached {} versions of {library}", sorted.len());
        self.versions.insert(library.to_string(), sorted);
    }

    fn store_dependencies(&mut self, library: &str, version: &Version, ranges: DependencyRanges) {
        self.dependencies
            .entry(library.to_string())
            .or_default()
            .insert(version.clone(), ranges);
    }
}

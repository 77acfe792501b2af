//! Resolver settings, loadable from the `[resolver]` table of `semsolve.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use semsolve_util::errors::SemsolveError;

/// File name searched for in the working directory and its ancestors.
pub const CONFIG_FILE: &str = "semsolve.toml";

/// Top-level shape of `semsolve.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SemsolveConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,
}

/// Settings for one resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Stop with an error after this many fixpoint passes. Unbounded if unset.
    #[serde(default, rename = "max-passes")]
    pub max_passes: Option<usize>,
}

impl SemsolveConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, SemsolveError> {
        toml::from_str(content).map_err(|e| SemsolveError::Config {
            message: format!("Failed to parse {CONFIG_FILE}: {e}"),
        })
    }

    /// Load configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, SemsolveError> {
        let content = semsolve_util::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load `semsolve.toml` from `start` or the nearest ancestor that has
    /// one, or return defaults if there is none.
    pub fn discover(start: &Path) -> Result<Self, SemsolveError> {
        match Self::discover_path(start) {
            Some(path) => {
                tracing::debug!("Using configuration from {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    fn discover_path(start: &Path) -> Option<PathBuf> {
        semsolve_util::fs::find_ancestor_with(start, CONFIG_FILE).map(|dir| dir.join(CONFIG_FILE))
    }
}

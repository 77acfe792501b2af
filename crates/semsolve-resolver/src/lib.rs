//! Semantic version constraint resolution: pick one version per library so
//! that every declared range is satisfied, backtracking owners whose ranges
//! conflict.

pub mod cache;
pub mod config;
pub mod conflict;
pub mod error;
pub mod graph;
pub mod oracle;
pub mod resolver;
pub mod store;
pub mod version;

pub use config::{ResolverConfig, SemsolveConfig};
pub use error::{OracleError, ResolveError};
pub use oracle::{DependencyRanges, Registry, VersionOracle};
pub use resolver::{Resolution, SemverResolver};

//! Error types for oracle lookups and resolution failures.

use miette::Diagnostic;
use thiserror::Error;

/// Failure reported by a [`VersionOracle`](crate::oracle::VersionOracle).
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum OracleError {
    #[error("No such library: {0}")]
    UnknownLibrary(String),

    #[error("No such version: {library}@{version}")]
    UnknownVersion { library: String, version: String },

    #[error("Registry unavailable: {message}")]
    Unavailable { message: String },
}

/// A terminal resolution failure. None of these are retried.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    /// The oracle does not know a library or library version.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Oracle(#[from] OracleError),

    /// No available version matches a declared range.
    #[error("Unable to satisfy version constraint: {library}@{range} from {constrainer}")]
    #[diagnostic(code(semsolve::unsatisfiable))]
    Unsatisfiable {
        library: String,
        range: String,
        constrainer: String,
    },

    /// A range narrowed by an earlier backtrack has no matching version left.
    #[error(
        "Unable to satisfy backtracked version constraint: {library}@{range} from {constrainer} \
         due to shared constraint on {due_to}"
    )]
    #[diagnostic(
        code(semsolve::backtrack_exhausted),
        help("every earlier release was tried to make room for the shared dependency")
    )]
    BacktrackUnsatisfiable {
        library: String,
        range: String,
        constrainer: String,
        due_to: String,
    },

    /// A conflict could only be fixed by revising the root requirements.
    #[error(
        "Unable to satisfy version constraint: {library}@{range} from root due to shared \
         constraint from {constrainer}"
    )]
    #[diagnostic(
        code(semsolve::root_conflict),
        help("root requirements are never backtracked; relax the root range")
    )]
    RootConflict {
        library: String,
        range: String,
        constrainer: String,
    },

    /// A declared range could not be parsed.
    #[error("Invalid version range `{range}` for {library} declared by {owner}")]
    #[diagnostic(code(semsolve::invalid_range))]
    InvalidRange {
        library: String,
        range: String,
        owner: String,
        #[source]
        source: semver::Error,
    },

    /// The configured pass limit was reached before a fixpoint.
    #[error("Resolution did not converge after {} passes{}", .passes, describe_cycle(.cycle))]
    #[diagnostic(
        code(semsolve::pass_limit),
        help("raise `max-passes` in semsolve.toml or break the dependency cycle")
    )]
    PassLimitExceeded { passes: usize, cycle: Vec<String> },
}

fn describe_cycle(cycle: &[String]) -> String {
    match cycle.first() {
        Some(first) => format!("; dependency cycle suspected: {} -> {first}", cycle.join(" -> ")),
        None => String::new(),
    }
}

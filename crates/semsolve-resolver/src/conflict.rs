//! Per-library version selection with conflict detection and backtracking.
//!
//! Backtracking is structural: when the best candidate for a library
//! violates another owner's range, the offending owner is not undone on a
//! decision stack. Instead the constraining owner gains a synthetic
//! `<version` constraint on it, the offending owner is dropped, and the
//! ordinary pass loop re-derives a consistent state.

use std::fmt;

use semver::Version;

use crate::error::ResolveError;
use crate::store::{Constrainer, ConstraintStore, OwnerDisplay, OwnerKey};
use crate::version::max_satisfying;

/// Result of one resolution attempt for a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The candidate satisfies every current constraint.
    Resolved(Version),
    /// No present owner constrains the library any more.
    NoDemand,
    /// A conflicting owner was dropped; the library must wait for a later pass.
    Backtracked {
        backtrack: Backtrack,
        /// Libraries to re-enqueue for calculation, in order.
        requeue: Vec<String>,
    },
}

/// A single backtrack: `owner@owner_version` was pushed below its version
/// because it rejected `candidate` of `library`, which `constrainer`
/// required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backtrack {
    pub library: String,
    pub candidate: Version,
    pub constrainer: String,
    pub owner: String,
    pub owner_version: Version,
    pub owner_range: String,
}

impl fmt::Display for Backtrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} rejects {}@{} (needs {}) required by {}; retrying {} below {}",
            self.owner,
            self.owner_version,
            self.library,
            self.candidate,
            self.owner_range,
            self.constrainer,
            self.owner,
            self.owner_version
        )
    }
}

/// All backtracks performed during a resolution, in order.
#[derive(Debug, Default, Clone)]
pub struct BacktrackReport {
    pub backtracks: Vec<Backtrack>,
}

impl BacktrackReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, backtrack: Backtrack) {
        self.backtracks.push(backtrack);
    }

    pub fn is_empty(&self) -> bool {
        self.backtracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.backtracks.len()
    }
}

impl fmt::Display for BacktrackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.backtracks.is_empty() {
            return write!(f, "No backtracking needed.");
        }
        writeln!(f, "Backtracks ({}):", self.backtracks.len())?;
        for b in &self.backtracks {
            writeln!(f, "  {b}")?;
        }
        Ok(())
    }
}

/// One constraint on the library together with its best version for this
/// attempt. The max-satisfying value lives only as long as the attempt.
struct Candidate<'a> {
    constrainer: Constrainer<'a>,
    max_satisfying: &'a Version,
}

/// Pick a version for `library` given every constraint currently in `store`.
///
/// `versions` is the library's cached version list, highest first.
pub fn resolve_library(
    store: &mut ConstraintStore,
    versions: &[Version],
    library: &str,
) -> Result<Outcome, ResolveError> {
    let mut candidates = Vec::new();
    for constrainer in store.constrainers_of(library) {
        let range = constrainer.constraint.range();
        let Some(max) = max_satisfying(versions, range) else {
            return Err(unsatisfiable(library, &constrainer));
        };
        candidates.push(Candidate {
            constrainer,
            max_satisfying: max,
        });
    }

    // Lowest max-satisfying version wins; ties go to the first owner.
    let mut lowest: Option<&Candidate<'_>> = None;
    for candidate in &candidates {
        if lowest.map_or(true, |l| candidate.max_satisfying < l.max_satisfying) {
            lowest = Some(candidate);
        }
    }
    let Some(lowest) = lowest else {
        return Ok(Outcome::NoDemand);
    };
    let version = lowest.max_satisfying;

    let conflict = candidates.iter().find(|c| {
        c.constrainer.owner != lowest.constrainer.owner
            && !c.constrainer.constraint.range().matches(version)
    });
    let Some(conflict) = conflict else {
        return Ok(Outcome::Resolved(version.clone()));
    };

    let constrainer = OwnerDisplay(lowest.constrainer.owner, lowest.constrainer.state).to_string();
    let owner_range = conflict.constrainer.constraint.range().to_string();
    let (OwnerKey::Library(owner), Some(owner_version)) =
        (conflict.constrainer.owner, &conflict.constrainer.state.version)
    else {
        return Err(ResolveError::RootConflict {
            library: library.to_string(),
            range: owner_range,
            constrainer,
        });
    };

    let backtrack = Backtrack {
        library: library.to_string(),
        candidate: version.clone(),
        constrainer,
        owner: owner.clone(),
        owner_version: owner_version.clone(),
        owner_range,
    };
    let constraining_owner = lowest.constrainer.owner.clone();
    drop(candidates);

    tracing::debug!("Backtracking: {backtrack}");
    store.narrow(
        &constraining_owner,
        &backtrack.owner,
        &backtrack.owner_version,
        library,
    );
    let mut requeue = store.drop_library(&backtrack.owner);
    requeue.push(backtrack.owner.clone());

    Ok(Outcome::Backtracked { backtrack, requeue })
}

fn unsatisfiable(library: &str, constrainer: &Constrainer<'_>) -> ResolveError {
    let range = constrainer.constraint.range().to_string();
    let owner = OwnerDisplay(constrainer.owner, constrainer.state).to_string();
    match constrainer.constraint.backtracked_due_to() {
        Some(due_to) => ResolveError::BacktrackUnsatisfiable {
            library: library.to_string(),
            range,
            constrainer: owner,
            due_to: due_to.to_string(),
        },
        None => ResolveError::Unsatisfiable {
            library: library.to_string(),
            range,
            constrainer: owner,
        },
    }
}

use std::path::{Path, PathBuf};

use crate::errors::SemsolveError;

/// Walk up from `start` looking for a file named `filename`.
/// Returns the path to the directory containing the file, or `None`.
pub fn find_ancestor_with(start: &Path, filename: &str) -> Option<PathBuf> {
    let mut current = start;
    loop {
        let candidate = current.join(filename);
        if candidate.is_file() {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }
}

/// Read a file to a string, naming the path in the error.
pub fn read_to_string(path: &Path) -> Result<String, SemsolveError> {
    tracing::trace!("Reading {}", path.display());
    std::fs::read_to_string(path).map_err(|e| {
        SemsolveError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", path.display()),
        ))
    })
}

use std::path::{Path, PathBuf};

use crate::errors::WiringError;

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

/// Read a UTF-8 file, attaching the path to any I/O error.
pub fn read_to_string(path: &Path) -> Result<String, WiringError> {
    std::fs::read_to_string(path).map_err(|source| WiringError::Read {
        path: path.display().to_string(),
        source,
    })
}
